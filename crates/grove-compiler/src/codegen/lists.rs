//! List literals
//!
//! Small or non-constant literals fill an `Object[]` inline and hand it to
//! `createList`. Large constant literals would push the method past the
//! 64K code limit, so their stores are spread over private static helpers
//! `$createListEntry_N([Ljava/lang/Object;)V`, each filling one slice of the
//! array, called in order.

use super::expr::ArgSource;
use super::method::{Frame, MethodGen, MethodHead};
use super::dispatch;
use crate::ast::{Expr, TypeRef};
use crate::error::CompileResult;
use grove_classfile::access::{ACC_PRIVATE, ACC_STATIC, ACC_SYNTHETIC};
use grove_classfile::{Attribute, MemberInfo, Opcode};

const ENTRY_DESCRIPTOR: &str = "([Ljava/lang/Object;)V";

impl<'a, 'g> MethodGen<'a, 'g> {
    pub(super) fn emit_list(&mut self, items: &[Expr]) -> CompileResult<TypeRef> {
        let threshold = self.ctx.config.list_split_threshold;
        if threshold > 0 && items.len() > threshold && items.iter().all(Expr::is_constant) {
            tracing::debug!(
                class = %self.head.owner,
                elements = items.len(),
                "splitting list literal"
            );
            self.emit_split_list(items, threshold)?;
        } else {
            let sources: Vec<ArgSource<'_>> = items.iter().map(ArgSource::Expr).collect();
            self.emit_object_array(&sources)?;
        }
        self.call_runtime(dispatch::CREATE_LIST)
    }

    fn emit_split_list(&mut self, items: &[Expr], chunk: usize) -> CompileResult<()> {
        self.push_int(items.len() as i32)?;
        self.new_array(&TypeRef::object())?;
        let owner = self.head.owner.clone();
        for (k, slice) in items.chunks(chunk).enumerate() {
            self.output.list_helpers += 1;
            let name = format!("$createListEntry_{}", self.output.list_helpers);
            let helper = self.list_entry_helper(&name, k * chunk, slice)?;
            self.output.extra_methods.push(helper);
            self.dup_value()?;
            self.invoke(Opcode::Invokestatic, &owner, &name, ENTRY_DESCRIPTOR)?;
        }
        Ok(())
    }

    /// `array[base + i] = items[i]` for the slice
    fn list_entry_helper(&mut self, name: &str, base: usize, items: &[Expr]) -> CompileResult<MemberInfo> {
        let head = MethodHead {
            class: self.head.class,
            owner: self.head.owner.clone(),
            name: name.to_string(),
            descriptor: ENTRY_DESCRIPTOR.to_string(),
            return_type: TypeRef::void(),
            is_static: true,
            static_context: true,
            frame: Frame::Method,
            enclosing: self.head.enclosing.clone(),
            source: self.head.source.clone(),
        };
        let mut helper = MethodGen::new(
            self.ctx,
            self.unit,
            &mut *self.generated,
            &mut *self.pool,
            &mut *self.output,
            head,
        );
        let array_ty = TypeRef::array(TypeRef::object());
        let array = helper.slots.temp(&array_ty);
        for (i, item) in items.iter().enumerate() {
            helper.load_slot(array, &array_ty)?;
            helper.push_int((base + i) as i32)?;
            helper.emit_value(item, &TypeRef::object())?;
            helper.op(Opcode::Aastore, 3, None)?;
        }
        helper.emit_return(&TypeRef::void())?;
        let code = helper.finish()?;
        let mut method = MemberInfo::new(ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC, name, ENTRY_DESCRIPTOR);
        method.attributes.push(Attribute::Code(code));
        Ok(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassKind, ClassNode, CompileUnit};
    use crate::codegen::ClassOutput;
    use crate::config::CompilerConfig;
    use crate::context::CompilationContext;
    use grove_classfile::ConstantPool;

    fn emit(threshold: usize, count: usize) -> ClassOutput {
        let ctx = CompilationContext::new(CompilerConfig {
            list_split_threshold: threshold,
            ..CompilerConfig::default()
        });
        let mut unit = CompileUnit::new();
        let class = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let b = unit.builder();
        let items: Vec<Expr> = (0..count as i32).map(|i| b.int(i)).collect();
        let mut generated = Vec::new();
        let mut pool = ConstantPool::new();
        let mut output = ClassOutput::default();
        let head = MethodHead {
            class,
            owner: "p/A".into(),
            name: "run".into(),
            descriptor: "()Ljava/lang/Object;".into(),
            return_type: TypeRef::object(),
            is_static: false,
            static_context: false,
            frame: Frame::Method,
            enclosing: "run".into(),
            source: None,
        };
        let mut gen = MethodGen::new(&ctx, &unit, &mut generated, &mut pool, &mut output, head);
        let ty = gen.emit_list(&items).unwrap();
        assert_eq!(ty, TypeRef::class("java.util.List"));
        gen.emit_return(&TypeRef::object()).unwrap();
        gen.finish().unwrap();
        output
    }

    #[test]
    fn test_list_at_threshold_stays_inline() {
        let output = emit(4, 4);
        assert!(output.extra_methods.is_empty());
        assert_eq!(output.list_helpers, 0);
    }

    #[test]
    fn test_list_over_threshold_splits_in_order() {
        let output = emit(4, 9);
        let names: Vec<&str> = output.extra_methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["$createListEntry_1", "$createListEntry_2", "$createListEntry_3"]);
        let first = output.extra_methods[0].code().unwrap();
        // 4 stores, each aload_0 iconst value aastore
        assert_eq!(
            first.code.iter().filter(|&&op| op == Opcode::Aastore.to_u8()).count(),
            4
        );
        let last = output.extra_methods[2].code().unwrap();
        assert_eq!(
            last.code.iter().filter(|&&op| op == Opcode::Aastore.to_u8()).count(),
            1
        );
        assert_eq!(output.extra_methods[0].access_flags, ACC_PRIVATE | ACC_STATIC | ACC_SYNTHETIC);
    }
}
