//! Closure classes
//!
//! Every closure literal becomes a synthetic subclass of
//! `groovy.lang.Closure`. Locals it captures are passed to the constructor
//! as their `Reference` cells and kept in private fields, so the closure and
//! the enclosing method see the same value. The body lives in `doCall`,
//! which always returns `Object`.

use super::method::{CapturedField, Frame, MethodGen, MethodHead};
use super::{ClassOutput, GeneratedClass};
use crate::ast::types::method_descriptor;
use crate::ast::{names, ClosureExpr, Parameter, SourcePos, Stmt, TypeRef, VarId};
use crate::complete::returns::add_returns;
use crate::error::CompileResult;
use grove_classfile::access::{ACC_PRIVATE, ACC_PUBLIC, ACC_SUPER, ACC_SYNTHETIC};
use grove_classfile::{Attribute, ClassFile, ConstantPool, InnerClassEntry, MemberInfo, Opcode};

const CLOSURE: &str = "groovy/lang/Closure";
const REFERENCE_DESCRIPTOR: &str = "Lgroovy/lang/Reference;";

/// `Outer$_method_closureN`, or `<enclosing closure>_closureN` when nested
pub(super) fn closure_class_name(head: &MethodHead, index: u32) -> String {
    match head.frame {
        Frame::Closure => format!("{}_closure{}", head.owner, index),
        Frame::Method => {
            let method: String = head.enclosing.chars().filter(|c| !matches!(c, '<' | '>')).collect();
            format!("{}$_{}_closure{}", head.owner, method, index)
        }
    }
}

/// Field names for the captured cells, unique within the closure class
fn field_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (i, name) in names.into_iter().enumerate() {
        if out.contains(&name) {
            out.push(format!("{}${}", name, i));
        } else {
            out.push(name);
        }
    }
    out
}

impl<'a, 'g> MethodGen<'a, 'g> {
    /// Generate the closure class and leave a new instance on the stack
    pub(super) fn emit_closure(&mut self, closure: &ClosureExpr, pos: SourcePos) -> CompileResult<TypeRef> {
        let scope = closure
            .scope
            .ok_or_else(|| self.internal("closure scope was not resolved"))?;
        let captured: Vec<VarId> = self.unit.scopes.get(scope).referenced_locals().to_vec();
        let params = match &closure.params {
            Some(params) => params.clone(),
            None => {
                let mut it = Parameter::new("it", TypeRef::object());
                it.var = self.unit.scopes.get(scope).declared_var("it");
                vec![it]
            }
        };
        let index = self.ctx.next_closure_index();
        let internal = closure_class_name(&self.head, index);
        tracing::trace!(closure = %internal, captured = captured.len(), line = pos.line, "generating closure");
        let ctor_descriptor = self.generate_closure_class(&internal, &params, &closure.body, &captured)?;

        let closure_ty = TypeRef::class(internal.replace('/', "."));
        self.type_insn(Opcode::New, &closure_ty)?;
        self.dup_value()?;
        let owner = match self.head.frame {
            Frame::Closure => {
                self.load_frame_self()?;
                self.self_type()
            }
            _ => self.load_this()?,
        };
        self.coerce(&owner, &TypeRef::object())?;
        let this_object = self.load_this()?;
        self.coerce(&this_object, &TypeRef::object())?;
        for var in &captured {
            self.load_cell(*var)?;
        }
        self.invoke(Opcode::Invokespecial, &internal, "<init>", &ctor_descriptor)?;
        let closure_base = TypeRef::class(names::CLOSURE);
        self.stack.replace_top(closure_base.clone())?;
        Ok(closure_base)
    }

    /// Write the closure class into `generated`; returns its constructor
    /// descriptor
    fn generate_closure_class(
        &mut self,
        internal: &str,
        params: &[Parameter],
        body: &Stmt,
        captured: &[VarId],
    ) -> CompileResult<String> {
        let unit = self.unit;
        let fields = field_names(captured.iter().map(|v| unit.vars.get(*v).name.clone()));
        let reference = TypeRef::class(names::REFERENCE);
        let ctor_params: Vec<TypeRef> = [TypeRef::object(), TypeRef::object()]
            .into_iter()
            .chain(captured.iter().map(|_| reference.clone()))
            .collect();
        let ctor_descriptor = method_descriptor(&ctor_params, &TypeRef::void());

        let mut pool = ConstantPool::new();
        let mut output = ClassOutput::default();
        let head = |name: &str, descriptor: String, return_type: TypeRef| MethodHead {
            class: self.head.class,
            owner: internal.to_string(),
            name: name.to_string(),
            descriptor,
            return_type,
            is_static: false,
            static_context: self.head.static_context,
            frame: Frame::Closure,
            enclosing: self.head.enclosing.clone(),
            source: self.head.source.clone(),
        };
        let ctor_head = head("<init>", ctor_descriptor.clone(), TypeRef::void());
        let call_params: Vec<TypeRef> = params.iter().map(|p| p.ty.erasure()).collect();
        let call_head = head("doCall", method_descriptor(&call_params, &TypeRef::object()), TypeRef::object());

        let ctor = {
            let mut gen = MethodGen::new(self.ctx, unit, &mut *self.generated, &mut pool, &mut output, ctor_head);
            let (owner_slot, this_slot) = (gen.slots.temp(&TypeRef::object()), gen.slots.temp(&TypeRef::object()));
            let cell_slots: Vec<u16> = captured.iter().map(|_| gen.slots.temp(&reference)).collect();
            gen.load_frame_self()?;
            gen.load_slot(owner_slot, &TypeRef::object())?;
            gen.load_slot(this_slot, &TypeRef::object())?;
            gen.invoke(
                Opcode::Invokespecial,
                CLOSURE,
                "<init>",
                "(Ljava/lang/Object;Ljava/lang/Object;)V",
            )?;
            for (field, slot) in fields.iter().zip(cell_slots) {
                gen.load_frame_self()?;
                gen.load_slot(slot, &reference)?;
                gen.field_insn(Opcode::Putfield, internal, field, &reference)?;
            }
            gen.emit_return(&TypeRef::void())?;
            gen.finish()?
        };

        let do_call = {
            let descriptor = call_head.descriptor.clone();
            let mut gen = MethodGen::new(self.ctx, unit, &mut *self.generated, &mut pool, &mut output, call_head);
            for (var, field) in captured.iter().zip(&fields) {
                gen.captured.insert(
                    *var,
                    CapturedField {
                        owner: internal.to_string(),
                        field: field.clone(),
                    },
                );
            }
            let body = add_returns(&unit.builder(), body.clone(), &TypeRef::object());
            gen.emit_body(params, &body)?;
            let mut method = MemberInfo::new(ACC_PUBLIC, "doCall", descriptor);
            method.attributes.push(Attribute::Code(gen.finish()?));
            method
        };

        let entry = InnerClassEntry {
            inner_class: internal.to_string(),
            outer_class: None,
            inner_name: None,
            access_flags: ACC_PUBLIC | ACC_SYNTHETIC,
        };
        let mut class = ClassFile::new(internal);
        class.major_version = self.ctx.config.target_bytecode.major_version();
        class.pool = pool;
        class.access_flags = ACC_PUBLIC | ACC_SUPER | ACC_SYNTHETIC;
        class.super_class = Some(CLOSURE.to_string());
        class.fields = fields
            .iter()
            .map(|name| MemberInfo::new(ACC_PRIVATE | ACC_SYNTHETIC, name.clone(), REFERENCE_DESCRIPTOR))
            .collect();
        let mut init = MemberInfo::new(ACC_PUBLIC, "<init>", ctor_descriptor.clone());
        init.attributes.push(Attribute::Code(ctor));
        class.methods.push(init);
        class.methods.push(do_call);
        class.methods.extend(output.extra_methods);
        if let Some(source) = &self.head.source {
            class.attributes.push(Attribute::SourceFile(source.clone()));
        }
        let mut entries = output.inner_entries;
        entries.insert(0, entry.clone());
        class.attributes.push(Attribute::InnerClasses(entries));

        self.generated.push(GeneratedClass {
            name: internal.replace('/', "."),
            bytes: class.encode()?,
        });
        self.output.inner_entries.push(entry);
        Ok(ctor_descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ClassId;

    fn head(frame: Frame, owner: &str, enclosing: &str) -> MethodHead {
        MethodHead {
            class: ClassId(0),
            owner: owner.into(),
            name: "doCall".into(),
            descriptor: "()Ljava/lang/Object;".into(),
            return_type: TypeRef::object(),
            is_static: false,
            static_context: false,
            frame,
            enclosing: enclosing.into(),
            source: None,
        }
    }

    #[test]
    fn test_closure_names() {
        assert_eq!(
            closure_class_name(&head(Frame::Method, "p/A", "run"), 1),
            "p/A$_run_closure1"
        );
        assert_eq!(
            closure_class_name(&head(Frame::Method, "p/A", "<init>"), 2),
            "p/A$_init_closure2"
        );
        assert_eq!(
            closure_class_name(&head(Frame::Closure, "p/A$_run_closure1", "run"), 3),
            "p/A$_run_closure1_closure3"
        );
    }

    #[test]
    fn test_duplicate_capture_names_are_suffixed() {
        let names = field_names(["x".to_string(), "y".to_string(), "x".to_string()]);
        assert_eq!(names, ["x", "y", "x$2"]);
    }
}
