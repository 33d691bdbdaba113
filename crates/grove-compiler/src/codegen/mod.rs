//! JVM class-file generation
//!
//! Walks the completed and verified class model and writes one class file
//! per primary class, plus one per closure. Each class goes through a fixed
//! sequence of phases:
//!
//! ```text
//! Init -> EmitHeader -> EmitMembers -> EmitInnerClassTable -> Finalize
//! ```
//!
//! Method bodies are produced by [`method::MethodGen`] and the `impl` blocks
//! spread over the sibling modules. Unlike the earlier passes codegen fails
//! fast: the first error aborts the unit.

mod annotations;
mod closures;
mod control;
pub mod dispatch;
mod expr;
mod header;
mod lists;
mod method;
mod slots;
mod stack;
mod stmt;
mod synthetic;

use crate::ast::{ClassId, CompileUnit, MethodNode};
use crate::context::CompilationContext;
use crate::error::CompileResult;
use grove_classfile::{Attribute, ClassFile, ConstantPool, InnerClassEntry, MemberInfo};
use method::{CapturedField, Frame, MethodGen, MethodHead};

pub use dispatch::is_member_directly_accessible;

/// One finished class file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedClass {
    /// Dotted binary name (`p.Outer$_run_closure1`)
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Members and table rows collected while method bodies are written
#[derive(Debug, Default)]
pub(crate) struct ClassOutput {
    /// Helpers such as `$createListEntry_N`
    pub(crate) extra_methods: Vec<MemberInfo>,
    /// Rows for the closure classes created in this class
    pub(crate) inner_entries: Vec<InnerClassEntry>,
    /// Number of list helpers created so far
    pub(crate) list_helpers: u32,
}

/// Generate every primary class of the unit
///
/// Each class is followed by the closure classes its methods create.
#[tracing::instrument(skip_all)]
pub fn generate(ctx: &CompilationContext, unit: &CompileUnit) -> CompileResult<Vec<GeneratedClass>> {
    let mut out = Vec::new();
    for id in unit.primary_classes() {
        let mut closures = Vec::new();
        let main = ClassGenerator::new(ctx, unit, id, &mut closures).run()?;
        tracing::debug!(class = %main.name, bytes = main.bytes.len(), closures = closures.len(), "generated class");
        out.push(main);
        out.append(&mut closures);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    EmitHeader,
    EmitMembers,
    EmitInnerClassTable,
    Finalize,
}

struct ClassGenerator<'a, 'g> {
    ctx: &'a CompilationContext,
    unit: &'a CompileUnit,
    id: ClassId,
    phase: Phase,
    class: ClassFile,
    pool: ConstantPool,
    output: ClassOutput,
    closures: &'g mut Vec<GeneratedClass>,
}

impl<'a, 'g> ClassGenerator<'a, 'g> {
    fn new(ctx: &'a CompilationContext, unit: &'a CompileUnit, id: ClassId, closures: &'g mut Vec<GeneratedClass>) -> Self {
        Self {
            ctx,
            unit,
            id,
            phase: Phase::Init,
            class: ClassFile::new(unit.class(id).internal_name()),
            pool: ConstantPool::new(),
            output: ClassOutput::default(),
            closures,
        }
    }

    fn run(mut self) -> CompileResult<GeneratedClass> {
        loop {
            tracing::trace!(class = %self.unit.class(self.id).name, phase = ?self.phase, "codegen phase");
            self.phase = match self.phase {
                Phase::Init => {
                    self.class.major_version = self.ctx.config.target_bytecode.major_version();
                    Phase::EmitHeader
                }
                Phase::EmitHeader => {
                    self.emit_header();
                    Phase::EmitMembers
                }
                Phase::EmitMembers => {
                    self.emit_members()?;
                    Phase::EmitInnerClassTable
                }
                Phase::EmitInnerClassTable => {
                    self.emit_inner_class_table();
                    Phase::Finalize
                }
                Phase::Finalize => return self.finalize(),
            };
        }
    }

    fn emit_header(&mut self) {
        let unit = self.unit;
        let node = unit.class(self.id);
        self.class.access_flags = header::class_flags(node);
        self.class.super_class = node
            .super_class
            .as_ref()
            .map(|s| s.erasure().internal_name())
            .filter(|_| node.name != crate::ast::names::OBJECT);
        self.class.interfaces = node.interfaces.iter().map(|i| i.erasure().internal_name()).collect();
        if let Some(source) = &node.source_file {
            self.class.attributes.push(Attribute::SourceFile(source.clone()));
        }
        self.class
            .attributes
            .extend(annotations::annotation_attributes(unit, &node.annotations));
    }

    fn emit_members(&mut self) -> CompileResult<()> {
        let unit = self.unit;
        let node = unit.class(self.id);
        for field in &node.fields {
            let mut info = MemberInfo::new(header::field_flags(node, field), field.name.clone(), field.ty.erasure().descriptor());
            info.attributes
                .extend(annotations::annotation_attributes(unit, &field.annotations));
            self.class.fields.push(info);
        }
        for method in node.constructors.iter().chain(&node.methods) {
            let info = self.emit_method(method)?;
            self.class.methods.push(info);
        }
        self.class
            .methods
            .extend(std::mem::take(&mut self.output.extra_methods));
        Ok(())
    }

    fn emit_method(&mut self, method: &MethodNode) -> CompileResult<MemberInfo> {
        let unit = self.unit;
        let node = unit.class(self.id);
        let descriptor = method.descriptor();
        let mut info = MemberInfo::new(header::method_flags(node, method), method.name.clone(), descriptor.clone());

        let concrete = !node.is_interface() || method.is_static_init();
        if let (true, Some(body)) = (concrete, &method.body) {
            let is_static = method.modifiers.is_static() || method.is_static_init();
            let head = MethodHead {
                class: self.id,
                owner: node.internal_name(),
                name: method.name.clone(),
                descriptor,
                return_type: method.return_type.erasure(),
                is_static,
                static_context: is_static,
                frame: Frame::Method,
                enclosing: method.name.clone(),
                source: node.source_file.clone(),
            };
            let mut gen = MethodGen::new(self.ctx, unit, &mut *self.closures, &mut self.pool, &mut self.output, head);
            for var in &node.captured {
                gen.captured.insert(
                    *var,
                    CapturedField {
                        owner: node.internal_name(),
                        field: unit.vars.get(*var).name.clone(),
                    },
                );
            }
            gen.emit_body(&method.params, body)?;
            info.attributes.push(Attribute::Code(gen.finish()?));
        }

        if !method.exceptions.is_empty() {
            info.attributes.push(Attribute::Exceptions(
                method.exceptions.iter().map(|e| e.erasure().internal_name()).collect(),
            ));
        }
        info.attributes
            .extend(annotations::annotation_attributes(unit, &method.annotations));
        info.attributes
            .extend(annotations::parameter_annotation_attributes(unit, &method.params));
        if node.is_annotation() {
            info.attributes
                .extend(annotations::annotation_default(unit, self.id, &method.name));
        }
        Ok(info)
    }

    /// Rows for this class, its member classes and its closures
    fn emit_inner_class_table(&mut self) {
        let unit = self.unit;
        let node = unit.class(self.id);
        let mut entries: Vec<InnerClassEntry> = Vec::new();
        let member_rows = std::iter::once(self.id)
            .chain(node.inner_classes.iter().copied())
            .filter_map(|id| header::inner_entry(unit, unit.class(id)));
        for entry in member_rows.chain(std::mem::take(&mut self.output.inner_entries)) {
            if !entries.iter().any(|e| e.inner_class == entry.inner_class) {
                entries.push(entry);
            }
        }
        if !entries.is_empty() {
            self.class.attributes.push(Attribute::InnerClasses(entries));
        }
    }

    fn finalize(mut self) -> CompileResult<GeneratedClass> {
        let name = self.unit.class(self.id).name.clone();
        self.class.pool = std::mem::take(&mut self.pool);
        Ok(GeneratedClass {
            name,
            bytes: self.class.encode()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassKind, ClassNode, Modifiers, Parameter, TypeRef};
    use crate::Compiler;
    use grove_classfile::access::{ACC_PUBLIC, ACC_SUPER, ACC_SYNTHETIC};
    use grove_classfile::Opcode;

    fn compile(unit: &mut CompileUnit) -> Vec<ClassFile> {
        Compiler::default()
            .compile(unit)
            .unwrap()
            .iter()
            .map(|c| ClassFile::decode(&c.bytes).unwrap())
            .collect()
    }

    #[test]
    fn test_simple_class_layout() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.Calc", ClassKind::Class);
        class.source_file = Some("Calc.groovy".into());
        class.methods.push(
            MethodNode::new("twice", Modifiers::PUBLIC, TypeRef::int())
                .with_params(vec![Parameter::new("x", TypeRef::int())])
                .with_body(b.block(vec![b.ret(b.binary(crate::ast::BinaryOp::Add, b.var("x"), b.var("x")))])),
        );
        unit.add_class(class);
        let classes = compile(&mut unit);
        assert_eq!(classes.len(), 1);
        let calc = &classes[0];
        assert_eq!(calc.this_class, "p/Calc");
        assert_eq!(calc.access_flags, ACC_PUBLIC | ACC_SUPER);
        assert!(calc.interfaces.iter().any(|i| i == "groovy/lang/GroovyObject"));
        assert!(calc.attribute("SourceFile").is_some());

        let twice = calc.method("twice", "(I)I").unwrap();
        let code = &twice.code().unwrap().code;
        assert!(code.contains(&Opcode::Iadd.to_u8()));
        assert_eq!(code.last(), Some(&Opcode::Ireturn.to_u8()));
        assert!(calc.method("<init>", "()V").is_some());
        assert!(calc.method("getMetaClass", "()Lgroovy/lang/MetaClass;").is_some());
        assert!(calc.method("$getStaticMetaClass", "()Lgroovy/lang/MetaClass;").is_some());
    }

    #[test]
    fn test_closure_class_follows_owner() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.methods.push(
            MethodNode::new("run", Modifiers::PUBLIC, TypeRef::object())
                .with_body(b.block(vec![b.ret(b.closure(None, b.block(vec![b.ret(b.var("it"))])))])),
        );
        unit.add_class(class);
        let generated = Compiler::default().compile(&mut unit).unwrap();
        let names: Vec<&str> = generated.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["p.A", "p.A$_run_closure1"]);

        let closure = ClassFile::decode(&generated[1].bytes).unwrap();
        assert_eq!(closure.super_class.as_deref(), Some("groovy/lang/Closure"));
        assert_eq!(closure.access_flags, ACC_PUBLIC | ACC_SUPER | ACC_SYNTHETIC);
        assert!(closure.method("doCall", "(Ljava/lang/Object;)Ljava/lang/Object;").is_some());

        let owner = ClassFile::decode(&generated[0].bytes).unwrap();
        match owner.attribute("InnerClasses") {
            Some(Attribute::InnerClasses(rows)) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].inner_class, "p/A$_run_closure1");
                assert!(rows[0].outer_class.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interface_methods_have_no_code() {
        let mut unit = CompileUnit::new();
        let mut iface = ClassNode::new("p.Shape", ClassKind::Interface);
        iface
            .methods
            .push(MethodNode::new("area", Modifiers::PUBLIC | Modifiers::ABSTRACT, TypeRef::double()));
        unit.add_class(iface);
        let classes = compile(&mut unit);
        let area = classes[0].method("area", "()D").unwrap();
        assert!(area.code().is_none());
        assert_eq!(classes[0].super_class.as_deref(), Some("java/lang/Object"));
    }
}
