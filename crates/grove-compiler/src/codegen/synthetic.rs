//! Bodies of compiler-added methods
//!
//! Bridges and the `GroovyObject` members have no source statements; their
//! code is written here directly. Parameters are read by slot, so these
//! bodies work whether or not the parameters were ever resolved.

use super::method::{field_type_ref, MethodGen};
use crate::ast::types::{internal_name, method_descriptor};
use crate::ast::{names, SyntheticBody, TypeRef};
use crate::complete::properties::META_CLASS_FIELD;
use crate::error::CompileResult;
use grove_classfile::{MethodDescriptor, Opcode};

const META_CLASS: &str = "groovy/lang/MetaClass";
const CLASS_INFO: &str = "org/codehaus/groovy/reflection/ClassInfo";
const ADAPTER: &str = "org/codehaus/groovy/runtime/ScriptBytecodeAdapter";

impl<'a, 'g> MethodGen<'a, 'g> {
    pub(super) fn emit_synthetic(&mut self, body: &SyntheticBody) -> CompileResult<()> {
        match body {
            SyntheticBody::Bridge {
                target_params,
                target_return,
                is_interface,
            } => self.emit_bridge(target_params, target_return, *is_interface),
            SyntheticBody::GetMetaClass => self.emit_get_meta_class(),
            SyntheticBody::SetMetaClass => {
                let (owner, field_ty) = self.meta_class_field()?;
                self.load_frame_self()?;
                self.load_slot(1, &field_ty)?;
                self.field_insn(Opcode::Putfield, &owner, META_CLASS_FIELD, &field_ty)?;
                self.emit_return(&TypeRef::void())
            }
            SyntheticBody::InvokeMethod => self.delegate_to_meta_class(
                "invokeMethod",
                "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;",
                &[TypeRef::string(), TypeRef::object()],
            ),
            SyntheticBody::GetProperty => self.delegate_to_meta_class(
                "getProperty",
                "(Ljava/lang/Object;Ljava/lang/String;)Ljava/lang/Object;",
                &[TypeRef::string()],
            ),
            SyntheticBody::SetProperty => self.delegate_to_meta_class(
                "setProperty",
                "(Ljava/lang/Object;Ljava/lang/String;Ljava/lang/Object;)V",
                &[TypeRef::string(), TypeRef::object()],
            ),
            SyntheticBody::GetStaticMetaClass { class_info } => self.emit_static_meta_class(class_info),
        }
    }

    /// Parameter types of the method being generated, with their slots
    fn parameter_slots(&self) -> CompileResult<Vec<(u16, TypeRef)>> {
        let descriptor = MethodDescriptor::parse(&self.head.descriptor).map_err(|e| self.internal(e.to_string()))?;
        let mut slot = u16::from(!self.head.is_static);
        Ok(descriptor
            .params
            .iter()
            .map(|param| {
                let at = slot;
                slot += param.slots();
                (at, field_type_ref(param))
            })
            .collect())
    }

    fn emit_bridge(&mut self, target_params: &[TypeRef], target_return: &TypeRef, is_interface: bool) -> CompileResult<()> {
        let params = self.parameter_slots()?;
        if params.len() != target_params.len() {
            return Err(self.internal(format!(
                "bridge takes {} arguments but its target takes {}",
                params.len(),
                target_params.len()
            )));
        }
        self.load_frame_self()?;
        for ((slot, ty), target) in params.iter().zip(target_params) {
            self.load_slot(*slot, ty)?;
            self.coerce(ty, target)?;
        }
        let opcode = if is_interface {
            Opcode::Invokeinterface
        } else {
            Opcode::Invokevirtual
        };
        let owner = self.head.owner.clone();
        let name = self.head.name.clone();
        let descriptor = method_descriptor(target_params, target_return);
        let returned = self.invoke(opcode, &owner, &name, &descriptor)?;
        let ret = self.head.return_type.erasure();
        self.coerce(&returned, &ret)?;
        self.emit_return(&ret)
    }

    /// Owner and type of the `metaClass` field the class uses
    fn meta_class_field(&self) -> CompileResult<(String, TypeRef)> {
        let unit = self.unit;
        std::iter::once(self.head.class)
            .chain(unit.superclasses(self.head.class))
            .find_map(|id| {
                let class = unit.class(id);
                class
                    .field(META_CLASS_FIELD)
                    .map(|field| (internal_name(&class.name), field.ty.erasure()))
            })
            .ok_or_else(|| self.internal("class has no metaClass field"))
    }

    /// `metaClass`, created through `$getStaticMetaClass()` on first use
    fn emit_get_meta_class(&mut self) -> CompileResult<()> {
        let (owner, field_ty) = self.meta_class_field()?;
        let ready = self.new_label();
        self.load_frame_self()?;
        self.field_insn(Opcode::Getfield, &owner, META_CLASS_FIELD, &field_ty)?;
        self.jump(Opcode::Ifnonnull, ready)?;

        self.load_frame_self()?;
        self.load_frame_self()?;
        let this_owner = self.head.owner.clone();
        self.invoke(
            Opcode::Invokevirtual,
            &this_owner,
            "$getStaticMetaClass",
            "()Lgroovy/lang/MetaClass;",
        )?;
        self.field_insn(Opcode::Putfield, &owner, META_CLASS_FIELD, &field_ty)?;

        self.place(ready);
        self.load_frame_self()?;
        self.field_insn(Opcode::Getfield, &owner, META_CLASS_FIELD, &field_ty)?;
        self.emit_return(&field_ty)
    }

    /// `getMetaClass().<name>(this, args...)`
    fn delegate_to_meta_class(&mut self, name: &str, descriptor: &str, args: &[TypeRef]) -> CompileResult<()> {
        let this_owner = self.head.owner.clone();
        self.load_frame_self()?;
        self.invoke(Opcode::Invokevirtual, &this_owner, "getMetaClass", "()Lgroovy/lang/MetaClass;")?;
        self.load_frame_self()?;
        for (slot, ty) in args.iter().enumerate() {
            self.load_slot(slot as u16 + 1, ty)?;
        }
        let returned = self.invoke(Opcode::Invokeinterface, META_CLASS, name, descriptor)?;
        self.emit_return(&returned)
    }

    /// Metaclass of the exact class; instances of dynamically created
    /// subclasses ask the runtime instead of the cached `ClassInfo`
    fn emit_static_meta_class(&mut self, class_info: &str) -> CompileResult<()> {
        let own = self.class_type();
        let info_ty = TypeRef::class(names::CLASS_INFO);
        let meta_ty = TypeRef::class(names::META_CLASS);
        let exact = self.new_label();
        let cached = self.new_label();
        let this_owner = self.head.owner.clone();

        self.load_frame_self()?;
        self.invoke(Opcode::Invokevirtual, "java/lang/Object", "getClass", "()Ljava/lang/Class;")?;
        self.push_class_literal(&own)?;
        self.jump(Opcode::IfAcmpeq, exact)?;
        self.load_frame_self()?;
        self.invoke(
            Opcode::Invokestatic,
            ADAPTER,
            "initMetaClass",
            "(Ljava/lang/Object;)Lgroovy/lang/MetaClass;",
        )?;
        self.emit_return(&meta_ty)?;

        self.place(exact);
        let info = self.slots.temp(&info_ty);
        self.field_insn(Opcode::Getstatic, &this_owner, class_info, &info_ty)?;
        self.store_slot(info, &info_ty)?;
        self.load_slot(info, &info_ty)?;
        self.jump(Opcode::Ifnonnull, cached)?;
        self.push_class_literal(&own)?;
        self.invoke(
            Opcode::Invokestatic,
            CLASS_INFO,
            "getClassInfo",
            "(Ljava/lang/Class;)Lorg/codehaus/groovy/reflection/ClassInfo;",
        )?;
        self.dup_value()?;
        self.store_slot(info, &info_ty)?;
        self.field_insn(Opcode::Putstatic, &this_owner, class_info, &info_ty)?;

        self.place(cached);
        self.load_slot(info, &info_ty)?;
        self.invoke(Opcode::Invokevirtual, CLASS_INFO, "getMetaClass", "()Lgroovy/lang/MetaClass;")?;
        self.emit_return(&meta_ty)
    }
}
