//! Class, member and inner-class access flags

use crate::ast::{ClassNode, CompileUnit, FieldNode, MethodNode};
use grove_classfile::access::{
    ACC_ABSTRACT, ACC_ENUM, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC,
    ACC_SUPER, ACC_SYNCHRONIZED, VISIBILITY_MASK,
};
use grove_classfile::InnerClassEntry;

/// Flags a top-level `access_flags` may carry
const CLASS_MASK: u16 = 0x7631;
/// Flags an `InnerClasses` entry may carry
const INNER_MASK: u16 = 0x761F;
const FIELD_MASK: u16 = 0x50DF;
const METHOD_MASK: u16 = 0x1DFF;

/// `access_flags` of the class file itself
///
/// A class file has no private, protected or static classes: member classes
/// are widened to package (private) or public (protected) there and keep
/// their real flags in the `InnerClasses` table.
pub(super) fn class_flags(class: &ClassNode) -> u16 {
    let mut flags = class.modifiers.access_flags();
    if class.outer.is_some() {
        if flags & ACC_PROTECTED != 0 {
            flags |= ACC_PUBLIC;
        }
        flags &= !(ACC_PRIVATE | ACC_PROTECTED);
    }
    flags &= !ACC_STATIC;
    if class.is_interface() {
        flags = (flags | ACC_INTERFACE | ACC_ABSTRACT) & !(ACC_FINAL | ACC_ENUM | ACC_SUPER);
    } else {
        flags |= ACC_SUPER;
    }
    flags & CLASS_MASK
}

/// Flags of an `InnerClasses` entry
pub(super) fn inner_entry_flags(class: &ClassNode) -> u16 {
    let mut flags = class.modifiers.access_flags() & INNER_MASK;
    if class.is_interface() {
        flags = (flags | ACC_INTERFACE | ACC_ABSTRACT | ACC_STATIC) & !(ACC_FINAL | ACC_ENUM);
    }
    flags & !(ACC_SUPER | ACC_SYNCHRONIZED)
}

pub(super) fn field_flags(owner: &ClassNode, field: &FieldNode) -> u16 {
    let flags = field.modifiers.access_flags();
    if owner.is_interface() {
        // interface fields are constants
        return (flags | ACC_PUBLIC | ACC_STATIC | ACC_FINAL) & FIELD_MASK & !(ACC_PRIVATE | ACC_PROTECTED);
    }
    flags & FIELD_MASK
}

pub(super) fn method_flags(owner: &ClassNode, method: &MethodNode) -> u16 {
    let mut flags = method.modifiers.access_flags();
    if owner.is_interface() && !method.is_static_init() {
        flags = (flags & !VISIBILITY_MASK) | ACC_PUBLIC | ACC_ABSTRACT;
    }
    if method.is_static_init() {
        flags = ACC_STATIC;
    }
    flags & METHOD_MASK
}

/// `InnerClasses` row for `class`; anonymous classes have neither an outer
/// class nor a simple name
pub(super) fn inner_entry(unit: &CompileUnit, class: &ClassNode) -> Option<InnerClassEntry> {
    let outer = unit.class(class.outer?);
    let (outer_class, inner_name) = if class.anonymous {
        (None, None)
    } else {
        let simple = class
            .name
            .strip_prefix(outer.name.as_str())
            .and_then(|rest| rest.strip_prefix('$'))
            .unwrap_or(class.name.as_str());
        (Some(outer.internal_name()), Some(simple.to_string()))
    };
    Some(InnerClassEntry {
        inner_class: class.internal_name(),
        outer_class,
        inner_name,
        access_flags: inner_entry_flags(class),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassId, ClassKind, Modifiers, TypeRef};
    use grove_classfile::access::{ACC_SYNTHETIC, ACC_TRANSIENT};

    #[test]
    fn test_top_level_class_flags() {
        let class = ClassNode::new("p.A", ClassKind::Class).with_modifiers(Modifiers::PUBLIC | Modifiers::FINAL);
        assert_eq!(class_flags(&class), ACC_PUBLIC | ACC_FINAL | ACC_SUPER);
    }

    #[test]
    fn test_member_class_visibility_is_widened() {
        let mut protected = ClassNode::new("p.A$B", ClassKind::Class)
            .with_modifiers(Modifiers::PROTECTED | Modifiers::STATIC);
        protected.outer = Some(ClassId(0));
        assert_eq!(class_flags(&protected), ACC_PUBLIC | ACC_SUPER);
        assert_eq!(inner_entry_flags(&protected), ACC_PROTECTED | ACC_STATIC);

        let mut private = ClassNode::new("p.A$C", ClassKind::Class).with_modifiers(Modifiers::PRIVATE);
        private.outer = Some(ClassId(0));
        assert_eq!(class_flags(&private), ACC_SUPER);
        assert_eq!(inner_entry_flags(&private), ACC_PRIVATE);
    }

    #[test]
    fn test_interface_flags_drop_final_and_enum() {
        let iface = ClassNode::new("p.I", ClassKind::Interface)
            .with_modifiers(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::FINAL | Modifiers::ENUM);
        assert_eq!(class_flags(&iface), ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        assert_eq!(inner_entry_flags(&iface) & (ACC_FINAL | ACC_ENUM | ACC_SUPER), 0);
    }

    #[test]
    fn test_member_flags() {
        let class = ClassNode::new("p.A", ClassKind::Class);
        let field = FieldNode::new(
            "metaClass",
            TypeRef::object(),
            Modifiers::PRIVATE | Modifiers::TRANSIENT | Modifiers::SYNTHETIC,
        );
        assert_eq!(field_flags(&class, &field), ACC_PRIVATE | ACC_TRANSIENT | ACC_SYNTHETIC);

        let clinit = MethodNode::new("<clinit>", Modifiers::STATIC | Modifiers::PUBLIC, TypeRef::void());
        assert_eq!(method_flags(&class, &clinit), ACC_STATIC);

        let iface = ClassNode::new("p.I", ClassKind::Interface);
        let m = MethodNode::new("run", Modifiers::NONE, TypeRef::void());
        assert_eq!(method_flags(&iface, &m), ACC_PUBLIC | ACC_ABSTRACT);
    }

    #[test]
    fn test_inner_entries() {
        let mut unit = CompileUnit::new();
        let outer = unit.add_class(ClassNode::new("p.Outer", ClassKind::Class));
        let named = unit.add_inner(
            outer,
            ClassNode::new("p.Outer$Inner", ClassKind::Class).with_modifiers(Modifiers::PUBLIC | Modifiers::STATIC),
        );
        let mut anon = ClassNode::new("p.Outer$1", ClassKind::Class);
        anon.anonymous = true;
        let anon = unit.add_inner(outer, anon);

        let entry = inner_entry(&unit, unit.class(named)).unwrap();
        assert_eq!(entry.inner_class, "p/Outer$Inner");
        assert_eq!(entry.outer_class.as_deref(), Some("p/Outer"));
        assert_eq!(entry.inner_name.as_deref(), Some("Inner"));
        assert_eq!(entry.access_flags, ACC_PUBLIC | ACC_STATIC);

        let entry = inner_entry(&unit, unit.class(anon)).unwrap();
        assert!(entry.outer_class.is_none() && entry.inner_name.is_none());
        assert!(inner_entry(&unit, unit.class(outer)).is_none());
    }
}
