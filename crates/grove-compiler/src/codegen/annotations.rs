//! Annotation attributes
//!
//! Turns the coerced annotation uses recorded by annotation processing into
//! class-file annotation structures. `RUNTIME` annotations go into the
//! visible attributes, `CLASS` ones into the invisible attributes and
//! `SOURCE` ones are dropped.

use crate::annotations::{AnnotationValue, ResolvedAnnotation, RetentionPolicy};
use crate::ast::{AnnotationNode, ClassId, CompileUnit, Parameter};
use grove_classfile::{Annotation, Attribute, ConstElement, ElementValue};

pub(super) fn element_value(value: &AnnotationValue) -> ElementValue {
    match value {
        AnnotationValue::Boolean(v) => ElementValue::Const(ConstElement::Boolean(*v)),
        AnnotationValue::Byte(v) => ElementValue::Const(ConstElement::Byte(*v)),
        AnnotationValue::Char(v) => ElementValue::Const(ConstElement::Char(*v as u32 as u16)),
        AnnotationValue::Short(v) => ElementValue::Const(ConstElement::Short(*v)),
        AnnotationValue::Int(v) => ElementValue::Const(ConstElement::Int(*v)),
        AnnotationValue::Long(v) => ElementValue::Const(ConstElement::Long(*v)),
        AnnotationValue::Float(v) => ElementValue::Const(ConstElement::Float(*v)),
        AnnotationValue::Double(v) => ElementValue::Const(ConstElement::Double(*v)),
        AnnotationValue::String(v) => ElementValue::Const(ConstElement::String(v.clone())),
        AnnotationValue::Class(ty) => ElementValue::Class(ty.erasure().descriptor()),
        AnnotationValue::Enum { ty, name } => ElementValue::Enum {
            type_descriptor: ty.erasure().descriptor(),
            const_name: name.clone(),
        },
        AnnotationValue::Annotation(nested) => ElementValue::Annotation(annotation(nested)),
        AnnotationValue::Array(values) => ElementValue::Array(values.iter().map(element_value).collect()),
    }
}

fn annotation(resolved: &ResolvedAnnotation) -> Annotation {
    let mut out = Annotation::new(resolved.ty.descriptor());
    out.elements = resolved
        .values
        .iter()
        .map(|(name, value)| (name.clone(), element_value(value)))
        .collect();
    out
}

/// Visible and invisible annotations of one annotated element
fn split(unit: &CompileUnit, nodes: &[AnnotationNode]) -> (Vec<Annotation>, Vec<Annotation>) {
    let mut visible = Vec::new();
    let mut invisible = Vec::new();
    for resolved in nodes.iter().filter_map(|node| unit.side.annotations.get(&node.id)) {
        match resolved.retention {
            RetentionPolicy::Runtime => visible.push(annotation(resolved)),
            RetentionPolicy::Class => invisible.push(annotation(resolved)),
            RetentionPolicy::Source => {}
        }
    }
    (visible, invisible)
}

/// Annotation attributes of a class, field or method
pub(super) fn annotation_attributes(unit: &CompileUnit, nodes: &[AnnotationNode]) -> Vec<Attribute> {
    let (visible, invisible) = split(unit, nodes);
    let mut out = Vec::new();
    if !visible.is_empty() {
        out.push(Attribute::RuntimeVisibleAnnotations(visible));
    }
    if !invisible.is_empty() {
        out.push(Attribute::RuntimeInvisibleAnnotations(invisible));
    }
    out
}

/// Parameter annotation attributes; one entry per parameter once any
/// parameter carries an annotation of that visibility
pub(super) fn parameter_annotation_attributes(unit: &CompileUnit, params: &[Parameter]) -> Vec<Attribute> {
    let (visible, invisible): (Vec<_>, Vec<_>) = params.iter().map(|p| split(unit, &p.annotations)).unzip();
    let mut out = Vec::new();
    if visible.iter().any(|v| !v.is_empty()) {
        out.push(Attribute::RuntimeVisibleParameterAnnotations(visible));
    }
    if invisible.iter().any(|v| !v.is_empty()) {
        out.push(Attribute::RuntimeInvisibleParameterAnnotations(invisible));
    }
    out
}

/// `AnnotationDefault` of an annotation-type member
pub(super) fn annotation_default(unit: &CompileUnit, class: ClassId, member: &str) -> Option<Attribute> {
    unit.side
        .annotation_defaults
        .get(&(class, member.to_string()))
        .map(|value| Attribute::AnnotationDefault(element_value(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeId, SourcePos, TypeRef};

    fn node(id: u32, ty: &str) -> AnnotationNode {
        AnnotationNode {
            id: NodeId(id),
            ty: TypeRef::class(ty),
            members: Vec::new(),
            pos: SourcePos::default(),
        }
    }

    fn resolved(ty: &str, retention: RetentionPolicy) -> ResolvedAnnotation {
        ResolvedAnnotation {
            ty: TypeRef::class(ty),
            retention,
            values: vec![("value".into(), AnnotationValue::Int(3))],
        }
    }

    #[test]
    fn test_retention_selects_attribute() {
        let mut unit = CompileUnit::new();
        unit.side
            .annotations
            .insert(NodeId(1), resolved("p.Visible", RetentionPolicy::Runtime));
        unit.side
            .annotations
            .insert(NodeId(2), resolved("p.Hidden", RetentionPolicy::Class));
        unit.side
            .annotations
            .insert(NodeId(3), resolved("p.Gone", RetentionPolicy::Source));
        let attrs = annotation_attributes(&unit, &[node(1, "p.Visible"), node(2, "p.Hidden"), node(3, "p.Gone")]);
        assert_eq!(attrs.len(), 2);
        match &attrs[0] {
            Attribute::RuntimeVisibleAnnotations(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].type_descriptor, "Lp/Visible;");
                assert_eq!(list[0].elements[0].1, ElementValue::Const(ConstElement::Int(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&attrs[1], Attribute::RuntimeInvisibleAnnotations(list) if list[0].type_descriptor == "Lp/Hidden;"));
    }

    #[test]
    fn test_parameter_annotations_keep_positions() {
        let mut unit = CompileUnit::new();
        unit.side
            .annotations
            .insert(NodeId(7), resolved("p.Visible", RetentionPolicy::Runtime));
        let plain = Parameter::new("a", TypeRef::int());
        let mut annotated = Parameter::new("b", TypeRef::int());
        annotated.annotations.push(node(7, "p.Visible"));
        let attrs = parameter_annotation_attributes(&unit, &[plain, annotated]);
        assert_eq!(attrs.len(), 1);
        match &attrs[0] {
            Attribute::RuntimeVisibleParameterAnnotations(per_param) => {
                assert_eq!(per_param.len(), 2);
                assert!(per_param[0].is_empty());
                assert_eq!(per_param[1].len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_element_values() {
        assert_eq!(
            element_value(&AnnotationValue::Class(TypeRef::void())),
            ElementValue::Class("V".into())
        );
        assert_eq!(
            element_value(&AnnotationValue::Enum {
                ty: TypeRef::class("java.lang.annotation.ElementType"),
                name: "FIELD".into()
            }),
            ElementValue::Enum {
                type_descriptor: "Ljava/lang/annotation/ElementType;".into(),
                const_name: "FIELD".into()
            }
        );
        assert_eq!(
            element_value(&AnnotationValue::Char('x')),
            ElementValue::Const(ConstElement::Char(120))
        );
    }
}
