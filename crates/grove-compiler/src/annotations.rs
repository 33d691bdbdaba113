//! Annotation processing
//!
//! Checks every annotation use against the members of its annotation type
//! and coerces the attribute values into [`AnnotationValue`]s, the form the
//! class-file writer encodes. Annotation-type definitions get their member
//! defaults coerced the same way and are checked for circular references.
//!
//! Problems with individual attributes are collected; a circular annotation
//! type aborts.

use crate::ast::*;
use crate::complete::location;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult, Location};
use rustc_hash::FxHashSet;

/// How long an annotation is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Dropped by the compiler
    Source,
    /// Written as `RuntimeInvisibleAnnotations`
    Class,
    /// Written as `RuntimeVisibleAnnotations`
    Runtime,
}

impl RetentionPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SOURCE" => Some(RetentionPolicy::Source),
            "CLASS" => Some(RetentionPolicy::Class),
            "RUNTIME" => Some(RetentionPolicy::Runtime),
            _ => None,
        }
    }
}

/// Annotation use after attribute coercion
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAnnotation {
    pub ty: TypeRef,
    pub retention: RetentionPolicy,
    /// Explicit attribute values in source order; defaults stay with the
    /// annotation type
    pub values: Vec<(String, AnnotationValue)>,
}

/// Typed attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(TypeRef),
    Enum { ty: TypeRef, name: String },
    Annotation(Box<ResolvedAnnotation>),
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// `element_value` tag
    pub fn tag(&self) -> u8 {
        match self {
            AnnotationValue::Boolean(_) => b'Z',
            AnnotationValue::Byte(_) => b'B',
            AnnotationValue::Char(_) => b'C',
            AnnotationValue::Short(_) => b'S',
            AnnotationValue::Int(_) => b'I',
            AnnotationValue::Long(_) => b'J',
            AnnotationValue::Float(_) => b'F',
            AnnotationValue::Double(_) => b'D',
            AnnotationValue::String(_) => b's',
            AnnotationValue::Class(_) => b'c',
            AnnotationValue::Enum { .. } => b'e',
            AnnotationValue::Annotation(_) => b'@',
            AnnotationValue::Array(_) => b'[',
        }
    }
}

/// Retention declared by the annotation type's `@Retention`; `CLASS` when
/// there is none
pub fn retention_of(unit: &CompileUnit, ty: &TypeRef) -> RetentionPolicy {
    let Some(id) = unit.resolve(ty) else {
        return RetentionPolicy::Class;
    };
    unit.class(id)
        .annotations
        .iter()
        .filter(|a| a.ty.class_name() == Some(names::RETENTION))
        .find_map(|a| match &a.member("value")?.kind {
            ExprKind::Property(PropertyAccess {
                name: MemberName::Static(name),
                ..
            }) => RetentionPolicy::from_name(name),
            ExprKind::Variable(v) => RetentionPolicy::from_name(&v.name),
            _ => None,
        })
        .unwrap_or(RetentionPolicy::Class)
}

#[tracing::instrument(skip_all)]
pub fn process(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let mut resolved = Vec::new();
    let mut defaults = Vec::new();
    {
        let shared: &CompileUnit = unit;
        let processor = AnnotationProcessor { ctx, unit: shared };
        for id in shared.primary_classes() {
            for node in annotation_uses(shared.class(id)) {
                if let Some(annotation) = processor.resolve(id, node)? {
                    resolved.push((node.id, annotation));
                }
            }
            if shared.class(id).is_annotation() {
                processor.check_definition(id, &mut defaults)?;
            }
        }
    }
    tracing::debug!(uses = resolved.len(), defaults = defaults.len(), "annotations resolved");
    unit.side.annotations.extend(resolved);
    unit.side.annotation_defaults.extend(defaults);
    Ok(())
}

/// Every annotation attached to the class or one of its members
fn annotation_uses(class: &ClassNode) -> Vec<&AnnotationNode> {
    let mut uses: Vec<&AnnotationNode> = class.annotations.iter().collect();
    uses.extend(class.fields.iter().flat_map(|f| &f.annotations));
    for method in class.methods.iter().chain(&class.constructors) {
        uses.extend(&method.annotations);
        uses.extend(method.params.iter().flat_map(|p| &p.annotations));
    }
    uses
}

struct AnnotationProcessor<'a> {
    ctx: &'a CompilationContext,
    unit: &'a CompileUnit,
}

impl AnnotationProcessor<'_> {
    fn is_annotation_type(&self, ty: &TypeRef) -> Option<ClassId> {
        let id = self.unit.resolve(ty)?;
        let class = self.unit.class(id);
        (class.is_annotation() || self.unit.implements(id, names::ANNOTATION)).then_some(id)
    }

    fn error(&self, owner: ClassId, message: String, pos: SourcePos) -> CompileResult<()> {
        self.ctx.error(message, self.at(owner, pos))
    }

    fn at(&self, owner: ClassId, pos: SourcePos) -> Location {
        location(self.unit, owner, pos)
    }

    /// Check one annotation use; `None` once an error has been reported
    fn resolve(&self, owner: ClassId, node: &AnnotationNode) -> CompileResult<Option<ResolvedAnnotation>> {
        let unit = self.unit;
        let Some(ty_id) = self.is_annotation_type(&node.ty) else {
            self.error(owner, format!("class {} is not an annotation", node.ty), node.pos)?;
            return Ok(None);
        };
        let annotation_type = unit.class(ty_id);

        let mut complete = true;
        for member in &annotation_type.methods {
            if member.annotation_default.is_none() && node.member(&member.name).is_none() {
                self.error(
                    owner,
                    format!(
                        "No explicit/default value found for annotation attribute '{}'",
                        member.name
                    ),
                    node.pos,
                )?;
                complete = false;
            }
        }
        if !complete {
            return Ok(None);
        }

        for (_, value) in &node.members {
            if !self.check_enum_constant(owner, value)? {
                return Ok(None);
            }
        }

        let mut values = Vec::with_capacity(node.members.len());
        let mut ok = true;
        for (name, value) in &node.members {
            let attr_type = match annotation_type.methods_named(name).next() {
                Some(member) => member.return_type.clone(),
                None => {
                    self.error(
                        owner,
                        format!("'{}'is not part of the annotation {}", name, annotation_type.name),
                        node.pos,
                    )?;
                    TypeRef::object()
                }
            };
            match self.coerce(owner, name, value, &attr_type)? {
                Some(coerced) => values.push((name.clone(), coerced)),
                None => ok = false,
            }
        }
        if !ok {
            return Ok(None);
        }
        Ok(Some(ResolvedAnnotation {
            ty: node.ty.erasure(),
            retention: retention_of(unit, &node.ty),
            values,
        }))
    }

    /// `Type.NAME` must name a constant of an enum `Type`
    fn check_enum_constant(&self, owner: ClassId, value: &Expr) -> CompileResult<bool> {
        let Some((ty, name)) = enum_reference(value) else {
            return Ok(true);
        };
        let Some(id) = self.unit.resolve(ty) else {
            return Ok(true);
        };
        let class = self.unit.class(id);
        if !class.is_enum() {
            return Ok(true);
        }
        let declared = class
            .field(name)
            .is_some_and(|f| f.ty.erasure() == class.type_ref());
        if !declared {
            self.error(owner, format!("No enum const {}.{}", class.name, name), value.pos)?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Coerce `value` to the attribute type; `None` once an error has been
    /// reported
    fn coerce(
        &self,
        owner: ClassId,
        attr: &str,
        value: &Expr,
        ty: &TypeRef,
    ) -> CompileResult<Option<AnnotationValue>> {
        if let TypeRef::Array(component) = ty.erasure() {
            let elements: Vec<&Expr> = match &value.kind {
                ExprKind::List(values) => values.iter().collect(),
                ExprKind::Closure(_) => {
                    self.error(
                        owner,
                        "Annotation list attributes must use Groovy notation [el1, el2]".to_string(),
                        value.pos,
                    )?;
                    return Ok(None);
                }
                // a single value stands for a one-element array
                _ => vec![value],
            };
            let mut out = Vec::with_capacity(elements.len());
            let mut ok = true;
            for element in elements {
                match self.coerce(owner, attr, element, &component)? {
                    Some(v) => out.push(v),
                    None => ok = false,
                }
            }
            return Ok(ok.then_some(AnnotationValue::Array(out)));
        }

        if let Some(primitive) = ty.primitive() {
            let Some(constant) = self.inline_constant(owner, value, ty)? else {
                return Ok(None);
            };
            return match coerce_primitive(&constant, primitive) {
                Some(v) => Ok(Some(v)),
                None => {
                    self.type_mismatch(owner, attr, &TypeRef::class(primitive.wrapper()), &constant, value.pos)?;
                    Ok(None)
                }
            };
        }

        match ty.class_name() {
            Some(names::STRING) => {
                let Some(constant) = self.inline_constant(owner, value, ty)? else {
                    return Ok(None);
                };
                match constant {
                    ConstValue::String(s) => Ok(Some(AnnotationValue::String(s))),
                    other => {
                        self.type_mismatch(owner, attr, ty, &other, value.pos)?;
                        Ok(None)
                    }
                }
            }
            Some(names::CLASS) => match &value.kind {
                ExprKind::ClassLiteral(class) => Ok(Some(AnnotationValue::Class(class.erasure()))),
                _ => {
                    self.error(
                        owner,
                        format!("Only classes and closures can be used for attribute '{}'", attr),
                        value.pos,
                    )?;
                    Ok(None)
                }
            },
            _ => self.coerce_reference(owner, attr, value, ty),
        }
    }

    fn coerce_reference(
        &self,
        owner: ClassId,
        attr: &str,
        value: &Expr,
        ty: &TypeRef,
    ) -> CompileResult<Option<AnnotationValue>> {
        let unit = self.unit;
        let target = unit.resolve(ty);
        let enum_type = unit.find(names::ENUM);
        let is_enum = matches!((target, enum_type), (Some(t), Some(e)) if t != e && unit.is_subclass_of(t, e));

        if is_enum {
            let Some((found, name)) = enum_reference(value) else {
                self.error(owner, format!("Expected enum value for attribute {}", attr), value.pos)?;
                return Ok(None);
            };
            if !unit.is_assignable(found, ty) {
                self.error(
                    owner,
                    format!(
                        "Attribute '{}' should have type '{}' (Enum), but found {}",
                        attr, ty, found
                    ),
                    value.pos,
                )?;
                return Ok(None);
            }
            if !self.check_enum_constant(owner, value)? {
                return Ok(None);
            }
            return Ok(Some(AnnotationValue::Enum {
                ty: found.erasure(),
                name: name.to_string(),
            }));
        }

        if self.is_annotation_type(ty).is_some() {
            return match &value.kind {
                ExprKind::Annotation(nested) if nested.ty.erasure() == ty.erasure() => Ok(self
                    .resolve(owner, nested)?
                    .map(|a| AnnotationValue::Annotation(Box::new(a)))),
                _ => {
                    self.error(
                        owner,
                        format!("Expected annotation of type '{}' for attribute {}", ty, attr),
                        value.pos,
                    )?;
                    Ok(None)
                }
            };
        }

        self.error(owner, format!("Unexpected type {}", ty), value.pos)?;
        Ok(None)
    }

    /// Constant value of `value`, looking through references to static
    /// final fields with constant initializers
    fn inline_constant(&self, owner: ClassId, value: &Expr, ty: &TypeRef) -> CompileResult<Option<ConstValue>> {
        if let Some(constant) = fold_constant(self.unit, value) {
            return Ok(Some(constant));
        }
        let base = format!(
            "Expected '{}' to be an inline constant of type {}",
            expr_text(value),
            ty
        );
        let message = match &value.kind {
            ExprKind::Property(_) => format!("{} not a property expression", base),
            ExprKind::Variable(VariableRef {
                binding: Some(Binding::Field { .. }),
                ..
            }) => format!("{} not a field expression", base),
            _ => base,
        };
        self.error(owner, message, value.pos)?;
        Ok(None)
    }

    fn type_mismatch(
        &self,
        owner: ClassId,
        attr: &str,
        expected: &TypeRef,
        found: &ConstValue,
        pos: SourcePos,
    ) -> CompileResult<()> {
        self.error(
            owner,
            format!(
                "Attribute '{}' should have type '{}'; but found type '{}'",
                attr,
                expected,
                found.type_ref().boxed()
            ),
            pos,
        )
    }

    /// Member defaults of an annotation type: return types must be legal,
    /// defaults are coerced, and no default may lead back to the type
    fn check_definition(
        &self,
        id: ClassId,
        defaults: &mut Vec<((ClassId, String), AnnotationValue)>,
    ) -> CompileResult<()> {
        let unit = self.unit;
        let class = unit.class(id);
        for member in &class.methods {
            if !self.is_legal_member_type(&member.return_type) {
                self.error(
                    id,
                    format!("Unexpected return type {}", member.return_type),
                    member.pos,
                )?;
                continue;
            }
            let Some(default) = &member.annotation_default else {
                continue;
            };
            let mut visited = FxHashSet::default();
            self.check_circular_reference(id, id, &member.return_type, default, &mut visited)?;
            if let Some(value) = self.coerce(id, &member.name, default, &member.return_type)? {
                defaults.push(((id, member.name.clone()), value));
            }
        }
        Ok(())
    }

    fn is_legal_member_type(&self, ty: &TypeRef) -> bool {
        if let Some(component) = ty.component() {
            return self.is_legal_member_type(component);
        }
        if ty.is_primitive() {
            return !ty.is_void();
        }
        if matches!(ty.class_name(), Some(names::STRING) | Some(names::CLASS)) {
            return true;
        }
        let unit = self.unit;
        let is_enum = unit.resolve(ty).is_some_and(|id| unit.class(id).is_enum());
        is_enum || self.is_annotation_type(ty).is_some()
    }

    fn check_circular_reference(
        &self,
        owner: ClassId,
        search: ClassId,
        attr_type: &TypeRef,
        value: &Expr,
        visited: &mut FxHashSet<ClassId>,
    ) -> CompileResult<()> {
        let unit = self.unit;
        let attr_type = attr_type.component().unwrap_or(attr_type);
        if self.is_annotation_type(attr_type).is_none() {
            return Ok(());
        }
        let nested = match &value.kind {
            ExprKind::Annotation(nested) => vec![nested.as_ref()],
            ExprKind::List(values) => values
                .iter()
                .filter_map(|v| match &v.kind {
                    ExprKind::Annotation(nested) => Some(nested.as_ref()),
                    _ => None,
                })
                .collect(),
            _ => {
                self.error(
                    owner,
                    format!("Found '{}' when expecting an Annotation Constant", expr_text(value)),
                    value.pos,
                )?;
                return Ok(());
            }
        };
        let search_name = &unit.class(search).name;
        for node in nested {
            let Some(node_type) = unit.resolve(&node.ty) else {
                continue;
            };
            if node_type == search {
                return Err(CompileError::CircularAnnotation {
                    annotation: search_name.clone(),
                    location: self.at(owner, value.pos),
                });
            }
            if !visited.insert(node_type) {
                continue;
            }
            let class = unit.class(node_type);
            for member in &class.methods {
                if member.return_type.erasure() == unit.class(search).type_ref() {
                    return Err(CompileError::CircularAnnotation {
                        annotation: class.name.clone(),
                        location: self.at(owner, value.pos),
                    });
                }
                if let Some(default) = &member.annotation_default {
                    self.check_circular_reference(owner, search, &member.return_type, default, visited)?;
                }
            }
        }
        Ok(())
    }
}

/// `Type.NAME` written as a property of a class literal
fn enum_reference(value: &Expr) -> Option<(&TypeRef, &str)> {
    match &value.kind {
        ExprKind::Property(PropertyAccess {
            object,
            name: MemberName::Static(name),
            ..
        }) => match &object.kind {
            ExprKind::ClassLiteral(ty) => Some((ty, name.as_str())),
            _ => None,
        },
        _ => None,
    }
}

/// Constant value of an expression built from literals, negation and
/// static final fields with constant initializers
fn fold_constant(unit: &CompileUnit, value: &Expr) -> Option<ConstValue> {
    let static_final = |owner: ClassId, name: &str| {
        let field = unit.class(owner).field(name)?;
        if !(field.modifiers.is_static() && field.modifiers.is_final()) {
            return None;
        }
        fold_constant(unit, field.initial.as_ref()?)
    };
    match &value.kind {
        ExprKind::Constant(c) => Some(c.clone()),
        ExprKind::Negate(inner) => match fold_constant(unit, inner)? {
            ConstValue::Int(i) => Some(ConstValue::Int(i.wrapping_neg())),
            ConstValue::Long(l) => Some(ConstValue::Long(l.wrapping_neg())),
            ConstValue::Float(f) => Some(ConstValue::Float(-f)),
            ConstValue::Double(d) => Some(ConstValue::Double(-d)),
            _ => None,
        },
        ExprKind::Variable(VariableRef {
            binding: Some(Binding::Field { owner, name, .. }),
            ..
        })
        | ExprKind::Field(FieldAccess { owner, name, .. }) => static_final(*owner, name),
        ExprKind::Property(PropertyAccess {
            object,
            name: MemberName::Static(name),
            ..
        }) => match &object.kind {
            ExprKind::ClassLiteral(ty) => static_final(unit.resolve(ty)?, name),
            _ => None,
        },
        _ => None,
    }
}

/// Literal coercion into a primitive attribute; integer literals widen and
/// narrow to the smaller integral types when the value fits
fn coerce_primitive(value: &ConstValue, ty: Primitive) -> Option<AnnotationValue> {
    match (ty, value) {
        (Primitive::Boolean, ConstValue::Bool(b)) => Some(AnnotationValue::Boolean(*b)),
        (Primitive::Char, ConstValue::Char(c)) => Some(AnnotationValue::Char(*c)),
        (Primitive::Byte, ConstValue::Int(i)) => i8::try_from(*i).ok().map(AnnotationValue::Byte),
        (Primitive::Short, ConstValue::Int(i)) => i16::try_from(*i).ok().map(AnnotationValue::Short),
        (Primitive::Int, ConstValue::Int(i)) => Some(AnnotationValue::Int(*i)),
        (Primitive::Long, ConstValue::Int(i)) => Some(AnnotationValue::Long(i64::from(*i))),
        (Primitive::Long, ConstValue::Long(l)) => Some(AnnotationValue::Long(*l)),
        (Primitive::Float, ConstValue::Int(i)) => Some(AnnotationValue::Float(*i as f32)),
        (Primitive::Float, ConstValue::Float(f)) => Some(AnnotationValue::Float(*f)),
        (Primitive::Double, ConstValue::Int(i)) => Some(AnnotationValue::Double(f64::from(*i))),
        (Primitive::Double, ConstValue::Long(l)) => Some(AnnotationValue::Double(*l as f64)),
        (Primitive::Double, ConstValue::Float(f)) => Some(AnnotationValue::Double(f64::from(*f))),
        (Primitive::Double, ConstValue::Double(d)) => Some(AnnotationValue::Double(*d)),
        _ => None,
    }
}

/// Short source-like rendering for messages
fn expr_text(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Constant(ConstValue::String(s)) => s.clone(),
        ExprKind::Constant(ConstValue::Null) => "null".to_string(),
        ExprKind::Constant(ConstValue::Bool(b)) => b.to_string(),
        ExprKind::Constant(ConstValue::Int(i)) => i.to_string(),
        ExprKind::Constant(ConstValue::Long(l)) => l.to_string(),
        ExprKind::Constant(ConstValue::Float(f)) => f.to_string(),
        ExprKind::Constant(ConstValue::Double(d)) => d.to_string(),
        ExprKind::Constant(ConstValue::Char(c)) => c.to_string(),
        ExprKind::Variable(v) => v.name.clone(),
        ExprKind::This => "this".to_string(),
        ExprKind::ClassLiteral(ty) => ty.display_name(),
        ExprKind::Property(p) => match &p.name {
            MemberName::Static(name) => format!("{}.{}", expr_text(&p.object), name),
            MemberName::Dynamic(name) => format!("{}.\"{}\"", expr_text(&p.object), expr_text(name)),
        },
        ExprKind::Field(f) => f.name.clone(),
        ExprKind::MethodCall(call) => format!(
            "{}.{}(...)",
            expr_text(&call.object),
            call.name.as_str().unwrap_or("<dynamic>")
        ),
        ExprKind::Negate(inner) => format!("-{}", expr_text(inner)),
        ExprKind::List(values) => format!(
            "[{}]",
            values.iter().map(expr_text).collect::<Vec<_>>().join(", ")
        ),
        ExprKind::Annotation(node) => format!("@{}", node.ty),
        ExprKind::Closure(_) => "{ ... }".to_string(),
        _ => "<expression>".to_string(),
    }
}
