//! Property and metaclass completion
//!
//! Gives every property its accessors, makes each class a `GroovyObject`
//! with a lazily created `metaClass`, adds the per-class
//! `$getStaticMetaClass()` lookup and, where a class declares no
//! constructor, a public no-argument one.
//!
//! Superclasses are completed before their subclasses so that inherited
//! metaclass members are seen.

use super::location;
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};

pub(crate) const META_CLASS_FIELD: &str = "metaClass";
const CLASS_INFO_FIELD: &str = "$staticClassInfo";
const STATIC_META_CLASS_FLAG: &str = "__$stMC";

#[tracing::instrument(skip_all)]
pub fn complete(_ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let mut classes: Vec<ClassId> = unit
        .primary_classes()
        .into_iter()
        .filter(|&id| !unit.class(id).is_interface())
        .collect();
    classes.sort_by_key(|&id| unit.object_distance(id));

    for id in classes {
        tracing::debug!(class = %unit.class(id).name, "completing properties");
        add_accessors(unit, id);
        add_static_meta_class(unit, id)?;
        if !is_known_special_case(unit, id) {
            add_groovy_object(unit, id)?;
        }
        add_default_constructor(unit, id);
    }
    Ok(())
}

// ============================================================================
// Accessors
// ============================================================================

/// Accessor with the given name and arity in `id` or a superclass
fn find_accessor(unit: &CompileUnit, id: ClassId, name: &str, arity: usize) -> Option<(ClassId, Modifiers)> {
    std::iter::once(id).chain(unit.superclasses(id)).find_map(|cid| {
        unit.class(cid)
            .methods
            .iter()
            .find(|m| m.name == name && m.params.len() == arity)
            .map(|m| (cid, m.modifiers))
    })
}

/// No accessor at all, or an inherited one that may be overridden
fn needs_replacement(id: ClassId, found: Option<(ClassId, Modifiers)>) -> bool {
    match found {
        None => true,
        Some((owner, _)) if owner == id => false,
        Some((_, modifiers)) => !modifiers.is_final(),
    }
}

fn is_boolean_property(ty: &TypeRef) -> bool {
    ty.is_boolean() || ty.class_name() == Some("java.lang.Boolean")
}

fn add_accessors(unit: &mut CompileUnit, id: ClassId) {
    let b = unit.builder();
    let properties = std::mem::take(&mut unit.class_mut(id).properties);
    let mut methods = Vec::new();

    for mut property in properties.iter().cloned() {
        let getter_name = property.getter_name();
        let setter_name = property.setter_name();
        let is_name = format!("is{}", property.capitalized());
        let accessor_modifiers = property
            .modifiers
            .without(Modifiers::TRANSIENT | Modifiers::VOLATILE);
        let is_private = property.modifiers.is_private();

        let getter_body = match property.getter.take() {
            Some(block) => Some(block),
            None => {
                let mut existing = find_accessor(unit, id, &getter_name, 0);
                if existing.is_none() && property.ty.is_boolean() {
                    existing = find_accessor(unit, id, &is_name, 0);
                }
                (!is_private && needs_replacement(id, existing))
                    .then(|| b.block(vec![b.ret(b.field(id, property.name.clone()))]))
            }
        };
        let setter_body = match property.setter.take() {
            Some(block) => Some(block),
            None => {
                let existing = find_accessor(unit, id, &setter_name, 1);
                (!is_private && !accessor_modifiers.is_final() && needs_replacement(id, existing))
                    .then(|| {
                        b.block(vec![b.expr_stmt(b.assign(
                            b.field(id, property.name.clone()),
                            b.var("value"),
                        ))])
                    })
            }
        };

        if let Some(body) = getter_body {
            let mut getter_modifiers = accessor_modifiers;
            // static accessors are never final
            if property.modifiers.is_static() {
                getter_modifiers.remove(Modifiers::FINAL);
            }
            let mut getter = MethodNode::new(getter_name, getter_modifiers, property.ty.clone());
            getter.pos = property.pos;
            if is_boolean_property(&property.ty) && !unit.class(id).has_method(&is_name, 0) {
                let mut is_getter = getter.clone().with_body(clone_fresh(&b, &body));
                is_getter.name = is_name;
                methods.push(is_getter);
            }
            methods.push(getter.with_body(body));
        }
        if let Some(body) = setter_body {
            let mut setter = MethodNode::new(setter_name, accessor_modifiers, TypeRef::void())
                .with_params(vec![Parameter::new("value", property.ty.clone())])
                .with_body(body);
            setter.pos = property.pos;
            methods.push(setter);
        }
    }

    tracing::trace!(class = %unit.class(id).name, accessors = methods.len(), "accessors added");
    let class = unit.class_mut(id);
    class.properties = properties
        .into_iter()
        .map(|mut p| {
            p.getter = None;
            p.setter = None;
            p
        })
        .collect();
    class.methods.extend(methods);
}

/// Copy of an unresolved statement with fresh node ids
fn clone_fresh(b: &AstBuilder, stmt: &Stmt) -> Stmt {
    use crate::ast::visit::{walk_expr_mut, walk_stmt_mut, VisitorMut};

    struct Renumber<'b>(&'b AstBuilder);

    impl VisitorMut for Renumber<'_> {
        fn visit_expr_mut(&mut self, expr: &mut Expr) {
            expr.id = self.0.next_id();
            walk_expr_mut(self, expr);
        }

        fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
            stmt.id = self.0.next_id();
            walk_stmt_mut(self, stmt);
        }
    }

    let mut copy = stmt.clone();
    Renumber(b).visit_stmt_mut(&mut copy);
    copy
}

// ============================================================================
// Metaclass support
// ============================================================================

/// Classes whose superclass already implements the metaclass protocol
fn is_known_special_case(unit: &CompileUnit, id: ClassId) -> bool {
    unit.superclasses(id).iter().any(|&sup| {
        let name = unit.class(sup).name.as_str();
        name == names::GSTRING || name == names::GROOVY_OBJECT_SUPPORT
    })
}

/// Reserved field check: a user field of that name is an error unless it
/// already has the required shape
fn check_reserved_field(
    unit: &CompileUnit,
    id: ClassId,
    name: &str,
    acceptable: impl Fn(&FieldNode) -> bool,
) -> CompileResult<bool> {
    let class = unit.class(id);
    match class.field(name) {
        None => Ok(false),
        Some(field) if acceptable(field) => Ok(true),
        Some(field) => Err(CompileError::semantic(
            format!(
                "The class {} cannot declare field '{}' as this field is needed for internal groovy purposes",
                class.name, name
            ),
            location(unit, id, field.pos),
        )),
    }
}

fn add_static_meta_class(unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let flag_exists = check_reserved_field(unit, id, STATIC_META_CLASS_FLAG, |f| {
        f.modifiers.is_public() && f.ty.is_boolean()
    })?;

    let class = unit.class_mut(id);
    if !flag_exists {
        class.fields.push(FieldNode::new(
            STATIC_META_CLASS_FLAG,
            TypeRef::boolean(),
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::SYNTHETIC | Modifiers::TRANSIENT,
        ));
    }

    let mut class_info = CLASS_INFO_FIELD.to_string();
    while class.field(&class_info).is_some() {
        class_info.push('$');
    }
    class.fields.push(FieldNode::new(
        class_info.clone(),
        TypeRef::class(names::CLASS_INFO),
        Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::SYNTHETIC,
    ));

    if !class.has_method("$getStaticMetaClass", 0) {
        let b = unit.builder();
        let method = MethodNode::new(
            "$getStaticMetaClass",
            Modifiers::PROTECTED | Modifiers::SYNTHETIC,
            TypeRef::class(names::META_CLASS),
        )
        .with_body(b.synthetic(SyntheticBody::GetStaticMetaClass { class_info }));
        unit.class_mut(id).methods.push(method);
    }
    Ok(())
}

/// Declared `metaClass` field, or a non-private inherited one
fn meta_class_field(unit: &CompileUnit, id: ClassId) -> CompileResult<Option<ClassId>> {
    let class = unit.class(id);
    if let Some(field) = class.field(META_CLASS_FIELD) {
        if field.ty.erasure() != TypeRef::class(names::META_CLASS) {
            return Err(CompileError::semantic(
                format!(
                    "The class {} cannot declare field 'metaClass' of type {} as it needs to be of the type {} for internal groovy purposes",
                    class.name,
                    field.ty.display_name(),
                    names::META_CLASS
                ),
                location(unit, id, field.pos),
            ));
        }
        return Ok(Some(id));
    }
    Ok(unit.superclasses(id).into_iter().find(|&sup| {
        unit.class(sup)
            .field(META_CLASS_FIELD)
            .is_some_and(|f| !f.modifiers.is_private())
    }))
}

fn add_groovy_object(unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let b = unit.builder();
    if !unit.implements(id, names::GROOVY_OBJECT) {
        unit.class_mut(id)
            .interfaces
            .push(TypeRef::class(names::GROOVY_OBJECT));
    }
    let mut has_field = meta_class_field(unit, id)?.is_some();

    let meta_class = || TypeRef::class(names::META_CLASS);
    let object = TypeRef::object;
    let string = TypeRef::string;
    let members = [
        ("getMetaClass", meta_class(), vec![], SyntheticBody::GetMetaClass),
        (
            "setMetaClass",
            TypeRef::void(),
            vec![Parameter::new("mc", meta_class())],
            SyntheticBody::SetMetaClass,
        ),
        (
            "invokeMethod",
            object(),
            vec![Parameter::new("method", string()), Parameter::new("arguments", object())],
            SyntheticBody::InvokeMethod,
        ),
        (
            "getProperty",
            object(),
            vec![Parameter::new("property", string())],
            SyntheticBody::GetProperty,
        ),
        (
            "setProperty",
            TypeRef::void(),
            vec![Parameter::new("property", string()), Parameter::new("value", object())],
            SyntheticBody::SetProperty,
        ),
    ];

    for (name, ret, params, body) in members {
        let types: Vec<TypeRef> = params.iter().map(|p| p.ty.clone()).collect();
        if unit.find_method(id, name, &types).is_some() {
            continue;
        }
        let uses_field = matches!(body, SyntheticBody::GetMetaClass | SyntheticBody::SetMetaClass);
        if uses_field && !has_field {
            unit.class_mut(id).fields.push(FieldNode::new(
                META_CLASS_FIELD,
                meta_class(),
                Modifiers::PRIVATE | Modifiers::TRANSIENT | Modifiers::SYNTHETIC,
            ));
            has_field = true;
        }
        let method = MethodNode::new(name, Modifiers::PUBLIC | Modifiers::SYNTHETIC, ret)
            .with_params(params)
            .with_body(b.synthetic(body));
        unit.class_mut(id).methods.push(method);
    }
    Ok(())
}

fn add_default_constructor(unit: &mut CompileUnit, id: ClassId) {
    let b = unit.builder();
    let class = unit.class_mut(id);
    if class.constructors.is_empty() {
        tracing::trace!(class = %class.name, "adding default constructor");
        class
            .constructors
            .push(MethodNode::constructor(Modifiers::PUBLIC).with_body(b.block(Vec::new())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method<'a>(unit: &'a CompileUnit, id: ClassId, name: &str) -> Option<&'a MethodNode> {
        unit.class(id).methods.iter().find(|m| m.name == name)
    }

    fn person(unit: &mut CompileUnit) -> ClassId {
        let mut class = ClassNode::new("p.Person", ClassKind::Class);
        class.add_property("name", TypeRef::string(), Modifiers::PUBLIC);
        class.add_property("id", TypeRef::int(), Modifiers::PUBLIC | Modifiers::FINAL);
        class.add_property("secret", TypeRef::string(), Modifiers::PRIVATE);
        class.add_property("active", TypeRef::boolean(), Modifiers::PUBLIC);
        unit.add_class(class)
    }

    #[test]
    fn test_accessors_follow_modifiers() {
        let mut unit = CompileUnit::new();
        let id = person(&mut unit);
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let getter = method(&unit, id, "getName").unwrap();
        assert_eq!(getter.descriptor(), "()Ljava/lang/String;");
        match &getter.body.as_ref().unwrap().as_block().unwrap().stmts[0].kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::Field(f),
                ..
            })) => assert_eq!((f.owner, f.name.as_str()), (id, "name")),
            other => panic!("unexpected {:?}", other),
        }
        let setter = method(&unit, id, "setName").unwrap();
        assert_eq!(setter.descriptor(), "(Ljava/lang/String;)V");
        assert_eq!(setter.params[0].name, "value");

        assert!(method(&unit, id, "getId").is_some());
        assert!(method(&unit, id, "setId").is_none());
        assert!(method(&unit, id, "getSecret").is_none());
        assert!(method(&unit, id, "setSecret").is_none());
        assert!(method(&unit, id, "getActive").is_some());
        assert!(method(&unit, id, "isActive").is_some());
    }

    #[test]
    fn test_declared_accessor_suppresses_synthesis() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.add_property("name", TypeRef::string(), Modifiers::PUBLIC);
        class.methods.push(
            MethodNode::new("getName", Modifiers::PUBLIC, TypeRef::string())
                .with_body(b.block(vec![b.ret(b.string("fixed"))])),
        );
        let id = unit.add_class(class);
        complete(&CompilationContext::default(), &mut unit).unwrap();
        assert_eq!(unit.class(id).methods_named("getName").count(), 1);
        assert_eq!(unit.class(id).methods_named("setName").count(), 1);
    }

    #[test]
    fn test_final_inherited_accessor_is_not_overridden() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut base = ClassNode::new("p.Base", ClassKind::Class);
        base.methods.push(
            MethodNode::new("getName", Modifiers::PUBLIC | Modifiers::FINAL, TypeRef::string())
                .with_body(b.block(vec![b.ret(b.string("base"))])),
        );
        base.methods.push(
            MethodNode::new("setName", Modifiers::PUBLIC, TypeRef::void())
                .with_params(vec![Parameter::new("v", TypeRef::string())])
                .with_body(b.block(vec![])),
        );
        unit.add_class(base);
        let mut sub = ClassNode::new("p.Sub", ClassKind::Class).with_super(TypeRef::class("p.Base"));
        sub.add_property("name", TypeRef::string(), Modifiers::PUBLIC);
        let sub = unit.add_class(sub);
        complete(&CompilationContext::default(), &mut unit).unwrap();
        assert!(method(&unit, sub, "getName").is_none());
        assert!(method(&unit, sub, "setName").is_some());
    }

    #[test]
    fn test_user_getter_block_becomes_body() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.add_property("size", TypeRef::int(), Modifiers::PUBLIC);
        let block = b.block(vec![b.ret(b.int(42))]);
        class.properties[0].getter = Some(block.clone());
        let id = unit.add_class(class);
        complete(&CompilationContext::default(), &mut unit).unwrap();
        assert_eq!(method(&unit, id, "getSize").unwrap().body, Some(block));
        assert!(unit.class(id).properties[0].getter.is_none());
    }

    #[test]
    fn test_groovy_object_members() {
        let mut unit = CompileUnit::new();
        let id = person(&mut unit);
        complete(&CompilationContext::default(), &mut unit).unwrap();

        let class = unit.class(id);
        assert!(class.interfaces.contains(&TypeRef::class(names::GROOVY_OBJECT)));
        for name in ["getMetaClass", "setMetaClass", "invokeMethod", "getProperty", "setProperty"] {
            let m = method(&unit, id, name).unwrap_or_else(|| panic!("missing {}", name));
            assert!(m.modifiers.is_synthetic());
            assert!(matches!(m.body.as_ref().unwrap().kind, StmtKind::Synthetic(_)));
        }
        let field = class.field("metaClass").unwrap();
        assert!(field.modifiers.is_private());
        assert!(field.modifiers.contains(Modifiers::TRANSIENT));
        let info = class.field("$staticClassInfo").unwrap();
        assert!(info.modifiers.is_static() && info.modifiers.is_synthetic());
        let lookup = method(&unit, id, "$getStaticMetaClass").unwrap();
        assert!(lookup.modifiers.is_protected());
        assert_eq!(class.constructors.len(), 1);
        assert!(class.constructors[0].modifiers.is_public());
    }

    #[test]
    fn test_subclass_inherits_meta_class_members() {
        let mut unit = CompileUnit::new();
        // subclass first: completion still handles the base class first
        let sub = unit.add_class(ClassNode::new("p.Sub", ClassKind::Class).with_super(TypeRef::class("p.Base")));
        let base = unit.add_class(ClassNode::new("p.Base", ClassKind::Class));
        complete(&CompilationContext::default(), &mut unit).unwrap();

        assert!(method(&unit, base, "getMetaClass").is_some());
        assert!(method(&unit, sub, "getMetaClass").is_none());
        assert!(unit.class(sub).field("metaClass").is_none());
        assert!(method(&unit, sub, "$getStaticMetaClass").is_some());
        assert!(!unit.class(sub).interfaces.contains(&TypeRef::class(names::GROOVY_OBJECT)));
    }

    #[test]
    fn test_groovy_object_support_subclass_is_left_alone() {
        let mut unit = CompileUnit::new();
        let id = unit.add_class(
            ClassNode::new("p.A", ClassKind::Class).with_super(TypeRef::class(names::GROOVY_OBJECT_SUPPORT)),
        );
        complete(&CompilationContext::default(), &mut unit).unwrap();
        assert!(method(&unit, id, "getMetaClass").is_none());
        assert!(unit.class(id).interfaces.is_empty());
    }

    #[test]
    fn test_class_info_name_is_made_unique() {
        let mut unit = CompileUnit::new();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class
            .fields
            .push(FieldNode::new("$staticClassInfo", TypeRef::int(), Modifiers::PRIVATE));
        let id = unit.add_class(class);
        complete(&CompilationContext::default(), &mut unit).unwrap();
        match &method(&unit, id, "$getStaticMetaClass").unwrap().body.as_ref().unwrap().kind {
            StmtKind::Synthetic(SyntheticBody::GetStaticMetaClass { class_info }) => {
                assert_eq!(class_info, "$staticClassInfo$")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_meta_class_field_of_wrong_type() {
        let mut unit = CompileUnit::new();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class
            .fields
            .push(FieldNode::new("metaClass", TypeRef::string(), Modifiers::PRIVATE));
        unit.add_class(class);
        let err = complete(&CompilationContext::default(), &mut unit).unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot declare field 'metaClass' of type java.lang.String"));
    }

    #[test]
    fn test_interfaces_are_skipped() {
        let mut unit = CompileUnit::new();
        let id = unit.add_class(ClassNode::new("p.I", ClassKind::Interface));
        complete(&CompilationContext::default(), &mut unit).unwrap();
        assert!(unit.class(id).methods.is_empty());
        assert!(unit.class(id).constructors.is_empty());
    }
}
