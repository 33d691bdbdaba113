//! Enum completion
//!
//! Adds the members every enum carries (`$VALUES`, `MIN_VALUE`,
//! `MAX_VALUE`, `values()`, `valueOf(String)`, `next()`, `previous()`,
//! `$INIT`), threads the name/ordinal pair through the constructors, and
//! prepends the constant initialization to the static initializer.
//!
//! Constant body classes are completed first; they only get a `$INIT`
//! factory and a forwarding constructor.

use super::{body_stmts_mut, location, param_ref, special_ctor_call_mut, unique_name};
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::CompileResult;
use crate::scope::declare_parameter;

pub fn complete(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    for id in unit.primary_classes() {
        if !unit.class(id).is_enum() {
            continue;
        }
        tracing::debug!(class = %unit.class(id).name, "completing enum");
        let bodies: Vec<(ClassId, usize)> = unit
            .class(id)
            .fields
            .iter()
            .filter_map(|f| f.enum_body.map(|body| (body, constant_args(f).len())))
            .collect();
        for (body, arg_count) in bodies {
            complete_constant_body(unit, body, arg_count);
        }
        complete_enum(ctx, unit, id)?;
    }
    Ok(())
}

fn constant_args(field: &FieldNode) -> &[Expr] {
    match &field.initial {
        Some(Expr {
            kind: ExprKind::List(args),
            ..
        }) => args,
        _ => &[],
    }
}

/// `$INIT(Object[] para)` returning `new T(*para)`
fn init_method(b: &AstBuilder, ty: TypeRef, is_final: bool) -> MethodNode {
    let mut modifiers = Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::SYNTHETIC;
    if is_final {
        modifiers |= Modifiers::FINAL;
    }
    MethodNode::new("$INIT", modifiers, ty.clone())
        .with_params(vec![Parameter::new("para", TypeRef::array(TypeRef::object()))])
        .with_body(b.block(vec![b.ret(b.new_(ty, vec![b.spread(b.var("para"))]))]))
}

fn complete_constant_body(unit: &mut CompileUnit, id: ClassId, arg_count: usize) {
    let b = unit.builder();
    let class = unit.class_mut(id);
    class.modifiers |= Modifiers::ENUM;
    let ty = class.type_ref();
    class.methods.push(init_method(&b, ty, false));
    if class.constructors.is_empty() {
        let mut params = vec![
            Parameter::new("__str", TypeRef::string()),
            Parameter::new("__int", TypeRef::int()),
        ];
        params.extend((0..arg_count).map(|i| Parameter::new(format!("__arg{}", i), TypeRef::object())));
        let args = params.iter().map(|p| param_ref(&b, p)).collect();
        class.constructors.push(
            MethodNode::constructor(Modifiers::NONE)
                .with_params(params)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_super(args))])),
        );
    }
}

fn complete_enum(ctx: &CompilationContext, unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let b = unit.builder();
    let class = unit.class(id);
    let name = class.name.clone();
    let simple = types::simple_name(&name).to_string();
    let enum_ty = class.type_ref();
    let has_bodies = class.fields.iter().any(|f| f.enum_body.is_some());

    if class.modifiers.contains(Modifiers::ABSTRACT) || class.modifiers.contains(Modifiers::FINAL) {
        let permitted = if class.outer.is_some() {
            "public, private, protected & static are"
        } else {
            "public is"
        };
        ctx.error(
            format!("Illegal modifier for the enum {}; only {} permitted.", simple, permitted),
            location(unit, id, class.pos),
        )?;
        let class = unit.class_mut(id);
        class.modifiers.remove(Modifiers::ABSTRACT | Modifiers::FINAL);
    }

    check_constants(ctx, unit, id, &simple)?;
    complete_constructors(ctx, unit, id, &simple, has_bodies)?;

    let values_ty = TypeRef::array(enum_ty.clone());
    let has_constants = unit.class(id).fields.iter().any(|f| f.is_enum_constant());
    let (has_next, has_previous) = {
        let class = unit.class(id);
        (class.has_method("next", 0), class.has_method("previous", 0))
    };

    let mut methods = Vec::new();
    methods.push(
        MethodNode::new(
            "values",
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNTHETIC,
            values_ty.clone(),
        )
        .with_body(b.block(vec![b.ret(b.call(b.field(id, "$VALUES"), "clone", vec![]))])),
    );
    if !has_next {
        let body = if has_constants {
            b.block(vec![
                b.expr_stmt(b.declare(
                    "ordinal",
                    TypeRef::int(),
                    Some(b.binary(BinaryOp::Add, b.call_this("ordinal", vec![]), b.int(1))),
                )),
                b.if_(
                    b.binary(
                        BinaryOp::Ge,
                        b.var("ordinal"),
                        b.prop(b.field(id, "$VALUES"), "length"),
                    ),
                    b.ret(b.field(id, "MIN_VALUE")),
                    None,
                ),
                b.ret(b.binary(BinaryOp::Index, b.field(id, "$VALUES"), b.var("ordinal"))),
            ])
        } else {
            b.block(vec![b.ret(b.null())])
        };
        methods.push(
            MethodNode::new("next", Modifiers::PUBLIC | Modifiers::SYNTHETIC, enum_ty.clone())
                .with_body(body),
        );
    }
    if !has_previous {
        let body = if has_constants {
            b.block(vec![
                b.expr_stmt(b.declare(
                    "ordinal",
                    TypeRef::int(),
                    Some(b.binary(BinaryOp::Sub, b.call_this("ordinal", vec![]), b.int(1))),
                )),
                b.if_(
                    b.binary(BinaryOp::Lt, b.var("ordinal"), b.int(0)),
                    b.ret(b.field(id, "MAX_VALUE")),
                    None,
                ),
                b.ret(b.binary(BinaryOp::Index, b.field(id, "$VALUES"), b.var("ordinal"))),
            ])
        } else {
            b.block(vec![b.ret(b.null())])
        };
        methods.push(
            MethodNode::new("previous", Modifiers::PUBLIC | Modifiers::SYNTHETIC, enum_ty.clone())
                .with_body(body),
        );
    }
    methods.push(
        MethodNode::new(
            "valueOf",
            Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::SYNTHETIC,
            enum_ty.clone(),
        )
        .with_params(vec![Parameter::new("name", TypeRef::string())])
        .with_body(b.block(vec![b.ret(b.static_call(
            TypeRef::class(names::ENUM),
            "valueOf",
            vec![b.class_lit(enum_ty.clone()), b.var("name")],
        ))])),
    );
    methods.push(init_method(&b, enum_ty.clone(), !has_bodies));

    // Constant initialization, in declaration order
    let mut constants = Vec::new();
    for field in unit
        .class_mut(id)
        .fields
        .iter_mut()
        .filter(|f| f.is_enum_constant())
    {
        let ordinal = constants.len() as i32;
        let mut args = vec![b.string(field.name.clone()), b.int(ordinal)];
        if let Some(Expr {
            kind: ExprKind::List(values),
            ..
        }) = field.initial.take()
        {
            args.extend(values);
        }
        constants.push((field.name.clone(), field.enum_body, args));
    }
    let mut init = Vec::new();
    for (field, body, args) in constants.iter_mut() {
        // A constant with a body is created by its own class
        let owner = match body {
            Some(body) => unit.class(*body).type_ref(),
            None => enum_ty.clone(),
        };
        init.push(b.expr_stmt(b.assign(
            b.field(id, field.clone()),
            b.static_call(owner, "$INIT", std::mem::take(args)),
        )));
    }

    let class = unit.class_mut(id);
    if let (Some(first), Some(last)) = (constants.first(), constants.last()) {
        init.push(b.expr_stmt(b.assign(b.field(id, "MIN_VALUE"), b.field(id, first.0.clone()))));
        init.push(b.expr_stmt(b.assign(b.field(id, "MAX_VALUE"), b.field(id, last.0.clone()))));
        for field in ["MIN_VALUE", "MAX_VALUE"] {
            class.fields.push(FieldNode::new(
                field,
                enum_ty.clone(),
                Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL,
            ));
        }
    }
    init.push(b.expr_stmt(b.assign(
        b.field(id, "$VALUES"),
        b.array(
            enum_ty.clone(),
            constants
                .iter()
                .map(|(field, ..)| b.field(id, field.clone()))
                .collect(),
        ),
    )));
    class.fields.push(FieldNode::new(
        "$VALUES",
        values_ty,
        Modifiers::PRIVATE | Modifiers::STATIC | Modifiers::FINAL | Modifiers::SYNTHETIC,
    ));
    class.static_initializers.insert(0, b.block(init));
    class.methods.extend(methods);

    if class.methods.iter().any(|m| m.modifiers.is_abstract()) {
        class.modifiers |= Modifiers::ABSTRACT;
    } else if !has_bodies {
        class.modifiers |= Modifiers::FINAL;
    }
    tracing::trace!(class = %class.name, constants = constants.len(), "enum completed");
    Ok(())
}

fn check_constants(ctx: &CompilationContext, unit: &CompileUnit, id: ClassId, simple: &str) -> CompileResult<()> {
    let class = unit.class(id);
    let abstract_methods: Vec<&MethodNode> =
        class.methods.iter().filter(|m| m.modifiers.is_abstract()).collect();
    let has_no_arg_ctor =
        class.constructors.is_empty() || class.constructors.iter().any(|c| c.params.is_empty());
    for field in class.fields.iter().filter(|f| f.is_enum_constant()) {
        let loc = location(unit, id, field.pos);
        match field.enum_body {
            None => {
                if !abstract_methods.is_empty() {
                    ctx.error(
                        format!(
                            "The enum constant {} must override abstract methods from {}.",
                            field.name, class.name
                        ),
                        loc.clone(),
                    )?;
                }
                if field.initial.is_none() && !has_no_arg_ctor {
                    ctx.error(format!("The constructor {}() is undefined.", simple), loc)?;
                }
            }
            Some(body) => {
                let body = unit.class(body);
                for method in &abstract_methods {
                    let implemented = body
                        .declared_method(&method.name, &method.erased_params())
                        .map(|m| !m.modifiers.is_abstract())
                        .unwrap_or(false);
                    if !implemented {
                        ctx.error(
                            format!(
                                "Can't have an abstract method in enum constant {}. Implement method '{}'.",
                                field.name,
                                method.type_descriptor()
                            ),
                            loc.clone(),
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Prepend the name/ordinal parameters to every constructor and forward
/// them to `this(...)` or `super(...)`
fn complete_constructors(
    ctx: &CompilationContext,
    unit: &mut CompileUnit,
    id: ClassId,
    simple: &str,
    has_bodies: bool,
) -> CompileResult<()> {
    let b = unit.builder();
    let visibility = if has_bodies { Modifiers::NONE } else { Modifiers::PRIVATE };
    let mut ctors = std::mem::take(&mut unit.class_mut(id).constructors);

    for ctor in &mut ctors {
        if ctor.modifiers.is_public() || ctor.modifiers.is_protected() {
            ctx.error(
                "Illegal modifier for the enum constructor; only private is permitted.",
                location(unit, id, ctor.pos),
            )?;
        }
        let calls_super = matches!(
            ctor.body.as_ref().and_then(|body| body.first_statement()).map(|s| &s.kind),
            Some(StmtKind::Expr(Expr { kind: ExprKind::ConstructorCall(ConstructorCall { kind: CtorKind::Super, .. }), .. }))
        );
        if calls_super {
            let types: Vec<String> = ctor.params.iter().map(|p| p.ty.display_name()).collect();
            ctx.error(
                format!(
                    "Cannot invoke super constructor from enum constructor {}({})",
                    simple,
                    types.join(",")
                ),
                location(unit, id, ctor.pos),
            )?;
        }
        ctor.modifiers = ctor.modifiers.with_visibility(visibility);

        let taken = |name: &str| ctor.params.iter().any(|p| p.name == name);
        let mut name_param = Parameter::new(unique_name("__str", taken), TypeRef::string());
        let mut ordinal_param = Parameter::new(unique_name("__int", taken), TypeRef::int());
        if let Some(scope) = ctor.scope {
            declare_parameter(unit, scope, &mut name_param);
            declare_parameter(unit, scope, &mut ordinal_param);
        }
        let forwarded = [param_ref(&b, &name_param), param_ref(&b, &ordinal_param)];
        ctor.params.insert(0, ordinal_param);
        ctor.params.insert(0, name_param);

        let stmts = body_stmts_mut(&b, ctor);
        match special_ctor_call_mut(stmts) {
            Some(call) => {
                call.args.splice(0..0, forwarded);
            }
            None => stmts.insert(0, b.expr_stmt(b.ctor_super(forwarded.to_vec()))),
        }
    }

    if ctors.is_empty() {
        let params = vec![
            Parameter::new("__str", TypeRef::string()),
            Parameter::new("__int", TypeRef::int()),
        ];
        let args = params.iter().map(|p| param_ref(&b, p)).collect();
        ctors.push(
            MethodNode::constructor(visibility)
                .with_params(params)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_super(args))])),
        );
    }
    unit.class_mut(id).constructors = ctors;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope;

    fn color_enum(unit: &mut CompileUnit) -> ClassId {
        let b = unit.builder();
        let mut class = ClassNode::new("p.Color", ClassKind::Enum);
        for name in ["RED", "GREEN", "BLUE"] {
            class.fields.push(FieldNode::new(
                name,
                TypeRef::class("p.Color"),
                Modifiers::PUBLIC | Modifiers::STATIC | Modifiers::FINAL | Modifiers::ENUM,
            ));
        }
        class.fields.push(
            FieldNode::new("COUNT", TypeRef::int(), Modifiers::PUBLIC | Modifiers::STATIC)
                .with_initial(b.int(3)),
        );
        unit.add_class(class)
    }

    fn init_calls(unit: &CompileUnit, id: ClassId) -> Vec<(String, Vec<Expr>)> {
        let init = &unit.class(id).static_initializers[0];
        init.as_block()
            .unwrap()
            .stmts
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Expr(Expr {
                    kind: ExprKind::Assign(assign),
                    ..
                }) => match (&assign.target.kind, &assign.value.kind) {
                    (ExprKind::Field(f), ExprKind::StaticCall(call)) => {
                        Some((f.name.clone(), call.args.clone()))
                    }
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ordinals_follow_declaration_order() {
        let mut unit = CompileUnit::new();
        let id = color_enum(&mut unit);
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let calls = init_calls(&unit, id);
        let ordinals: Vec<(String, ConstValue)> = calls
            .iter()
            .map(|(name, args)| match &args[1].kind {
                ExprKind::Constant(c) => (name.clone(), c.clone()),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            ordinals,
            vec![
                ("RED".to_string(), ConstValue::Int(0)),
                ("GREEN".to_string(), ConstValue::Int(1)),
                ("BLUE".to_string(), ConstValue::Int(2)),
            ]
        );
        assert!(!ctx.errors().has_errors());
    }

    #[test]
    fn test_synthesized_members() {
        let mut unit = CompileUnit::new();
        let id = color_enum(&mut unit);
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let class = unit.class(id);
        for name in ["values", "valueOf", "next", "previous", "$INIT"] {
            assert!(class.methods.iter().any(|m| m.name == name), "missing {}", name);
        }
        assert!(class.field("$VALUES").unwrap().modifiers.is_synthetic());
        assert!(class.field("MIN_VALUE").is_some());
        assert!(class.field("MAX_VALUE").is_some());
        assert!(class.modifiers.is_final());

        let ctor = &class.constructors[0];
        assert!(ctor.modifiers.is_private());
        assert_eq!(ctor.descriptor(), "(Ljava/lang/String;I)V");
    }

    #[test]
    fn test_user_next_is_kept() {
        let mut unit = CompileUnit::new();
        let id = color_enum(&mut unit);
        let b = unit.builder();
        unit.class_mut(id).methods.push(
            MethodNode::new("next", Modifiers::PUBLIC, TypeRef::object())
                .with_body(b.block(vec![b.ret(b.null())])),
        );
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();
        assert_eq!(unit.class(id).methods_named("next").count(), 1);
        assert_eq!(unit.class(id).methods_named("previous").count(), 1);
    }

    #[test]
    fn test_constructor_errors() {
        let mut unit = CompileUnit::new();
        let id = color_enum(&mut unit);
        let b = unit.builder();
        unit.class_mut(id).constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_super(vec![]))])),
        );
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        complete(&ctx, &mut unit).unwrap();
        let messages: Vec<String> = ctx.errors().errors().into_iter().map(|d| d.message).collect();
        assert_eq!(
            messages,
            vec![
                "Illegal modifier for the enum constructor; only private is permitted.".to_string(),
                "Cannot invoke super constructor from enum constructor Color()".to_string(),
            ]
        );
        let ctor = &unit.class(id).constructors[0];
        assert_eq!(ctor.params.len(), 2);
        assert!(ctor.params.iter().all(|p| p.var.is_some()));
    }

    #[test]
    fn test_constant_body_gets_factory() {
        let mut unit = CompileUnit::new();
        let id = color_enum(&mut unit);
        let b = unit.builder();
        let body = unit.add_inner(
            id,
            ClassNode::new("p.Color$1", ClassKind::Class).with_super(TypeRef::class("p.Color")),
        );
        unit.class_mut(id).fields[0].enum_body = Some(body);
        unit.class_mut(id).fields[0].initial = Some(b.list(vec![b.int(7)]));
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let body_class = unit.class(body);
        assert!(body_class.methods.iter().any(|m| m.name == "$INIT"));
        assert_eq!(body_class.constructors[0].params.len(), 3);
        assert!(!body_class.needs_outer_instance());
        // Enum stays extensible for the body class
        assert!(!unit.class(id).modifiers.is_final());
        assert!(unit.class(id).constructors[0].modifiers.is_package_private());
    }
}
