//! Default-parameter expansion
//!
//! A method with K defaulted parameters gets K overloads. Overload `i`
//! drops the `i` rightmost defaulted parameters and delegates to the full
//! method, passing the default expressions in their place. Generated
//! overloads are never expanded again. Afterwards the default expressions
//! move from the parameters into the side tables.

use super::{location, unbind_locals};
use crate::ast::visit::{walk_expr, walk_expr_mut, Visitor, VisitorMut};
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use rustc_hash::FxHashMap;

#[tracing::instrument(skip_all)]
pub fn expand(_ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    for id in unit.primary_classes() {
        let class = unit.class(id);
        if !class.methods.iter().chain(&class.constructors).any(|m| m.has_default_value()) {
            continue;
        }
        tracing::debug!(class = %class.name, "expanding default parameters");
        expand_methods(unit, id)?;
        expand_constructors(unit, id)?;
        strip_defaults(unit, id);
    }
    Ok(())
}

/// Parameters and arguments of one generated overload
struct Overload {
    params: Vec<Parameter>,
    /// Arguments of the delegating call, one per original parameter
    args: Vec<Expr>,
    /// Locals standing in for dropped parameters other defaults refer to
    locals: Vec<Stmt>,
}

/// Variables bound to one of `vars` anywhere in `expr`
fn referenced(expr: &Expr, vars: &[VarId]) -> Vec<VarId> {
    struct Refs<'v> {
        vars: &'v [VarId],
        found: Vec<VarId>,
    }

    impl Visitor for Refs<'_> {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::Variable(VariableRef {
                binding: Some(Binding::Local(var)),
                ..
            }) = &expr.kind
            {
                if self.vars.contains(var) && !self.found.contains(var) {
                    self.found.push(*var);
                }
            }
            walk_expr(self, expr);
        }
    }

    let mut refs = Refs {
        vars,
        found: Vec::new(),
    };
    refs.visit_expr(expr);
    refs.found
}

fn cast_to(b: &AstBuilder, ty: &TypeRef, expr: Expr) -> Expr {
    if ty.is_object() {
        expr
    } else {
        b.cast(ty.clone(), expr)
    }
}

/// Copy of a parameter for a generated overload; resolved afresh
fn fresh_param(param: &Parameter) -> Parameter {
    Parameter {
        default: None,
        var: None,
        ..param.clone()
    }
}

/// Overload dropping the `dropped` rightmost defaulted parameters
fn overload(b: &AstBuilder, method: &MethodNode, dropped: usize) -> Overload {
    let total = method.params.iter().filter(|p| p.default.is_some()).count();
    let mut params = Vec::new();
    let mut dropped_params: Vec<&Parameter> = Vec::new();
    let mut seen = 0;
    for param in &method.params {
        match param.default {
            Some(_) if seen >= total - dropped => {
                seen += 1;
                dropped_params.push(param);
            }
            Some(_) => {
                seen += 1;
                params.push(fresh_param(param));
            }
            None => params.push(fresh_param(param)),
        }
    }

    // Dropped parameters used by other defaults become locals
    let dropped_vars: Vec<VarId> = dropped_params.iter().filter_map(|p| p.var).collect();
    let mut as_local: Vec<VarId> = Vec::new();
    for param in &dropped_params {
        if let Some(default) = &param.default {
            for var in referenced(default, &dropped_vars) {
                if !as_local.contains(&var) {
                    as_local.push(var);
                }
            }
        }
    }

    let mut locals = Vec::new();
    let mut args = Vec::new();
    for param in &method.params {
        let is_dropped = dropped_params.iter().any(|p| std::ptr::eq(*p, param));
        let local = param.var.map(|v| as_local.contains(&v)).unwrap_or(false);
        let arg = match (&param.default, is_dropped) {
            (Some(default), true) if local => {
                let mut init = default.clone();
                unbind_locals(&mut init);
                let mut decl = b.declare(param.name.clone(), param.ty.clone(), Some(init));
                if let ExprKind::Declaration(d) = &mut decl.kind {
                    d.modifiers = param.modifiers;
                }
                locals.push(b.expr_stmt(decl));
                b.var(param.name.clone())
            }
            (Some(default), true) => {
                let mut value = default.clone();
                unbind_locals(&mut value);
                value
            }
            _ => b.var(param.name.clone()),
        };
        args.push(cast_to(b, &param.ty, arg));
    }
    Overload {
        params,
        args,
        locals,
    }
}

fn expand_methods(unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let b = unit.builder();
    let originals: Vec<MethodNode> = unit
        .class(id)
        .methods
        .iter()
        .filter(|m| m.has_default_value())
        .cloned()
        .collect();
    let class_ty = unit.class(id).type_ref();

    for method in &originals {
        let total = method.params.iter().filter(|p| p.default.is_some()).count();
        for dropped in 1..=total {
            let Overload {
                params,
                args,
                mut locals,
            } = overload(&b, method, dropped);
            let erased: Vec<TypeRef> = params.iter().map(|p| p.ty.erasure()).collect();
            let call = if method.modifiers.is_static() {
                b.static_call(class_ty.clone(), method.name.clone(), args)
            } else {
                b.call_this(method.name.clone(), args)
            };
            locals.push(if method.is_void() {
                b.expr_stmt(call)
            } else {
                b.ret(call)
            });

            let mut generated = MethodNode::new(
                method.name.clone(),
                method.modifiers,
                method.return_type.clone(),
            )
            .with_params(params)
            .with_body(b.block(locals));
            generated.exceptions = method.exceptions.clone();
            generated.annotations = method.annotations.clone();
            generated.generics = method.generics.clone();
            generated.pos = method.pos;

            if unit.class(id).declared_method(&method.name, &erased).is_some() {
                return Err(CompileError::DefaultParameterCollision {
                    method: method.type_descriptor(),
                    generated: generated.type_descriptor(),
                    location: location(unit, id, method.pos),
                });
            }
            unit.side
                .default_generated
                .insert((id, generated.signature_key()));
            tracing::trace!(method = %generated.type_descriptor(), "default overload");
            unit.class_mut(id).methods.push(generated);
        }
    }
    Ok(())
}

fn expand_constructors(unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let b = unit.builder();
    let originals: Vec<MethodNode> = unit
        .class(id)
        .constructors
        .iter()
        .filter(|m| m.has_default_value())
        .cloned()
        .collect();
    let simple = types::simple_name(&unit.class(id).name).to_string();

    for ctor in &originals {
        let total = ctor.params.iter().filter(|p| p.default.is_some()).count();
        for dropped in 1..=total {
            let Overload {
                params,
                mut args,
                locals,
            } = overload(&b, ctor, dropped);
            if !locals.is_empty() {
                // Nothing may run before `this(...)`: a dropped parameter
                // another default refers to must have a constant default
                let dropped: Vec<&Parameter> = ctor
                    .params
                    .iter()
                    .filter(|p| !params.iter().any(|kept| kept.name == p.name))
                    .collect();
                let constants: FxHashMap<String, Expr> = dropped
                    .iter()
                    .filter_map(|p| match &p.default {
                        Some(default) if default.is_constant() => Some((p.name.clone(), default.clone())),
                        _ => None,
                    })
                    .collect();
                let dropped_names: Vec<String> = dropped.iter().map(|p| p.name.clone()).collect();
                for (param, arg) in ctor.params.iter().zip(args.iter_mut()) {
                    if !dropped_names.contains(&param.name) {
                        continue;
                    }
                    let mut replace = ReplaceNames {
                        b: &b,
                        dropped: &dropped_names,
                        constants: &constants,
                        unknown: None,
                    };
                    replace.visit_expr_mut(arg);
                    if let Some(name) = replace.unknown {
                        let types: Vec<String> = params.iter().map(|p| p.ty.display_name()).collect();
                        return Err(CompileError::semantic(
                            format!(
                                "The generated constructor \"{}({})\" references parameter '{}' which has been replaced by a default value expression.",
                                simple,
                                types.join(","),
                                name
                            ),
                            location(unit, id, ctor.pos),
                        ));
                    }
                }
            }

            let erased: Vec<TypeRef> = params.iter().map(|p| p.ty.erasure()).collect();
            let mut generated = MethodNode::constructor(ctor.modifiers)
                .with_params(params)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_this(args))]));
            generated.exceptions = ctor.exceptions.clone();
            generated.pos = ctor.pos;

            if unit.class(id).declared_constructor(&erased).is_some() {
                return Err(CompileError::DefaultParameterCollision {
                    method: ctor.type_descriptor(),
                    generated: generated.type_descriptor(),
                    location: location(unit, id, ctor.pos),
                });
            }
            unit.side
                .default_generated
                .insert((id, generated.signature_key()));
            unit.class_mut(id).constructors.push(generated);
        }
    }
    Ok(())
}

/// Replaces names of dropped parameters with their constant defaults;
/// remembers the first one without
struct ReplaceNames<'a> {
    b: &'a AstBuilder,
    dropped: &'a [String],
    constants: &'a FxHashMap<String, Expr>,
    unknown: Option<String>,
}

impl VisitorMut for ReplaceNames<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        if let ExprKind::Variable(VariableRef { name, binding: None }) = &expr.kind {
            if !self.dropped.contains(name) {
                return;
            }
            match self.constants.get(name) {
                Some(constant) => {
                    let mut value = constant.clone();
                    value.id = self.b.next_id();
                    *expr = value;
                }
                None => {
                    self.unknown.get_or_insert_with(|| name.clone());
                }
            }
            return;
        }
        walk_expr_mut(self, expr);
    }
}

/// Move default expressions into the side table
fn strip_defaults(unit: &mut CompileUnit, id: ClassId) {
    let mut stripped = Vec::new();
    let class = unit.class_mut(id);
    for method in class.methods.iter_mut().chain(class.constructors.iter_mut()) {
        let key = method.signature_key();
        for (index, param) in method.params.iter_mut().enumerate() {
            if let Some(default) = param.default.take() {
                stripped.push((
                    ParamKey {
                        class: id,
                        method: key.clone(),
                        index,
                    },
                    default,
                ));
            }
        }
    }
    unit.side.parameter_defaults.extend(stripped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope;

    fn class_with(unit: &mut CompileUnit, method: MethodNode) -> ClassId {
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.methods.push(method);
        unit.add_class(class)
    }

    #[test]
    fn test_k_defaults_give_k_overloads() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let method = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::object())
            .with_params(vec![
                Parameter::new("a", TypeRef::object()),
                Parameter::new("b", TypeRef::int()).with_default(b.int(1)),
                Parameter::new("c", TypeRef::object()).with_default(b.string("x")),
            ])
            .with_body(b.block(vec![b.ret(b.var("a"))]));
        let id = class_with(&mut unit, method);
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        expand(&ctx, &mut unit).unwrap();

        let arities: Vec<usize> = unit.class(id).methods_named("m").map(|m| m.params.len()).collect();
        assert_eq!(arities, vec![3, 2, 1]);
        assert!(unit.side.is_default_generated(id, "m(Ljava/lang/Object;I)"));
        assert!(unit.side.is_default_generated(id, "m(Ljava/lang/Object;)"));
        assert!(unit.side.parameter_default(id, "m(Ljava/lang/Object;ILjava/lang/Object;)", 1).is_some());
        assert!(unit.class(id).methods.iter().all(|m| !m.has_default_value()));
    }

    #[test]
    fn test_overload_delegates_with_defaults() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let method = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::void())
            .with_params(vec![Parameter::new("a", TypeRef::object()).with_default(b.string("d"))])
            .with_body(b.block(vec![]));
        let id = class_with(&mut unit, method);
        let ctx = CompilationContext::default();
        expand(&ctx, &mut unit).unwrap();

        let generated = unit.class(id).methods.iter().find(|m| m.params.is_empty()).unwrap();
        match &generated.body.as_ref().unwrap().as_block().unwrap().stmts[0].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::MethodCall(call),
                ..
            }) => {
                assert_eq!(call.name.as_str(), Some("m"));
                assert_eq!(call.args[0].kind, ExprKind::Constant(ConstValue::String("d".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dropped_parameter_referenced_by_default_becomes_local() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let method = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::object())
            .with_params(vec![
                Parameter::new("a", TypeRef::object()).with_default(b.int(1)),
                Parameter::new("b", TypeRef::object()).with_default(b.var("a")),
            ])
            .with_body(b.block(vec![b.ret(b.var("b"))]));
        let id = class_with(&mut unit, method);
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        expand(&ctx, &mut unit).unwrap();

        let no_args = unit.class(id).methods.iter().find(|m| m.params.is_empty()).unwrap();
        let stmts = &no_args.body.as_ref().unwrap().as_block().unwrap().stmts;
        assert_eq!(stmts.len(), 2);
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Expr(Expr { kind: ExprKind::Declaration(d), .. }) if d.name == "a"
        ));
    }

    #[test]
    fn test_collision_is_fatal() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let method = MethodNode::new("m", Modifiers::PUBLIC, TypeRef::void())
            .with_params(vec![Parameter::new("a", TypeRef::object()).with_default(b.null())])
            .with_body(b.block(vec![]));
        let id = class_with(&mut unit, method);
        unit.class_mut(id).methods.push(
            MethodNode::new("m", Modifiers::PUBLIC, TypeRef::void()).with_body(b.block(vec![])),
        );
        let ctx = CompilationContext::default();
        let err = expand(&ctx, &mut unit).unwrap_err();
        assert!(matches!(err, CompileError::DefaultParameterCollision { .. }));
        assert!(err.to_string().contains(
            "The method with default parameters \"void m(java.lang.Object)\" defines a method \"void m()\" that is already defined."
        ));
    }

    #[test]
    fn test_constructor_overloads_call_this() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let mut class = ClassNode::new("p.P", ClassKind::Class);
        class.constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_params(vec![Parameter::new("x", TypeRef::int()).with_default(b.int(0))])
                .with_body(b.block(vec![])),
        );
        let id = unit.add_class(class);
        let ctx = CompilationContext::default();
        expand(&ctx, &mut unit).unwrap();

        let ctors = &unit.class(id).constructors;
        assert_eq!(ctors.len(), 2);
        let stmt = ctors[1].body.as_ref().unwrap().first_statement().unwrap();
        assert!(matches!(&stmt.kind, StmtKind::Expr(e) if e.is_special_ctor_call()));
    }
}
