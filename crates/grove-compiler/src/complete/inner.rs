//! Inner-class completion
//!
//! Gives every non-static member class and every anonymous class the
//! plumbing it needs to reach its enclosing instance:
//!
//! - a `this$0` field and a leading `$p$` constructor parameter that
//!   stores into it
//! - a synthetic constructor for anonymous classes, taking the super
//!   arguments and one `Reference` per captured local
//! - `this$dist$invoke$N` / `this$dist$set$N` / `this$dist$get$N` on outer
//!   classes and `methodMissing` / `propertyMissing` on inner ones, so
//!   names unknown to the inner class are tried on the outer instance
//!
//! Afterwards `Outer.this`, instantiations of inner classes and uses of
//! outer instance members are rewritten into explicit `this$0` chains.

use super::{body_stmts_mut, location, param_ref, special_ctor_call_mut, unique_name};
use crate::ast::visit::{walk_expr, walk_expr_mut, Visitor, VisitorMut};
use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult};
use crate::scope::declare_parameter;
use rustc_hash::FxHashMap;

const OUTER_FIELD: &str = "this$0";

pub fn complete(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let arities = anonymous_arities(unit);
    let classes = unit.primary_classes();

    for &id in &classes {
        let class = unit.class(id);
        if class.anonymous {
            let arity = arities.get(&id).copied().unwrap_or(0);
            complete_anonymous(unit, id, arity);
        } else if class.needs_outer_instance() {
            complete_member_class(unit, id);
        }
    }

    for &id in &classes {
        let class = unit.class(id);
        if class.kind == ClassKind::Class && !class.inner_classes.is_empty() {
            add_dispatchers(unit, id);
        }
    }

    for &id in &classes {
        let class = unit.class(id);
        let delegates = class.kind == ClassKind::Class
            && !class.modifiers.contains(Modifiers::ENUM)
            && class
                .outer
                .map(|outer| unit.class(outer).kind == ClassKind::Class)
                .unwrap_or(false);
        if delegates {
            add_missing_handlers(ctx, unit, id)?;
        }
    }

    for &id in &classes {
        rewrite_class(ctx, unit, id)?;
    }
    Ok(())
}

// ============================================================================
// Members
// ============================================================================

/// Argument count of each anonymous class instantiation
fn anonymous_arities(unit: &CompileUnit) -> FxHashMap<ClassId, usize> {
    struct Collect(FxHashMap<ClassId, usize>);

    impl Visitor for Collect {
        fn visit_expr(&mut self, expr: &Expr) {
            if let ExprKind::ConstructorCall(ConstructorCall {
                anonymous: Some(id),
                args,
                ..
            }) = &expr.kind
            {
                self.0.insert(*id, args.len());
            }
            walk_expr(self, expr);
        }
    }

    let mut collect = Collect(FxHashMap::default());
    for id in unit.primary_classes() {
        let class = unit.class(id);
        for method in class.methods.iter().chain(&class.constructors) {
            if let Some(body) = &method.body {
                collect.visit_stmt(body);
            }
        }
        for init in class.fields.iter().filter_map(|f| f.initial.as_ref()) {
            collect.visit_expr(init);
        }
        for block in class.object_initializers.iter().chain(&class.static_initializers) {
            collect.visit_stmt(block);
        }
    }
    collect.0
}

fn complete_anonymous(unit: &mut CompileUnit, id: ClassId, arity: usize) {
    let b = unit.builder();
    // `new Runnable() { ... }` implements the interface instead of extending it
    if let Some(super_id) = unit.super_class_id(id) {
        if unit.class(super_id).is_interface() {
            let class = unit.class_mut(id);
            if let Some(iface) = class.super_class.replace(TypeRef::object()) {
                class.interfaces.push(iface);
            }
        }
    }

    let class = unit.class(id);
    let needs_outer = class.needs_outer_instance();
    let outer_ty = class.outer.map(|outer| unit.class(outer).type_ref());
    let captured: Vec<String> = class
        .captured
        .iter()
        .map(|var| unit.vars.get(*var).name.clone())
        .collect();
    if !class.constructors.is_empty() {
        return;
    }

    let mut params = Vec::new();
    let mut fields = Vec::new();
    let mut stmts = Vec::new();
    let super_params: Vec<Parameter> = (0..arity)
        .map(|i| Parameter::new(format!("p{}", i), TypeRef::object()))
        .collect();
    stmts.push(b.expr_stmt(b.ctor_super(
        super_params.iter().map(|p| b.var(p.name.clone())).collect(),
    )));
    if let (true, Some(outer_ty)) = (needs_outer, outer_ty) {
        params.push(Parameter::new("$p$", outer_ty.clone()));
        fields.push(FieldNode::new(
            OUTER_FIELD,
            outer_ty,
            Modifiers::FINAL | Modifiers::SYNTHETIC,
        ));
        stmts.push(b.expr_stmt(b.assign(
            b.field_of(b.this(), id, OUTER_FIELD),
            b.var("$p$"),
        )));
    }
    params.extend(super_params);
    for (i, name) in captured.iter().enumerate() {
        let param = Parameter::new(format!("p{}", arity + i), TypeRef::class(names::REFERENCE));
        stmts.push(b.expr_stmt(b.assign(
            b.field_of(b.this(), id, name.clone()),
            b.var(param.name.clone()),
        )));
        params.push(param);
        fields.push(FieldNode::new(
            name.clone(),
            TypeRef::class(names::REFERENCE),
            Modifiers::PUBLIC | Modifiers::SYNTHETIC,
        ));
    }

    let class = unit.class_mut(id);
    class.fields.splice(0..0, fields);
    class.constructors.push(
        MethodNode::constructor(Modifiers::SYNTHETIC)
            .with_params(params)
            .with_body(b.block(stmts)),
    );
    tracing::trace!(class = %class.name, captured = captured.len(), "anonymous class completed");
}

/// Thread the enclosing instance through every constructor of a
/// non-static member class
fn complete_member_class(unit: &mut CompileUnit, id: ClassId) {
    let b = unit.builder();
    let class = unit.class(id);
    let Some(outer) = class.outer else {
        return;
    };
    let outer_ty = unit.class(outer).type_ref();
    // A superclass that is an inner class of the same outer class needs
    // the same enclosing instance
    let super_shares_outer = unit
        .super_class_id(id)
        .map(|s| unit.class(s).needs_outer_instance() && unit.class(s).outer == Some(outer))
        .unwrap_or(false);

    let class = unit.class_mut(id);
    if class.field(OUTER_FIELD).is_none() {
        class.fields.push(FieldNode::new(
            OUTER_FIELD,
            outer_ty.clone(),
            Modifiers::FINAL | Modifiers::SYNTHETIC,
        ));
    }
    if class.constructors.is_empty() {
        class.constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC).with_body(b.block(Vec::new())),
        );
    }
    let mut ctors = std::mem::take(&mut class.constructors);
    let name = unique_name("$p$", |name| {
        ctors.iter().any(|c| c.params.iter().any(|p| p.name == name))
    });

    for ctor in &mut ctors {
        let mut param = Parameter::new(name.clone(), outer_ty.clone());
        if let Some(scope) = ctor.scope {
            declare_parameter(unit, scope, &mut param);
        }
        let outer_ref = param_ref(&b, &param);
        ctor.params.insert(0, param);

        let stmts = body_stmts_mut(&b, ctor);
        match special_ctor_call_mut(stmts) {
            Some(call) if call.kind == CtorKind::This => {
                // The delegate stores the field
                call.args.insert(0, outer_ref);
                continue;
            }
            Some(call) => {
                if super_shares_outer {
                    call.args.insert(0, outer_ref.clone());
                }
            }
            None => {
                let args = if super_shares_outer {
                    vec![outer_ref.clone()]
                } else {
                    Vec::new()
                };
                stmts.insert(0, b.expr_stmt(b.ctor_super(args)));
            }
        }
        stmts.insert(
            1,
            b.expr_stmt(b.assign(b.field_of(b.this(), id, OUTER_FIELD), outer_ref)),
        );
    }
    let class = unit.class_mut(id);
    class.constructors = ctors;
    tracing::trace!(class = %class.name, "member class completed");
}

fn dispatcher_params(second: Option<&str>) -> Vec<Parameter> {
    let mut params = vec![Parameter::new("name", TypeRef::string())];
    if let Some(second) = second {
        params.push(Parameter::new(second, TypeRef::object()));
    }
    params
}

/// `this$dist$invoke$N`, `this$dist$set$N`, `this$dist$get$N` where N is
/// the superclass distance from `Object`, so subclasses never override
/// the dispatchers of their parents
fn add_dispatchers(unit: &mut CompileUnit, id: ClassId) {
    let b = unit.builder();
    let distance = unit.object_distance(id);
    let modifiers = Modifiers::PUBLIC | Modifiers::SYNTHETIC;
    let invoke = MethodNode::new(format!("this$dist$invoke${}", distance), modifiers, TypeRef::object())
        .with_params(dispatcher_params(Some("args")))
        .with_body(b.block(vec![b.ret(b.dyn_call(
            b.this(),
            b.var("name"),
            vec![b.spread(b.var("args"))],
        ))]));
    let set = MethodNode::new(format!("this$dist$set${}", distance), modifiers, TypeRef::void())
        .with_params(dispatcher_params(Some("value")))
        .with_body(b.block(vec![b.expr_stmt(b.assign(
            b.dyn_prop(b.this(), b.var("name")),
            b.var("value"),
        ))]));
    let get = MethodNode::new(format!("this$dist$get${}", distance), modifiers, TypeRef::object())
        .with_params(dispatcher_params(None))
        .with_body(b.block(vec![b.ret(b.dyn_prop(b.this(), b.var("name")))]));

    let class = unit.class_mut(id);
    for method in [invoke, set, get] {
        if !class.has_method(&method.name, method.params.len()) {
            class.methods.push(method);
        }
    }
}

/// `methodMissing` / `propertyMissing` forwarding to the outer class, plus
/// their `$static_` counterparts
fn add_missing_handlers(ctx: &CompilationContext, unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let b = unit.builder();
    let class = unit.class(id);
    let Some(outer) = class.outer else {
        return Ok(());
    };
    let outer_ty = unit.class(outer).type_ref();
    let distance = unit.object_distance(outer);
    let has_instance = class.needs_outer_instance();

    // Receiver for instance dispatch: the enclosing instance, or the outer
    // class itself for static nested classes
    let receiver = || {
        if has_instance {
            b.field_of(b.this(), id, OUTER_FIELD)
        } else {
            b.class_lit(outer_ty.clone())
        }
    };
    let through_dispatcher = has_instance;
    let invoke = |receiver: Expr| {
        if through_dispatcher {
            b.call(
                receiver,
                format!("this$dist$invoke${}", distance),
                vec![b.var("name"), b.var("args")],
            )
        } else {
            b.dyn_call(receiver, b.var("name"), vec![b.spread(b.var("args"))])
        }
    };
    let set = |receiver: Expr| {
        if through_dispatcher {
            b.call(
                receiver,
                format!("this$dist$set${}", distance),
                vec![b.var("name"), b.var("value")],
            )
        } else {
            b.assign(b.dyn_prop(receiver, b.var("name")), b.var("value"))
        }
    };
    let get = |receiver: Expr| {
        if through_dispatcher {
            b.call(
                receiver,
                format!("this$dist$get${}", distance),
                vec![b.var("name")],
            )
        } else {
            b.dyn_prop(receiver, b.var("name"))
        }
    };
    let static_invoke = b.dyn_call(
        b.class_lit(outer_ty.clone()),
        b.var("name"),
        vec![b.spread(b.var("args"))],
    );
    let static_set = b.assign(b.dyn_prop(b.class_lit(outer_ty.clone()), b.var("name")), b.var("value"));
    let static_get = b.dyn_prop(b.class_lit(outer_ty.clone()), b.var("name"));

    let public = Modifiers::PUBLIC | Modifiers::SYNTHETIC;
    let public_static = public | Modifiers::STATIC;
    let methods = vec![
        MethodNode::new("methodMissing", public, TypeRef::object())
            .with_params(dispatcher_params(Some("args")))
            .with_body(b.block(vec![b.ret(invoke(receiver()))])),
        MethodNode::new("$static_methodMissing", public_static, TypeRef::object())
            .with_params(dispatcher_params(Some("args")))
            .with_body(b.block(vec![b.ret(static_invoke)])),
        MethodNode::new("propertyMissing", public, TypeRef::void())
            .with_params(dispatcher_params(Some("value")))
            .with_body(b.block(vec![b.expr_stmt(set(receiver()))])),
        MethodNode::new("$static_propertyMissing", public_static, TypeRef::void())
            .with_params(dispatcher_params(Some("value")))
            .with_body(b.block(vec![b.expr_stmt(static_set)])),
        MethodNode::new("propertyMissing", public, TypeRef::object())
            .with_params(dispatcher_params(None))
            .with_body(b.block(vec![b.ret(get(receiver()))])),
        MethodNode::new("$static_propertyMissing", public_static, TypeRef::object())
            .with_params(dispatcher_params(None))
            .with_body(b.block(vec![b.ret(static_get)])),
    ];

    for method in methods {
        let existing = unit
            .class(id)
            .declared_method(&method.name, &method.erased_params())
            .filter(|m| !m.modifiers.is_synthetic())
            .map(|m| m.pos);
        match existing {
            Some(pos) if !has_instance => {
                ctx.error(
                    format!(
                        "\"{0}\" implementations are not supported on static inner classes as a synthetic version of \"{0}\" is added during compilation for the purpose of outer class delegation.",
                        method.name
                    ),
                    location(unit, id, pos),
                )?;
            }
            // A user-written handler wins
            Some(_) => {}
            None => unit.class_mut(id).methods.push(method),
        }
    }
    Ok(())
}

// ============================================================================
// Rewriting
// ============================================================================

#[derive(Clone, Copy)]
enum Site {
    Constructor(usize),
    Method(usize),
    FieldInit(usize),
    ObjectInit(usize),
    StaticInit(usize),
}

fn rewrite_class(ctx: &CompilationContext, unit: &mut CompileUnit, id: ClassId) -> CompileResult<()> {
    let class = unit.class(id);
    let mut sites: Vec<Site> = Vec::new();
    sites.extend((0..class.constructors.len()).map(Site::Constructor));
    sites.extend((0..class.methods.len()).map(Site::Method));
    sites.extend((0..class.fields.len()).map(Site::FieldInit));
    sites.extend((0..class.object_initializers.len()).map(Site::ObjectInit));
    sites.extend((0..class.static_initializers.len()).map(Site::StaticInit));

    let needs_outer = class.needs_outer_instance();
    for site in sites {
        let b = unit.builder();
        let class = unit.class_mut(id);
        let (is_static, outer_param, mut stmt, mut expr) = match site {
            Site::Constructor(i) => {
                let ctor = &mut class.constructors[i];
                let outer_param = if needs_outer {
                    ctor.params.first().cloned()
                } else {
                    None
                };
                (false, outer_param, ctor.body.take(), None)
            }
            Site::Method(i) => {
                let method = &mut class.methods[i];
                (method.modifiers.is_static(), None, method.body.take(), None)
            }
            Site::FieldInit(i) => {
                let field = &mut class.fields[i];
                (field.modifiers.is_static(), None, None, field.initial.take())
            }
            Site::ObjectInit(i) => {
                let block = std::mem::replace(&mut class.object_initializers[i], b.empty());
                (false, None, Some(block), None)
            }
            Site::StaticInit(i) => {
                let block = std::mem::replace(&mut class.static_initializers[i], b.empty());
                (true, None, Some(block), None)
            }
        };

        let mut rewriter = InnerRewriter {
            ctx,
            unit: &*unit,
            b,
            class: id,
            is_static,
            outer_param,
            in_special_call: false,
            closure_depth: 0,
            failure: None,
        };
        if let Some(stmt) = &mut stmt {
            rewriter.visit_stmt_mut(stmt);
        }
        if let Some(expr) = &mut expr {
            rewriter.visit_expr_mut(expr);
        }
        let failure = rewriter.failure;

        let class = unit.class_mut(id);
        match site {
            Site::Constructor(i) => class.constructors[i].body = stmt,
            Site::Method(i) => class.methods[i].body = stmt,
            Site::FieldInit(i) => class.fields[i].initial = expr,
            Site::ObjectInit(i) => {
                if let Some(stmt) = stmt {
                    class.object_initializers[i] = stmt;
                }
            }
            Site::StaticInit(i) => {
                if let Some(stmt) = stmt {
                    class.static_initializers[i] = stmt;
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
    }
    Ok(())
}

struct InnerRewriter<'a> {
    ctx: &'a CompilationContext,
    unit: &'a CompileUnit,
    b: AstBuilder,
    class: ClassId,
    is_static: bool,
    /// Enclosing-instance parameter of the constructor being rewritten
    outer_param: Option<Parameter>,
    /// Inside the arguments of `this(...)` / `super(...)`
    in_special_call: bool,
    closure_depth: usize,
    failure: Option<CompileError>,
}

impl InnerRewriter<'_> {
    fn report(&mut self, message: String, pos: SourcePos) {
        let location = location(self.unit, self.class, pos);
        if let Err(err) = self.ctx.error(message, location) {
            self.failure.get_or_insert(err);
        }
    }

    /// Expression yielding the instance of `target` enclosing the current
    /// code: `this` itself, or a chain of `this$0` reads
    fn outer_instance(&self, target: ClassId) -> Option<Expr> {
        if self.is_static {
            return None;
        }
        let mut current = self.class;
        let mut receiver: Option<Expr> = None;
        loop {
            if self.unit.is_subclass_of(current, target) {
                return match receiver {
                    Some(receiver) => Some(receiver),
                    // `this` is not usable before the super constructor ran
                    None if self.in_special_call => None,
                    None => Some(self.b.this()),
                };
            }
            let class = self.unit.class(current);
            let outer = match class.outer {
                Some(outer) if class.needs_outer_instance() => outer,
                _ => return None,
            };
            receiver = Some(match receiver {
                None => match &self.outer_param {
                    Some(param) if self.closure_depth == 0 => param_ref(&self.b, param),
                    _ if self.in_special_call => return None,
                    _ => self.b.field_of(self.b.this(), current, OUTER_FIELD),
                },
                Some(receiver) => self.b.field_of(receiver, current, OUTER_FIELD),
            });
            current = outer;
        }
    }

    fn rewrite_outer_this(&mut self, expr: &mut Expr, ty: &TypeRef) {
        let pos = expr.pos;
        let target = self.unit.resolve(ty);
        match target.and_then(|t| self.outer_instance(t)) {
            Some(mut receiver) => {
                receiver.pos = pos;
                *expr = receiver;
            }
            None => {
                let class = self.unit.class(self.class);
                let message = if class.outer.is_none() {
                    "The usage of 'Class.this' and 'Class.super' is only allowed in nested/inner classes."
                        .to_string()
                } else {
                    format!(
                        "The usage of 'Class.this' and 'Class.super' within static nested class '{}' is not allowed in the static context.",
                        types::simple_name(&class.name)
                    )
                };
                self.report(message, pos);
            }
        }
    }

    fn pass_outer_instance(&mut self, call: &mut ConstructorCall, pos: SourcePos) {
        let target = match call.anonymous.or_else(|| self.unit.resolve(&call.ty)) {
            Some(target) => self.unit.class(target),
            None => return,
        };
        let outer = match target.outer {
            Some(outer) if target.needs_outer_instance() => outer,
            _ => return,
        };
        if self.is_static {
            // The caller must pass the enclosing instance explicitly
            if call.args.is_empty() {
                self.report(
                    "No enclosing instance passed in constructor call of a non-static inner class"
                        .to_string(),
                    pos,
                );
            }
            return;
        }
        // Not reachable through our own outer chain: the caller passes it
        if let Some(receiver) = self.outer_instance(outer) {
            call.args.insert(0, receiver);
        }
    }
}

impl VisitorMut for InnerRewriter<'_> {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        let pos = expr.pos;
        match &mut expr.kind {
            ExprKind::OuterThis(ty) => {
                let ty = ty.clone();
                self.rewrite_outer_this(expr, &ty);
            }
            ExprKind::Variable(VariableRef {
                name,
                binding:
                    Some(
                        Binding::Field {
                            owner,
                            is_static: false,
                            ..
                        }
                        | Binding::Property {
                            owner,
                            is_static: false,
                            ..
                        },
                    ),
            }) if !self.unit.is_subclass_of(self.class, *owner) => {
                // Instance member of an enclosing class
                let (name, owner) = (name.clone(), *owner);
                if let Some(receiver) = self.outer_instance(owner) {
                    let mut access = self.b.prop(receiver, name);
                    access.pos = pos;
                    *expr = access;
                }
            }
            ExprKind::Closure(_) => {
                self.closure_depth += 1;
                walk_expr_mut(self, expr);
                self.closure_depth -= 1;
            }
            ExprKind::ConstructorCall(call) if call.kind != CtorKind::New => {
                let saved = self.in_special_call;
                self.in_special_call = true;
                for arg in &mut call.args {
                    self.visit_expr_mut(arg);
                }
                self.in_special_call = saved;
            }
            ExprKind::ConstructorCall(call) => {
                for arg in &mut call.args {
                    self.visit_expr_mut(arg);
                }
                self.pass_outer_instance(call, pos);
            }
            _ => walk_expr_mut(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope;

    fn outer_with_inner(unit: &mut CompileUnit) -> (ClassId, ClassId) {
        let outer = unit.add_class(ClassNode::new("p.Outer", ClassKind::Class));
        let inner = unit.add_inner(outer, ClassNode::new("p.Outer$Inner", ClassKind::Class));
        (outer, inner)
    }

    fn ctor_stmts(unit: &CompileUnit, id: ClassId) -> Vec<Stmt> {
        unit.class(id).constructors[0]
            .body
            .as_ref()
            .and_then(|b| b.as_block())
            .map(|b| b.stmts.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_member_class_gets_outer_field_and_param() {
        let mut unit = CompileUnit::new();
        let (_, inner) = outer_with_inner(&mut unit);
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let class = unit.class(inner);
        let field = class.field("this$0").unwrap();
        assert!(field.modifiers.is_synthetic() && field.modifiers.is_final());
        let ctor = &class.constructors[0];
        assert_eq!(ctor.params[0].name, "$p$");
        assert_eq!(ctor.descriptor(), "(Lp/Outer;)V");

        let stmts = ctor_stmts(&unit, inner);
        assert!(matches!(&stmts[0].kind, StmtKind::Expr(e) if e.is_special_ctor_call()));
        match &stmts[1].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Assign(assign),
                ..
            }) => assert!(matches!(&assign.target.kind, ExprKind::Field(f) if f.name == "this$0")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_this_call_forwards_outer_instance() {
        let mut unit = CompileUnit::new();
        let (_, inner) = outer_with_inner(&mut unit);
        let b = unit.builder();
        let class = unit.class_mut(inner);
        class.constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_params(vec![Parameter::new("x", TypeRef::int())])
                .with_body(b.block(vec![])),
        );
        class.constructors.push(
            MethodNode::constructor(Modifiers::PUBLIC)
                .with_body(b.block(vec![b.expr_stmt(b.ctor_this(vec![b.int(1)]))])),
        );
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        complete(&ctx, &mut unit).unwrap();

        let delegating = &unit.class(inner).constructors[1];
        let stmts = &delegating.body.as_ref().unwrap().as_block().unwrap().stmts;
        assert_eq!(stmts.len(), 1);
        match &stmts[0].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::ConstructorCall(call),
                ..
            }) => {
                assert_eq!(call.args.len(), 2);
                assert!(matches!(
                    call.args[0].as_variable().and_then(|v| v.binding.clone()),
                    Some(Binding::Local(_))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_dispatchers_use_object_distance() {
        let mut unit = CompileUnit::new();
        let (outer, inner) = outer_with_inner(&mut unit);
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let outer_class = unit.class(outer);
        for name in ["this$dist$invoke$1", "this$dist$set$1", "this$dist$get$1"] {
            assert!(outer_class.methods.iter().any(|m| m.name == name), "missing {}", name);
        }
        let inner_class = unit.class(inner);
        assert_eq!(inner_class.methods_named("methodMissing").count(), 1);
        assert_eq!(inner_class.methods_named("propertyMissing").count(), 2);
        assert_eq!(inner_class.methods_named("$static_propertyMissing").count(), 2);
    }

    #[test]
    fn test_outer_this_becomes_field_chain() {
        let mut unit = CompileUnit::new();
        let (outer, inner) = outer_with_inner(&mut unit);
        let b = unit.builder();
        unit.class_mut(inner).methods.push(
            MethodNode::new("owner", Modifiers::PUBLIC, TypeRef::object())
                .with_body(b.block(vec![b.ret(b.outer_this(TypeRef::class("p.Outer")))])),
        );
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let method = unit.class(inner).methods_named("owner").next().unwrap();
        match &method.body.as_ref().unwrap().as_block().unwrap().stmts[0].kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::Field(f),
                ..
            })) => {
                assert_eq!(f.name, "this$0");
                assert_eq!(f.owner, inner);
                assert!(f.object.as_ref().unwrap().is_this());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!ctx.errors().has_errors());
        let _ = outer;
    }

    #[test]
    fn test_new_inner_receives_this() {
        let mut unit = CompileUnit::new();
        let (outer, _) = outer_with_inner(&mut unit);
        let b = unit.builder();
        unit.class_mut(outer).methods.push(
            MethodNode::new("make", Modifiers::PUBLIC, TypeRef::object())
                .with_body(b.block(vec![b.ret(b.new_(TypeRef::class("p.Outer$Inner"), vec![]))])),
        );
        unit.class_mut(outer).methods.push(
            MethodNode::new("makeStatic", Modifiers::PUBLIC | Modifiers::STATIC, TypeRef::object())
                .with_body(b.block(vec![b.ret(b.new_(TypeRef::class("p.Outer$Inner"), vec![]))])),
        );
        let ctx = CompilationContext::default();
        complete(&ctx, &mut unit).unwrap();

        let make = unit.class(outer).methods_named("make").next().unwrap();
        match &make.body.as_ref().unwrap().as_block().unwrap().stmts[0].kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::ConstructorCall(call),
                ..
            })) => assert!(call.args[0].is_this()),
            other => panic!("unexpected {:?}", other),
        }
        let messages: Vec<String> = ctx.errors().errors().into_iter().map(|d| d.message).collect();
        assert_eq!(
            messages,
            vec!["No enclosing instance passed in constructor call of a non-static inner class".to_string()]
        );
    }

    #[test]
    fn test_anonymous_constructor_layout() {
        let mut unit = CompileUnit::new();
        let b = unit.builder();
        let outer = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let mut anon = ClassNode::new("p.A$1", ClassKind::Class).with_super(TypeRef::class("java.lang.Runnable"));
        anon.anonymous = true;
        anon.methods.push(
            MethodNode::new("run", Modifiers::PUBLIC, TypeRef::void())
                .with_body(b.block(vec![b.expr_stmt(b.var("local"))])),
        );
        let anon = unit.add_inner(outer, anon);
        let body = b.block(vec![
            b.expr_stmt(b.declare("local", TypeRef::string(), Some(b.string("v")))),
            b.expr_stmt(b.new_anonymous(TypeRef::class("p.A$1"), vec![], anon)),
        ]);
        unit.class_mut(outer).methods.push(
            MethodNode::new("make", Modifiers::PUBLIC, TypeRef::void()).with_body(body),
        );
        let ctx = CompilationContext::default();
        scope::resolve(&ctx, &mut unit).unwrap();
        complete(&ctx, &mut unit).unwrap();

        let class = unit.class(anon);
        assert_eq!(class.super_name(), Some("java.lang.Object"));
        assert_eq!(class.interfaces[0].display_name(), "java.lang.Runnable");
        let ctor = &class.constructors[0];
        assert_eq!(ctor.descriptor(), "(Lp/A;Lgroovy/lang/Reference;)V");
        assert_eq!(class.field("local").unwrap().ty, TypeRef::class(names::REFERENCE));
        assert!(class.field("this$0").is_some());
    }
}
