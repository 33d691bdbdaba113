//! Class completion
//!
//! Rewrites the resolved class model into the shape codegen expects. The
//! passes run in a fixed order; later passes rely on the members earlier
//! ones synthesize:
//!
//! 1. enum completion
//! 2. inner-class completion
//! 3. default-parameter expansion
//! 4. property and metaclass completion
//! 5. final-variable and dead-code analysis
//! 6. return insertion
//! 7. covariant bridge synthesis
//!
//! Members synthesized by passes 1-4 are created without a scope and get
//! resolved in one go before pass 5.

pub mod bridges;
pub mod defaults;
pub mod enums;
pub mod finals;
pub mod inner;
pub mod properties;
pub mod returns;

use crate::ast::visit::{walk_expr_mut, walk_stmt_mut, VisitorMut};
use crate::ast::{
    AstBuilder, Binding, ClassId, CompileUnit, ConstructorCall, CtorKind, Expr, ExprKind,
    MethodNode, Parameter, SourcePos, Stmt, StmtKind,
};
use crate::context::CompilationContext;
use crate::error::{CompileError, CompileResult, Location};
use crate::scope;

/// Run every completion pass over the primary classes
#[tracing::instrument(skip_all)]
pub fn run(ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    check_duplicate_interfaces(unit)?;
    enums::complete(ctx, unit)?;
    inner::complete(ctx, unit)?;
    defaults::expand(ctx, unit)?;
    properties::complete(ctx, unit)?;
    scope::resolve_pending(ctx, unit)?;
    finals::analyze(ctx, unit)?;
    returns::insert(ctx, unit)?;
    bridges::synthesize(ctx, unit)?;
    Ok(())
}

fn check_duplicate_interfaces(unit: &CompileUnit) -> CompileResult<()> {
    for id in unit.primary_classes() {
        let class = unit.class(id);
        let names: Vec<String> = class.interfaces.iter().map(|i| i.display_name()).collect();
        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        if unique.len() != names.len() {
            return Err(CompileError::DuplicateInterface {
                interfaces: names.join(", "),
                location: location(unit, id, class.pos),
            });
        }
    }
    Ok(())
}

/// Location of a node inside class `id`
pub(crate) fn location(unit: &CompileUnit, id: ClassId, pos: SourcePos) -> Location {
    Location::new(unit.class(id).source_file.as_deref(), pos.line, pos.column)
}

/// Reference to a parameter: bound if the parameter is already resolved,
/// by name otherwise
pub(crate) fn param_ref(b: &AstBuilder, param: &Parameter) -> Expr {
    match param.var {
        Some(var) => b.local(param.name.clone(), var),
        None => b.var(param.name.clone()),
    }
}

/// Statements of a method body, turning a missing or non-block body into a
/// block first
pub(crate) fn body_stmts_mut<'m>(b: &AstBuilder, method: &'m mut MethodNode) -> &'m mut Vec<Stmt> {
    let body = method.body.take().unwrap_or_else(|| b.block(Vec::new()));
    let body = match body.kind {
        StmtKind::Block(_) => body,
        _ => b.block(vec![body]),
    };
    let body = method.body.insert(body);
    match &mut body.kind {
        StmtKind::Block(block) => &mut block.stmts,
        _ => unreachable!("body was wrapped in a block above"),
    }
}

/// Leading `this(...)`/`super(...)` call of a constructor body
pub(crate) fn special_ctor_call_mut(stmts: &mut [Stmt]) -> Option<&mut ConstructorCall> {
    match stmts.first_mut().map(|s| &mut s.kind) {
        Some(StmtKind::Expr(Expr {
            kind: ExprKind::ConstructorCall(call),
            ..
        })) if call.kind != CtorKind::New => Some(call),
        _ => None,
    }
}

/// `base` unless a member of that name exists; then `base` with the
/// smallest numeric suffix that is free
pub(crate) fn unique_name(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    (0..)
        .map(|i| format!("{}{}", base, i))
        .find(|name| !taken(name))
        .unwrap_or_else(|| base.to_string())
}

/// Drop every local binding and scope below `expr` so a copy of it can be
/// resolved again in a different method
pub(crate) fn unbind_locals(expr: &mut Expr) {
    struct Unbind;

    impl VisitorMut for Unbind {
        fn visit_expr_mut(&mut self, expr: &mut Expr) {
            match &mut expr.kind {
                ExprKind::Variable(v) if matches!(v.binding, Some(Binding::Local(_))) => {
                    v.binding = None;
                }
                ExprKind::Declaration(d) => d.var = None,
                ExprKind::Closure(c) => {
                    c.scope = None;
                    for param in c.params.iter_mut().flatten() {
                        param.var = None;
                    }
                }
                _ => {}
            }
            walk_expr_mut(self, expr);
        }

        fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
            match &mut stmt.kind {
                StmtKind::Block(b) => b.scope = None,
                StmtKind::For(f) => f.scope = None,
                StmtKind::ForIn(f) => {
                    f.scope = None;
                    f.var.var = None;
                }
                StmtKind::Try(t) => {
                    for catch in &mut t.catches {
                        catch.scope = None;
                        catch.param.var = None;
                    }
                }
                _ => {}
            }
            walk_stmt_mut(self, stmt);
        }
    }

    Unbind.visit_expr_mut(expr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassKind, ClassNode, TypeRef};

    #[test]
    fn test_duplicate_interfaces_are_fatal() {
        let mut unit = CompileUnit::new();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.interfaces.push(TypeRef::class("java.lang.Runnable"));
        class.interfaces.push(TypeRef::class("java.lang.Runnable"));
        unit.add_class(class);
        let err = check_duplicate_interfaces(&unit).unwrap_err();
        assert!(err
            .to_string()
            .contains("Duplicate interfaces in implements list: [java.lang.Runnable, java.lang.Runnable]"));
    }

    #[test]
    fn test_unbind_locals_keeps_member_bindings() {
        let unit = CompileUnit::new();
        let b = unit.builder();
        let mut expr = b.binary(
            crate::ast::BinaryOp::Add,
            b.local("a", crate::ast::VarId(3)),
            b.closure(None, b.block(vec![b.expr_stmt(b.local("c", crate::ast::VarId(4)))])),
        );
        let field = Binding::Field {
            owner: ClassId(0),
            name: "f".into(),
            is_static: false,
        };
        let mut member = b.var("f");
        if let ExprKind::Variable(v) = &mut member.kind {
            v.binding = Some(field.clone());
        }
        unbind_locals(&mut expr);
        unbind_locals(&mut member);
        match &expr.kind {
            ExprKind::Binary(bin) => assert_eq!(bin.left.as_variable().unwrap().binding, None),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(member.as_variable().unwrap().binding, Some(field));
    }

    #[test]
    fn test_unique_name() {
        assert_eq!(unique_name("$p$", |n| n == "x"), "$p$");
        assert_eq!(unique_name("$p$", |n| n == "$p$" || n == "$p$0"), "$p$1");
    }
}
