//! Return insertion
//!
//! A non-void method returns the value of its last expression statement.
//! Branches of a trailing `if` or `try` are rewritten the same way, and a
//! body that can fall off its end gets a `return null` (or the primitive
//! zero of the return type).

use crate::ast::*;
use crate::context::CompilationContext;
use crate::error::CompileResult;

#[tracing::instrument(skip_all)]
pub fn insert(_ctx: &CompilationContext, unit: &mut CompileUnit) -> CompileResult<()> {
    let b = unit.builder();
    for id in unit.primary_classes() {
        let class = unit.class_mut(id);
        for method in &mut class.methods {
            if method.is_void() || method.is_static_init() {
                continue;
            }
            let Some(body) = method.body.take() else {
                continue;
            };
            tracing::trace!(method = %method.name, "adding returns");
            method.body = Some(add_returns(&b, body, &method.return_type));
        }
    }
    Ok(())
}

/// Value returned when control reaches the end of a body
pub fn default_value(b: &AstBuilder, ty: &TypeRef) -> Expr {
    match ty.primitive() {
        None | Some(Primitive::Void) => b.null(),
        Some(Primitive::Boolean) => b.boolean(false),
        Some(Primitive::Int) => b.int(0),
        Some(Primitive::Long) => b.constant(ConstValue::Long(0)),
        Some(Primitive::Float) => b.constant(ConstValue::Float(0.0)),
        Some(Primitive::Double) => b.constant(ConstValue::Double(0.0)),
        Some(Primitive::Char) => b.constant(ConstValue::Char('\0')),
        Some(p @ (Primitive::Byte | Primitive::Short)) => b.cast(TypeRef::Primitive(p), b.int(0)),
    }
}

/// Rewrite `stmt` so that every path ends in a `return`
pub fn add_returns(b: &AstBuilder, stmt: Stmt, ty: &TypeRef) -> Stmt {
    let Stmt { id, kind, pos } = stmt;
    let kind = match kind {
        StmtKind::Synthetic(_) | StmtKind::Return(_) | StmtKind::Throw(_) => kind,
        StmtKind::Expr(expr) => StmtKind::Return(Some(expr)),
        StmtKind::Block(mut block) => {
            match block.stmts.pop() {
                Some(last) => block.stmts.push(add_returns(b, last, ty)),
                None => block.stmts.push(b.ret(default_value(b, ty))),
            }
            StmtKind::Block(block)
        }
        StmtKind::If(mut if_stmt) => {
            let then = std::mem::replace(&mut *if_stmt.then, b.empty());
            *if_stmt.then = add_returns(b, then, ty);
            let otherwise = match if_stmt.otherwise.take() {
                Some(otherwise) => add_returns(b, *otherwise, ty),
                None => b.block(vec![b.ret(default_value(b, ty))]),
            };
            if_stmt.otherwise = Some(Box::new(otherwise));
            StmtKind::If(if_stmt)
        }
        StmtKind::Try(mut try_stmt) => {
            let body = std::mem::replace(&mut *try_stmt.body, b.empty());
            *try_stmt.body = add_returns(b, body, ty);
            for catch in &mut try_stmt.catches {
                let body = std::mem::replace(&mut catch.body, b.empty());
                catch.body = add_returns(b, body, ty);
            }
            StmtKind::Try(try_stmt)
        }
        StmtKind::Empty => StmtKind::Return(Some(default_value(b, ty))),
        other => {
            // loops, switches and jumps may fall through
            let inner = Stmt { id, kind: other, pos };
            return b.block(vec![inner, b.ret(default_value(b, ty))]);
        }
    };
    Stmt { id, kind, pos }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last(stmt: &Stmt) -> &Stmt {
        stmt.as_block().unwrap().stmts.last().unwrap()
    }

    fn unit_with(method: MethodNode) -> (CompileUnit, ClassId) {
        let mut unit = CompileUnit::new();
        let mut class = ClassNode::new("p.A", ClassKind::Class);
        class.methods.push(method);
        let id = unit.add_class(class);
        (unit, id)
    }

    #[test]
    fn test_last_expression_is_returned() {
        let b = CompileUnit::new().builder();
        let body = b.block(vec![b.expr_stmt(b.int(1)), b.expr_stmt(b.string("x"))]);
        let out = add_returns(&b, body, &TypeRef::object());
        let stmts = &out.as_block().unwrap().stmts;
        assert!(matches!(stmts[0].kind, StmtKind::Expr(_)));
        assert!(matches!(
            &stmts[1].kind,
            StmtKind::Return(Some(Expr { kind: ExprKind::Constant(ConstValue::String(s)), .. })) if s == "x"
        ));
    }

    #[test]
    fn test_if_without_else_gets_default_branch() {
        let b = CompileUnit::new().builder();
        let body = b.block(vec![b.if_(b.boolean(true), b.expr_stmt(b.int(1)), None)]);
        let out = add_returns(&b, body, &TypeRef::int());
        match &last(&out).kind {
            StmtKind::If(if_stmt) => {
                assert!(matches!(if_stmt.then.kind, StmtKind::Return(Some(_))));
                let otherwise = if_stmt.otherwise.as_ref().unwrap();
                assert!(matches!(
                    last(otherwise).kind,
                    StmtKind::Return(Some(Expr { kind: ExprKind::Constant(ConstValue::Int(0)), .. }))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_try_and_catch_bodies_return() {
        let b = CompileUnit::new().builder();
        let body = b.try_(
            b.block(vec![b.expr_stmt(b.int(1))]),
            vec![b.catch(
                Parameter::new("e", TypeRef::class("java.lang.Exception")),
                b.block(vec![b.expr_stmt(b.int(2))]),
            )],
            Some(b.block(vec![b.expr_stmt(b.int(3))])),
        );
        let out = add_returns(&b, body, &TypeRef::object());
        match &out.kind {
            StmtKind::Try(t) => {
                assert!(matches!(last(&t.body).kind, StmtKind::Return(Some(_))));
                assert!(matches!(last(&t.catches[0].body).kind, StmtKind::Return(Some(_))));
                assert!(matches!(last(t.finally.as_ref().unwrap()).kind, StmtKind::Expr(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loop_falls_through_to_null() {
        let b = CompileUnit::new().builder();
        let body = b.block(vec![b.while_(b.boolean(false), b.block(vec![]))]);
        let out = add_returns(&b, body, &TypeRef::object());
        match &last(&out).kind {
            StmtKind::Block(inner) => {
                assert!(matches!(inner.stmts[0].kind, StmtKind::While(_)));
                assert!(matches!(
                    inner.stmts[1].kind,
                    StmtKind::Return(Some(Expr { kind: ExprKind::Constant(ConstValue::Null), .. }))
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_void_and_abstract_methods_untouched() {
        let b = CompileUnit::new().builder();
        let body = b.block(vec![b.expr_stmt(b.int(1))]);
        let (mut unit, id) = unit_with(
            MethodNode::new("run", Modifiers::PUBLIC, TypeRef::void()).with_body(body.clone()),
        );
        unit.class_mut(id)
            .methods
            .push(MethodNode::new("abs", Modifiers::PUBLIC | Modifiers::ABSTRACT, TypeRef::int()));
        insert(&CompilationContext::default(), &mut unit).unwrap();
        assert_eq!(unit.class(id).methods[0].body, Some(body));
        assert!(unit.class(id).methods[1].body.is_none());
    }

    #[test]
    fn test_empty_body_returns_zero() {
        let b = CompileUnit::new().builder();
        let (mut unit, id) = unit_with(
            MethodNode::new("count", Modifiers::PUBLIC, TypeRef::long()).with_body(b.block(vec![])),
        );
        insert(&CompilationContext::default(), &mut unit).unwrap();
        let body = unit.class(id).methods[0].body.as_ref().unwrap();
        assert!(matches!(
            last(body).kind,
            StmtKind::Return(Some(Expr { kind: ExprKind::Constant(ConstValue::Long(0)), .. }))
        ));
    }
}
