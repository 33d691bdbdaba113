//! Tree walkers
//!
//! `Visitor` / `VisitorMut` default to visiting every child; implementors
//! override the hooks they care about and call `walk_*` to continue.
//! Closure bodies are visited as statements; annotation values and
//! parameter defaults are not.

use super::*;

pub trait Visitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        walk_stmt(self, stmt);
    }
}

pub trait VisitorMut {
    fn visit_expr_mut(&mut self, expr: &mut Expr) {
        walk_expr_mut(self, expr);
    }

    fn visit_stmt_mut(&mut self, stmt: &mut Stmt) {
        walk_stmt_mut(self, stmt);
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, expr: &Expr) {
    match &expr.kind {
        ExprKind::Constant(_)
        | ExprKind::Variable(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::ClassLiteral(_)
        | ExprKind::OuterThis(_)
        | ExprKind::Annotation(_) => {}
        ExprKind::Property(p) => {
            v.visit_expr(&p.object);
            if let MemberName::Dynamic(name) = &p.name {
                v.visit_expr(name);
            }
        }
        ExprKind::Attribute(a) => v.visit_expr(&a.object),
        ExprKind::Field(f) => {
            if let Some(object) = &f.object {
                v.visit_expr(object);
            }
        }
        ExprKind::MethodCall(call) => {
            v.visit_expr(&call.object);
            if let MemberName::Dynamic(name) = &call.name {
                v.visit_expr(name);
            }
            for arg in &call.args {
                v.visit_expr(arg);
            }
        }
        ExprKind::StaticCall(call) => {
            for arg in &call.args {
                v.visit_expr(arg);
            }
        }
        ExprKind::ConstructorCall(call) => {
            for arg in &call.args {
                v.visit_expr(arg);
            }
        }
        ExprKind::Binary(b) => {
            v.visit_expr(&b.left);
            v.visit_expr(&b.right);
        }
        ExprKind::Assign(a) => {
            v.visit_expr(&a.target);
            v.visit_expr(&a.value);
        }
        ExprKind::Declaration(d) => {
            if let Some(init) = &d.init {
                v.visit_expr(init);
            }
        }
        ExprKind::IncDec(i) => v.visit_expr(&i.target),
        ExprKind::Not(e) | ExprKind::Negate(e) | ExprKind::Spread(e) => v.visit_expr(e),
        ExprKind::Cast(c) => v.visit_expr(&c.expr),
        ExprKind::InstanceOf(i) => v.visit_expr(&i.expr),
        ExprKind::Ternary(t) => {
            v.visit_expr(&t.cond);
            v.visit_expr(&t.then);
            v.visit_expr(&t.otherwise);
        }
        ExprKind::List(values) => {
            for value in values {
                v.visit_expr(value);
            }
        }
        ExprKind::Map(entries) => {
            for entry in entries {
                v.visit_expr(&entry.key);
                v.visit_expr(&entry.value);
            }
        }
        ExprKind::Array(a) => {
            for value in &a.values {
                v.visit_expr(value);
            }
        }
        ExprKind::Closure(c) => v.visit_stmt(&c.body),
        ExprKind::GString(g) => {
            for value in &g.values {
                v.visit_expr(value);
            }
        }
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::Block(b) => {
            for s in &b.stmts {
                v.visit_stmt(s);
            }
        }
        StmtKind::Expr(e) | StmtKind::Throw(e) => v.visit_expr(e),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                v.visit_expr(e);
            }
        }
        StmtKind::If(i) => {
            v.visit_expr(&i.cond);
            v.visit_stmt(&i.then);
            if let Some(otherwise) = &i.otherwise {
                v.visit_stmt(otherwise);
            }
        }
        StmtKind::While(w) => {
            v.visit_expr(&w.cond);
            v.visit_stmt(&w.body);
        }
        StmtKind::For(f) => {
            for e in &f.init {
                v.visit_expr(e);
            }
            if let Some(cond) = &f.cond {
                v.visit_expr(cond);
            }
            for e in &f.update {
                v.visit_expr(e);
            }
            v.visit_stmt(&f.body);
        }
        StmtKind::ForIn(f) => {
            v.visit_expr(&f.iterable);
            v.visit_stmt(&f.body);
        }
        StmtKind::Try(t) => {
            v.visit_stmt(&t.body);
            for c in &t.catches {
                v.visit_stmt(&c.body);
            }
            if let Some(finally) = &t.finally {
                v.visit_stmt(finally);
            }
        }
        StmtKind::Switch(s) => {
            v.visit_expr(&s.subject);
            for case in &s.cases {
                v.visit_expr(&case.value);
                v.visit_stmt(&case.body);
            }
            if let Some(default) = &s.default {
                v.visit_stmt(default);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Synthetic(_) | StmtKind::Empty => {}
    }
}

pub fn walk_expr_mut<V: VisitorMut + ?Sized>(v: &mut V, expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Constant(_)
        | ExprKind::Variable(_)
        | ExprKind::This
        | ExprKind::Super
        | ExprKind::ClassLiteral(_)
        | ExprKind::OuterThis(_)
        | ExprKind::Annotation(_) => {}
        ExprKind::Property(p) => {
            v.visit_expr_mut(&mut p.object);
            if let MemberName::Dynamic(name) = &mut p.name {
                v.visit_expr_mut(name);
            }
        }
        ExprKind::Attribute(a) => v.visit_expr_mut(&mut a.object),
        ExprKind::Field(f) => {
            if let Some(object) = &mut f.object {
                v.visit_expr_mut(object);
            }
        }
        ExprKind::MethodCall(call) => {
            v.visit_expr_mut(&mut call.object);
            if let MemberName::Dynamic(name) = &mut call.name {
                v.visit_expr_mut(name);
            }
            for arg in &mut call.args {
                v.visit_expr_mut(arg);
            }
        }
        ExprKind::StaticCall(call) => {
            for arg in &mut call.args {
                v.visit_expr_mut(arg);
            }
        }
        ExprKind::ConstructorCall(call) => {
            for arg in &mut call.args {
                v.visit_expr_mut(arg);
            }
        }
        ExprKind::Binary(b) => {
            v.visit_expr_mut(&mut b.left);
            v.visit_expr_mut(&mut b.right);
        }
        ExprKind::Assign(a) => {
            v.visit_expr_mut(&mut a.target);
            v.visit_expr_mut(&mut a.value);
        }
        ExprKind::Declaration(d) => {
            if let Some(init) = &mut d.init {
                v.visit_expr_mut(init);
            }
        }
        ExprKind::IncDec(i) => v.visit_expr_mut(&mut i.target),
        ExprKind::Not(e) | ExprKind::Negate(e) | ExprKind::Spread(e) => v.visit_expr_mut(e),
        ExprKind::Cast(c) => v.visit_expr_mut(&mut c.expr),
        ExprKind::InstanceOf(i) => v.visit_expr_mut(&mut i.expr),
        ExprKind::Ternary(t) => {
            v.visit_expr_mut(&mut t.cond);
            v.visit_expr_mut(&mut t.then);
            v.visit_expr_mut(&mut t.otherwise);
        }
        ExprKind::List(values) => {
            for value in values {
                v.visit_expr_mut(value);
            }
        }
        ExprKind::Map(entries) => {
            for entry in entries {
                v.visit_expr_mut(&mut entry.key);
                v.visit_expr_mut(&mut entry.value);
            }
        }
        ExprKind::Array(a) => {
            for value in &mut a.values {
                v.visit_expr_mut(value);
            }
        }
        ExprKind::Closure(c) => v.visit_stmt_mut(&mut c.body),
        ExprKind::GString(g) => {
            for value in &mut g.values {
                v.visit_expr_mut(value);
            }
        }
    }
}

pub fn walk_stmt_mut<V: VisitorMut + ?Sized>(v: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Block(b) => {
            for s in &mut b.stmts {
                v.visit_stmt_mut(s);
            }
        }
        StmtKind::Expr(e) | StmtKind::Throw(e) => v.visit_expr_mut(e),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                v.visit_expr_mut(e);
            }
        }
        StmtKind::If(i) => {
            v.visit_expr_mut(&mut i.cond);
            v.visit_stmt_mut(&mut i.then);
            if let Some(otherwise) = &mut i.otherwise {
                v.visit_stmt_mut(otherwise);
            }
        }
        StmtKind::While(w) => {
            v.visit_expr_mut(&mut w.cond);
            v.visit_stmt_mut(&mut w.body);
        }
        StmtKind::For(f) => {
            for e in &mut f.init {
                v.visit_expr_mut(e);
            }
            if let Some(cond) = &mut f.cond {
                v.visit_expr_mut(cond);
            }
            for e in &mut f.update {
                v.visit_expr_mut(e);
            }
            v.visit_stmt_mut(&mut f.body);
        }
        StmtKind::ForIn(f) => {
            v.visit_expr_mut(&mut f.iterable);
            v.visit_stmt_mut(&mut f.body);
        }
        StmtKind::Try(t) => {
            v.visit_stmt_mut(&mut t.body);
            for c in &mut t.catches {
                v.visit_stmt_mut(&mut c.body);
            }
            if let Some(finally) = &mut t.finally {
                v.visit_stmt_mut(finally);
            }
        }
        StmtKind::Switch(s) => {
            v.visit_expr_mut(&mut s.subject);
            for case in &mut s.cases {
                v.visit_expr_mut(&mut case.value);
                v.visit_stmt_mut(&mut case.body);
            }
            if let Some(default) = &mut s.default {
                v.visit_stmt_mut(default);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Synthetic(_) | StmtKind::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct CountVars(usize);

    impl Visitor for CountVars {
        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(expr.kind, ExprKind::Variable(_)) {
                self.0 += 1;
            }
            walk_expr(self, expr);
        }
    }

    struct RenameVars;

    impl VisitorMut for RenameVars {
        fn visit_expr_mut(&mut self, expr: &mut Expr) {
            if let ExprKind::Variable(v) = &mut expr.kind {
                v.name.push('_');
            }
            walk_expr_mut(self, expr);
        }
    }

    #[test]
    fn test_visits_into_closures() {
        let b = AstBuilder::new(Arc::new(NodeIds::default()));
        let closure = b.closure(None, b.block(vec![b.expr_stmt(b.var("x"))]));
        let stmt = b.block(vec![
            b.expr_stmt(b.binary(BinaryOp::Add, b.var("a"), b.var("b"))),
            b.expr_stmt(closure),
        ]);
        let mut counter = CountVars(0);
        counter.visit_stmt(&stmt);
        assert_eq!(counter.0, 3);
    }

    #[test]
    fn test_mutable_walk() {
        let b = AstBuilder::new(Arc::new(NodeIds::default()));
        let mut stmt = b.ret(b.call_this("f", vec![b.var("y")]));
        RenameVars.visit_stmt_mut(&mut stmt);
        match &stmt.kind {
            StmtKind::Return(Some(Expr {
                kind: ExprKind::MethodCall(call),
                ..
            })) => assert_eq!(call.args[0].as_variable().unwrap().name, "y_"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
