//! Node construction helpers
//!
//! Used by the front end to build a unit and by completion passes to
//! synthesize code. Every node gets a fresh [`NodeId`] from the unit's
//! allocator.

use super::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AstBuilder {
    ids: Arc<NodeIds>,
}

impl AstBuilder {
    pub fn new(ids: Arc<NodeIds>) -> Self {
        Self { ids }
    }

    pub fn next_id(&self) -> NodeId {
        self.ids.next()
    }

    // ===== Expressions =====

    pub fn expr(&self, kind: ExprKind) -> Expr {
        Expr {
            id: self.ids.next(),
            kind,
            pos: SourcePos::default(),
        }
    }

    pub fn constant(&self, value: ConstValue) -> Expr {
        self.expr(ExprKind::Constant(value))
    }

    pub fn null(&self) -> Expr {
        self.constant(ConstValue::Null)
    }

    pub fn int(&self, value: i32) -> Expr {
        self.constant(ConstValue::Int(value))
    }

    pub fn boolean(&self, value: bool) -> Expr {
        self.constant(ConstValue::Bool(value))
    }

    pub fn string(&self, value: impl Into<String>) -> Expr {
        self.constant(ConstValue::String(value.into()))
    }

    /// Unbound name reference
    pub fn var(&self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Variable(VariableRef {
            name: name.into(),
            binding: None,
        }))
    }

    /// Name reference already bound to a local
    pub fn local(&self, name: impl Into<String>, var: VarId) -> Expr {
        self.expr(ExprKind::Variable(VariableRef {
            name: name.into(),
            binding: Some(Binding::Local(var)),
        }))
    }

    pub fn this(&self) -> Expr {
        self.expr(ExprKind::This)
    }

    pub fn super_(&self) -> Expr {
        self.expr(ExprKind::Super)
    }

    pub fn class_lit(&self, ty: TypeRef) -> Expr {
        self.expr(ExprKind::ClassLiteral(ty))
    }

    pub fn outer_this(&self, ty: TypeRef) -> Expr {
        self.expr(ExprKind::OuterThis(ty))
    }

    pub fn prop(&self, object: Expr, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Property(PropertyAccess {
            object: Box::new(object),
            name: MemberName::Static(name.into()),
            safe: false,
        }))
    }

    pub fn dyn_prop(&self, object: Expr, name: Expr) -> Expr {
        self.expr(ExprKind::Property(PropertyAccess {
            object: Box::new(object),
            name: MemberName::Dynamic(Box::new(name)),
            safe: false,
        }))
    }

    pub fn attr(&self, object: Expr, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Attribute(AttributeAccess {
            object: Box::new(object),
            name: name.into(),
        }))
    }

    /// Field of `this` (or a static field) declared in `owner`
    pub fn field(&self, owner: ClassId, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Field(FieldAccess {
            object: None,
            owner,
            name: name.into(),
        }))
    }

    pub fn field_of(&self, object: Expr, owner: ClassId, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Field(FieldAccess {
            object: Some(Box::new(object)),
            owner,
            name: name.into(),
        }))
    }

    pub fn call(&self, object: Expr, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::MethodCall(MethodCall {
            object: Box::new(object),
            name: MemberName::Static(name.into()),
            args,
            safe: false,
            implicit_this: false,
        }))
    }

    /// `name(args)` with an implicit `this` receiver
    pub fn call_this(&self, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::MethodCall(MethodCall {
            object: Box::new(self.this()),
            name: MemberName::Static(name.into()),
            args,
            safe: false,
            implicit_this: true,
        }))
    }

    pub fn dyn_call(&self, object: Expr, name: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::MethodCall(MethodCall {
            object: Box::new(object),
            name: MemberName::Dynamic(Box::new(name)),
            args,
            safe: false,
            implicit_this: false,
        }))
    }

    pub fn static_call(&self, owner: TypeRef, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::StaticCall(StaticCall {
            owner,
            name: name.into(),
            args,
        }))
    }

    pub fn new_(&self, ty: TypeRef, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ConstructorCall(ConstructorCall {
            ty,
            args,
            kind: CtorKind::New,
            anonymous: None,
        }))
    }

    /// `new T(args) { body }` instantiating the anonymous class `class`
    pub fn new_anonymous(&self, ty: TypeRef, args: Vec<Expr>, class: ClassId) -> Expr {
        self.expr(ExprKind::ConstructorCall(ConstructorCall {
            ty,
            args,
            kind: CtorKind::New,
            anonymous: Some(class),
        }))
    }

    pub fn ctor_this(&self, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ConstructorCall(ConstructorCall {
            ty: TypeRef::object(),
            args,
            kind: CtorKind::This,
            anonymous: None,
        }))
    }

    pub fn ctor_super(&self, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ConstructorCall(ConstructorCall {
            ty: TypeRef::object(),
            args,
            kind: CtorKind::Super,
            anonymous: None,
        }))
    }

    pub fn binary(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary(Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }))
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assign(Assign {
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        }))
    }

    pub fn compound_assign(&self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assign(Assign {
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
        }))
    }

    pub fn declare(&self, name: impl Into<String>, ty: TypeRef, init: Option<Expr>) -> Expr {
        self.expr(ExprKind::Declaration(Declaration {
            name: name.into(),
            ty,
            modifiers: Modifiers::NONE,
            var: None,
            init: init.map(Box::new),
        }))
    }

    pub fn declare_final(&self, name: impl Into<String>, ty: TypeRef, init: Option<Expr>) -> Expr {
        let mut decl = self.declare(name, ty, init);
        if let ExprKind::Declaration(d) = &mut decl.kind {
            d.modifiers = Modifiers::FINAL;
        }
        decl
    }

    pub fn inc_dec(&self, op: IncDecOp, prefix: bool, target: Expr) -> Expr {
        self.expr(ExprKind::IncDec(IncDec {
            op,
            prefix,
            target: Box::new(target),
        }))
    }

    pub fn not(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Not(Box::new(expr)))
    }

    pub fn negate(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Negate(Box::new(expr)))
    }

    pub fn cast(&self, ty: TypeRef, expr: Expr) -> Expr {
        self.expr(ExprKind::Cast(Cast {
            ty,
            expr: Box::new(expr),
        }))
    }

    pub fn instance_of(&self, expr: Expr, ty: TypeRef) -> Expr {
        self.expr(ExprKind::InstanceOf(InstanceOf {
            expr: Box::new(expr),
            ty,
        }))
    }

    pub fn ternary(&self, cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        self.expr(ExprKind::Ternary(Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }))
    }

    pub fn list(&self, values: Vec<Expr>) -> Expr {
        self.expr(ExprKind::List(values))
    }

    pub fn map(&self, entries: Vec<(Expr, Expr)>) -> Expr {
        self.expr(ExprKind::Map(
            entries
                .into_iter()
                .map(|(key, value)| MapEntry { key, value })
                .collect(),
        ))
    }

    pub fn array(&self, elem: TypeRef, values: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Array(ArrayLiteral { elem, values }))
    }

    pub fn closure(&self, params: Option<Vec<Parameter>>, body: Stmt) -> Expr {
        self.expr(ExprKind::Closure(ClosureExpr {
            params,
            body: Box::new(body),
            scope: None,
        }))
    }

    pub fn gstring(&self, strings: Vec<String>, values: Vec<Expr>) -> Expr {
        self.expr(ExprKind::GString(GStringExpr { strings, values }))
    }

    pub fn spread(&self, expr: Expr) -> Expr {
        self.expr(ExprKind::Spread(Box::new(expr)))
    }

    pub fn annotation(&self, ty: TypeRef, members: Vec<(&str, Expr)>) -> AnnotationNode {
        AnnotationNode {
            id: self.ids.next(),
            ty,
            members: members
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            pos: SourcePos::default(),
        }
    }

    pub fn annotation_value(&self, annotation: AnnotationNode) -> Expr {
        self.expr(ExprKind::Annotation(Box::new(annotation)))
    }

    // ===== Statements =====

    pub fn stmt(&self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.ids.next(),
            kind,
            pos: SourcePos::default(),
        }
    }

    pub fn block(&self, stmts: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(Block { stmts, scope: None }))
    }

    pub fn expr_stmt(&self, expr: Expr) -> Stmt {
        let pos = expr.pos;
        let mut stmt = self.stmt(StmtKind::Expr(expr));
        stmt.pos = pos;
        stmt
    }

    pub fn ret(&self, expr: Expr) -> Stmt {
        let pos = expr.pos;
        let mut stmt = self.stmt(StmtKind::Return(Some(expr)));
        stmt.pos = pos;
        stmt
    }

    pub fn ret_void(&self) -> Stmt {
        self.stmt(StmtKind::Return(None))
    }

    pub fn if_(&self, cond: Expr, then: Stmt, otherwise: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::If(IfStmt {
            cond,
            then: Box::new(then),
            otherwise: otherwise.map(Box::new),
        }))
    }

    pub fn while_(&self, cond: Expr, body: Stmt) -> Stmt {
        self.stmt(StmtKind::While(WhileStmt {
            cond,
            body: Box::new(body),
        }))
    }

    pub fn for_(&self, init: Vec<Expr>, cond: Option<Expr>, update: Vec<Expr>, body: Stmt) -> Stmt {
        self.stmt(StmtKind::For(ForStmt {
            init,
            cond,
            update,
            body: Box::new(body),
            scope: None,
        }))
    }

    pub fn for_in(&self, var: Parameter, iterable: Expr, body: Stmt) -> Stmt {
        self.stmt(StmtKind::ForIn(ForInStmt {
            var,
            iterable,
            body: Box::new(body),
            scope: None,
        }))
    }

    pub fn break_(&self) -> Stmt {
        self.stmt(StmtKind::Break)
    }

    pub fn continue_(&self) -> Stmt {
        self.stmt(StmtKind::Continue)
    }

    pub fn throw(&self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Throw(expr))
    }

    pub fn try_(&self, body: Stmt, catches: Vec<CatchClause>, finally: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::Try(TryStmt {
            body: Box::new(body),
            catches,
            finally: finally.map(Box::new),
        }))
    }

    pub fn catch(&self, param: Parameter, body: Stmt) -> CatchClause {
        CatchClause {
            param,
            body,
            scope: None,
        }
    }

    pub fn switch(&self, subject: Expr, cases: Vec<(Expr, Stmt)>, default: Option<Stmt>) -> Stmt {
        self.stmt(StmtKind::Switch(SwitchStmt {
            subject,
            cases: cases
                .into_iter()
                .map(|(value, body)| SwitchCase { value, body })
                .collect(),
            default: default.map(Box::new),
        }))
    }

    pub fn synthetic(&self, body: SyntheticBody) -> Stmt {
        self.stmt(StmtKind::Synthetic(body))
    }

    pub fn empty(&self) -> Stmt {
        self.stmt(StmtKind::Empty)
    }
}
