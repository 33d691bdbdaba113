//! Expression AST nodes

use super::{AnnotationNode, ClassId, Modifiers, NodeId, Parameter, ScopeId, SourcePos, Stmt, TypeRef, VarId};

/// Expression (produces a value)
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal value
    Constant(ConstValue),

    /// Name reference, bound by the scope resolver
    Variable(VariableRef),

    This,

    Super,

    /// `Foo` used as a value (`Foo.class`)
    ClassLiteral(TypeRef),

    /// `Outer.this`; rewritten into a `this$0` chain by inner-class completion
    OuterThis(TypeRef),

    /// `obj.name`
    Property(PropertyAccess),

    /// `obj.@name`
    Attribute(AttributeAccess),

    /// Direct field access generated by the compiler
    Field(FieldAccess),

    /// `obj.name(args)`
    MethodCall(MethodCall),

    /// `Type.name(args)`
    StaticCall(StaticCall),

    /// `new T(args)`, `this(args)`, `super(args)`
    ConstructorCall(ConstructorCall),

    Binary(Binary),

    /// `target = value` or compound `target op= value`
    Assign(Assign),

    /// `Type name = init`
    Declaration(Declaration),

    /// `++x`, `x--`
    IncDec(IncDec),

    Not(Box<Expr>),

    Negate(Box<Expr>),

    Cast(Cast),

    InstanceOf(InstanceOf),

    /// `cond ? a : b`
    Ternary(Ternary),

    /// `[a, b, c]`
    List(Vec<Expr>),

    /// `[k: v]`
    Map(Vec<MapEntry>),

    /// `new T[] { ... }`
    Array(ArrayLiteral),

    Closure(ClosureExpr),

    /// `"a${b}c"`
    GString(GStringExpr),

    /// `*list` inside an argument list
    Spread(Box<Expr>),

    /// Nested annotation used as an annotation attribute value
    Annotation(Box<AnnotationNode>),
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
}

impl ConstValue {
    /// Static type of the literal
    pub fn type_ref(&self) -> TypeRef {
        match self {
            ConstValue::Null => TypeRef::object(),
            ConstValue::Bool(_) => TypeRef::boolean(),
            ConstValue::Int(_) => TypeRef::int(),
            ConstValue::Long(_) => TypeRef::long(),
            ConstValue::Float(_) => TypeRef::Primitive(super::Primitive::Float),
            ConstValue::Double(_) => TypeRef::double(),
            ConstValue::Char(_) => TypeRef::Primitive(super::Primitive::Char),
            ConstValue::String(_) => TypeRef::string(),
        }
    }
}

/// What a name refers to after scope resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Local variable or parameter
    Local(VarId),
    /// Field declared in `owner` or inherited by it
    Field {
        owner: ClassId,
        name: String,
        is_static: bool,
    },
    /// Property (or getter-derived property) of `owner`
    Property {
        owner: ClassId,
        name: String,
        is_static: bool,
    },
    /// Unresolved; looked up at run time
    Dynamic { is_static: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub name: String,
    pub binding: Option<Binding>,
}

/// Member name that may be computed at run time (`obj."$name"`)
#[derive(Debug, Clone, PartialEq)]
pub enum MemberName {
    Static(String),
    Dynamic(Box<Expr>),
}

impl MemberName {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MemberName::Static(name) => Some(name),
            MemberName::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    pub object: Box<Expr>,
    pub name: MemberName,
    /// `?.`
    pub safe: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeAccess {
    pub object: Box<Expr>,
    pub name: String,
}

/// Field read or write that bypasses dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccess {
    /// Receiver; `None` means `this` (or no receiver for static fields)
    pub object: Option<Box<Expr>>,
    /// Class declaring the field
    pub owner: ClassId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub object: Box<Expr>,
    pub name: MemberName,
    pub args: Vec<Expr>,
    pub safe: bool,
    /// Call written without a receiver (`foo()` rather than `this.foo()`)
    pub implicit_this: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticCall {
    pub owner: TypeRef,
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorKind {
    New,
    /// `this(...)` inside a constructor
    This,
    /// `super(...)` inside a constructor
    Super,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorCall {
    pub ty: TypeRef,
    pub args: Vec<Expr>,
    pub kind: CtorKind,
    /// Anonymous inner class instantiated by this call
    pub anonymous: Option<ClassId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `a[b]`
    Index,
}

impl BinaryOp {
    /// Operator method invoked through the metaclass
    pub fn method_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "plus",
            BinaryOp::Sub => "minus",
            BinaryOp::Mul => "multiply",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Index => "getAt",
            BinaryOp::Eq => "equals",
            BinaryOp::Ne => "equals",
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => "compareTo",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    /// Operator of a compound assignment
    pub op: Option<BinaryOp>,
    pub target: Box<Expr>,
    pub value: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub ty: TypeRef,
    pub modifiers: Modifiers,
    /// Set by the scope resolver
    pub var: Option<VarId>,
    pub init: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncDec {
    pub op: IncDecOp,
    pub prefix: bool,
    pub target: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub ty: TypeRef,
    pub expr: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOf {
    pub expr: Box<Expr>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ternary {
    pub cond: Box<Expr>,
    pub then: Box<Expr>,
    pub otherwise: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayLiteral {
    pub elem: TypeRef,
    pub values: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureExpr {
    /// `None` for the implicit `it` parameter
    pub params: Option<Vec<Parameter>>,
    pub body: Box<Stmt>,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GStringExpr {
    /// Literal parts; one more than `values`
    pub strings: Vec<String>,
    pub values: Vec<Expr>,
}

impl Expr {
    /// Set the source position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.pos = SourcePos::new(line, column);
        self
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    pub fn is_this(&self) -> bool {
        matches!(self.kind, ExprKind::This)
    }

    pub fn as_variable(&self) -> Option<&VariableRef> {
        match &self.kind {
            ExprKind::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// `this(...)` or `super(...)`
    pub fn is_special_ctor_call(&self) -> bool {
        matches!(
            &self.kind,
            ExprKind::ConstructorCall(ConstructorCall {
                kind: CtorKind::This | CtorKind::Super,
                ..
            })
        )
    }
}
