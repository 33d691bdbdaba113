//! Statement AST nodes

use super::{Expr, NodeId, Parameter, ScopeId, SourcePos, TypeRef};

/// Statement (performs an action)
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    Return(Option<Expr>),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    ForIn(ForInStmt),
    Break,
    Continue,
    Throw(Expr),
    Try(TryStmt),
    Switch(SwitchStmt),
    /// Body emitted as a fixed instruction sequence
    Synthetic(SyntheticBody),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then: Box<Stmt>,
    pub otherwise: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub cond: Expr,
    pub body: Box<Stmt>,
}

/// `for (init; cond; update)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub init: Vec<Expr>,
    pub cond: Option<Expr>,
    pub update: Vec<Expr>,
    pub body: Box<Stmt>,
    pub scope: Option<ScopeId>,
}

/// `for (x in iterable)`
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStmt {
    pub var: Parameter,
    pub iterable: Expr,
    pub body: Box<Stmt>,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Parameter,
    pub body: Stmt,
    pub scope: Option<ScopeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub body: Box<Stmt>,
    pub catches: Vec<CatchClause>,
    pub finally: Option<Box<Stmt>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: Expr,
    pub body: Stmt,
}

/// Groovy switch: `isCase` matching with fall-through
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub subject: Expr,
    pub cases: Vec<SwitchCase>,
    pub default: Option<Box<Stmt>>,
}

/// Compiler-generated method bodies that are not expressible in the tree
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticBody {
    /// Load and cast the arguments, call the covariant override, return
    Bridge {
        /// Parameter types of the method being called
        target_params: Vec<TypeRef>,
        target_return: TypeRef,
        is_interface: bool,
    },
    /// Lazily initialized `metaClass` field read
    GetMetaClass,
    SetMetaClass,
    InvokeMethod,
    GetProperty,
    SetProperty,
    /// Per-class metaclass lookup through the static `ClassInfo` field
    GetStaticMetaClass { class_info: String },
}

impl Stmt {
    /// Set the source position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.pos = SourcePos::new(line, column);
        self
    }

    /// Statements that never complete normally
    pub fn is_exit(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::Return(_) | StmtKind::Throw(_) | StmtKind::Break | StmtKind::Continue
        )
    }

    pub fn as_block(&self) -> Option<&Block> {
        match &self.kind {
            StmtKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut Block> {
        match &mut self.kind {
            StmtKind::Block(b) => Some(b),
            _ => None,
        }
    }

    /// First statement, looking through blocks
    pub fn first_statement(&self) -> Option<&Stmt> {
        match &self.kind {
            StmtKind::Block(b) => b.stmts.first().and_then(|s| match s.kind {
                StmtKind::Block(_) => s.first_statement(),
                _ => Some(s),
            }),
            StmtKind::Empty => None,
            _ => Some(self),
        }
    }
}
