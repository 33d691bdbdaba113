//! Abstract Syntax Tree
//!
//! The tree the back end consumes: classes live in an arena owned by the
//! [`CompileUnit`], statements and expressions are closed sum types, and
//! everything one pass tells another goes through [`SideTables`].

pub mod builder;
pub mod expr;
pub mod library;
pub mod modifiers;
pub mod node;
pub mod side;
pub mod stmt;
pub mod types;
pub mod unit;
pub mod visit;

pub use builder::AstBuilder;
pub use expr::*;
pub use modifiers::Modifiers;
pub use node::*;
pub use side::{ParamKey, SideTables};
pub use stmt::*;
pub use types::{names, Primitive, TypeRef};
pub use unit::CompileUnit;

use std::sync::atomic::{AtomicU32, Ordering};

/// Index of a class in the compile unit arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a statement, expression or annotation node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Index into the variable table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Index into the scope tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Position of a node in its source file (0 = unknown)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

/// Node id allocator shared by everything that creates nodes for one unit
#[derive(Debug, Default)]
pub struct NodeIds {
    next: AtomicU32,
}

impl NodeIds {
    pub fn next(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
