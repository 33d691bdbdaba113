//! Variable scopes
//!
//! The scope tree and variable table filled in by the [`resolver`]. Scopes
//! live in an arena indexed by [`ScopeId`]; variables in one indexed by
//! [`VarId`]. Both belong to the compile unit.

pub mod resolver;

pub use resolver::{declare_parameter, resolve, resolve_pending};

use crate::ast::{Binding, ClassId, Modifiers, ScopeId, SourcePos, TypeRef, VarId};
use rustc_hash::FxHashMap;

// ============================================================================
// Variables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Parameter,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: TypeRef,
    pub kind: VarKind,
    pub modifiers: Modifiers,
    /// Captured by a closure or anonymous class; lives in a `Reference` cell
    pub closure_shared: bool,
    /// Declaring scope
    pub scope: ScopeId,
    pub pos: SourcePos,
}

impl Variable {
    pub fn is_final(&self) -> bool {
        self.modifiers.is_final()
    }

    pub fn is_parameter(&self) -> bool {
        self.kind == VarKind::Parameter
    }
}

#[derive(Debug, Default)]
pub struct VarTable {
    vars: Vec<Variable>,
}

impl VarTable {
    pub fn declare(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn get(&self, id: VarId) -> &Variable {
        &self.vars[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.0 as usize]
    }

    pub fn is_closure_shared(&self, id: VarId) -> bool {
        self.get(id).closure_shared
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

// ============================================================================
// Scopes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Class,
    Method,
    Block,
    Closure,
    Catch,
    Loop,
}

#[derive(Debug, Clone)]
pub struct VariableScope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub in_static_context: bool,
    /// Class whose code this scope belongs to
    pub class: ClassId,
    /// Class scope of an anonymous class; transparent to lookups
    pub anonymous: bool,
    declared: FxHashMap<String, Binding>,
    /// Locals of enclosing scopes used here, in first-use order
    referenced_locals: Vec<VarId>,
    /// Class members used here, in first-use order
    referenced_class_vars: Vec<String>,
}

impl VariableScope {
    pub fn is_class_scope(&self) -> bool {
        self.kind == ScopeKind::Class
    }

    pub fn declared(&self, name: &str) -> Option<&Binding> {
        self.declared.get(name)
    }

    /// Declared local variable of the given name
    pub fn declared_var(&self, name: &str) -> Option<VarId> {
        match self.declared.get(name) {
            Some(Binding::Local(var)) => Some(*var),
            _ => None,
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, binding: Binding) {
        self.declared.insert(name.into(), binding);
    }

    pub fn referenced_locals(&self) -> &[VarId] {
        &self.referenced_locals
    }

    pub fn referenced_class_vars(&self) -> &[String] {
        &self.referenced_class_vars
    }

    pub fn add_referenced_local(&mut self, var: VarId) {
        if !self.referenced_locals.contains(&var) {
            self.referenced_locals.push(var);
        }
    }

    pub fn add_referenced_class_var(&mut self, name: &str) {
        if !self.referenced_class_vars.iter().any(|n| n == name) {
            self.referenced_class_vars.push(name.to_string());
        }
    }
}

#[derive(Debug, Default)]
pub struct ScopeTree {
    scopes: Vec<VariableScope>,
}

impl ScopeTree {
    pub fn push(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        in_static_context: bool,
        class: ClassId,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(VariableScope {
            id,
            kind,
            parent,
            in_static_context,
            class,
            anonymous: false,
            declared: FxHashMap::default(),
            referenced_locals: Vec::new(),
            referenced_class_vars: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &VariableScope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut VariableScope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_sets_keep_first_use_order() {
        let mut tree = ScopeTree::default();
        let id = tree.push(ScopeKind::Closure, None, false, ClassId(0));
        let scope = tree.get_mut(id);
        scope.add_referenced_local(VarId(3));
        scope.add_referenced_local(VarId(1));
        scope.add_referenced_local(VarId(3));
        scope.add_referenced_class_var("x");
        scope.add_referenced_class_var("x");
        assert_eq!(scope.referenced_locals(), &[VarId(3), VarId(1)]);
        assert_eq!(scope.referenced_class_vars().len(), 1);
    }

    #[test]
    fn test_declared_var() {
        let mut tree = ScopeTree::default();
        let id = tree.push(ScopeKind::Block, None, false, ClassId(0));
        tree.get_mut(id).declare("a", Binding::Local(VarId(0)));
        tree.get_mut(id)
            .declare("b", Binding::Dynamic { is_static: true });
        assert_eq!(tree.get(id).declared_var("a"), Some(VarId(0)));
        assert_eq!(tree.get(id).declared_var("b"), None);
        assert!(tree.get(id).declared("b").is_some());
    }
}
