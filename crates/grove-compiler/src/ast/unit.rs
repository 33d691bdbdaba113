//! Compile unit
//!
//! Owns the class arena, the variable and scope tables, and the side
//! tables. Library stubs are installed on creation so hierarchy queries
//! work without a class path.

use super::library;
use super::*;
use crate::codegen::GeneratedClass;
use crate::error::CompileResult;
use crate::scope::{ScopeTree, VarTable};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
pub struct CompileUnit {
    classes: Vec<ClassNode>,
    by_name: FxHashMap<String, ClassId>,
    pub vars: VarTable,
    pub scopes: ScopeTree,
    pub side: SideTables,
    /// Class files produced by the last successful compilation
    pub output: Vec<GeneratedClass>,
    ids: Arc<NodeIds>,
}

impl Default for CompileUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileUnit {
    pub fn new() -> Self {
        let mut unit = Self {
            classes: Vec::new(),
            by_name: FxHashMap::default(),
            vars: VarTable::default(),
            scopes: ScopeTree::default(),
            side: SideTables::default(),
            output: Vec::new(),
            ids: Arc::new(NodeIds::default()),
        };
        let builder = unit.builder();
        for stub in library::stubs(&builder) {
            unit.add_class(stub);
        }
        unit
    }

    /// Builder sharing this unit's node id allocator
    pub fn builder(&self) -> AstBuilder {
        AstBuilder::new(self.ids.clone())
    }

    // ===== Arena =====

    pub fn add_class(&mut self, mut class: ClassNode) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        class.id = id;
        self.by_name.insert(class.name.clone(), id);
        self.classes.push(class);
        id
    }

    /// Add `class` as a member of `outer`
    pub fn add_inner(&mut self, outer: ClassId, mut class: ClassNode) -> ClassId {
        class.outer = Some(outer);
        if class.source_file.is_none() {
            class.source_file = self.class(outer).source_file.clone();
        }
        let id = self.add_class(class);
        self.class_mut(outer).inner_classes.push(id);
        id
    }

    pub fn class(&self, id: ClassId) -> &ClassNode {
        &self.classes[id.index()]
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassNode {
        &mut self.classes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Class behind a type reference; `None` for primitives, arrays and
    /// classes outside the unit
    pub fn resolve(&self, ty: &TypeRef) -> Option<ClassId> {
        ty.class_name().and_then(|name| self.find(name))
    }

    /// Classes compiled from source, in insertion order
    pub fn primary_classes(&self) -> Vec<ClassId> {
        self.classes
            .iter()
            .filter(|c| c.is_primary)
            .map(|c| c.id)
            .collect()
    }

    // ===== Hierarchy =====

    pub fn super_class_id(&self, id: ClassId) -> Option<ClassId> {
        self.class(id)
            .super_class
            .as_ref()
            .and_then(|s| self.resolve(s))
    }

    /// Superclasses of `id`, nearest first
    pub fn superclasses(&self, id: ClassId) -> Vec<ClassId> {
        let mut out = Vec::new();
        let mut current = self.super_class_id(id);
        while let Some(cid) = current {
            if out.contains(&cid) {
                break;
            }
            out.push(cid);
            current = self.super_class_id(cid);
        }
        out
    }

    /// `id` is `ancestor` or inherits from it (classes and interfaces)
    pub fn is_subclass_of(&self, id: ClassId, ancestor: ClassId) -> bool {
        if id == ancestor {
            return true;
        }
        self.superclasses(id).contains(&ancestor) || self.all_interfaces(id).contains(&ancestor)
    }

    pub fn implements(&self, id: ClassId, interface: &str) -> bool {
        self.all_interfaces(id)
            .iter()
            .any(|i| self.class(*i).name == interface)
    }

    /// Every interface implemented directly or through superclasses and
    /// superinterfaces
    pub fn all_interfaces(&self, id: ClassId) -> Vec<ClassId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        let mut pending = vec![id];
        pending.extend(self.superclasses(id));
        while let Some(cid) = pending.pop() {
            for iface in &self.class(cid).interfaces {
                if let Some(iid) = self.resolve(iface) {
                    if seen.insert(iid) {
                        out.push(iid);
                        pending.push(iid);
                    }
                }
            }
        }
        out
    }

    /// Field visible from `id`, searching the superclass chain
    pub fn find_field(&self, id: ClassId, name: &str) -> Option<(ClassId, &FieldNode)> {
        std::iter::once(id)
            .chain(self.superclasses(id))
            .find_map(|cid| self.class(cid).field(name).map(|f| (cid, f)))
    }

    /// Method with the given erased signature in `id` or its superclasses
    pub fn find_method(
        &self,
        id: ClassId,
        name: &str,
        params: &[TypeRef],
    ) -> Option<(ClassId, &MethodNode)> {
        std::iter::once(id)
            .chain(self.superclasses(id))
            .find_map(|cid| self.class(cid).declared_method(name, params).map(|m| (cid, m)))
    }

    /// Number of superclass steps from `id` to `java.lang.Object`
    pub fn object_distance(&self, id: ClassId) -> u32 {
        self.superclasses(id).len() as u32
    }

    /// How many `outer` links lead from `from` to `to`
    pub fn outer_distance(&self, from: ClassId, to: ClassId) -> Option<usize> {
        let mut current = Some(from);
        let mut distance = 0;
        while let Some(cid) = current {
            if cid == to {
                return Some(distance);
            }
            current = self.class(cid).outer;
            distance += 1;
        }
        None
    }

    /// Outermost enclosing class of `id`
    pub fn top_level(&self, id: ClassId) -> ClassId {
        let mut current = id;
        while let Some(outer) = self.class(current).outer {
            current = outer;
        }
        current
    }

    /// Reference assignability by erased name, through the unit's hierarchy
    pub fn is_assignable(&self, from: &TypeRef, to: &TypeRef) -> bool {
        let (from, to) = (from.erasure(), to.erasure());
        if from == to || (to.is_object() && from.is_reference()) {
            return true;
        }
        match (&from, &to) {
            (TypeRef::Array(a), TypeRef::Array(b)) => self.is_assignable(a, b),
            (TypeRef::Array(_), _) => matches!(
                to.class_name(),
                Some(names::CLONEABLE) | Some("java.io.Serializable")
            ),
            _ => match (self.resolve(&from), self.resolve(&to)) {
                (Some(f), Some(t)) => self.is_subclass_of(f, t),
                _ => false,
            },
        }
    }

    // ===== Output =====

    /// Write `output` below `dir`, one `.class` file per class in its
    /// package directory
    pub fn write_classes(&self, dir: &Path) -> CompileResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.output.len());
        for class in &self.output {
            let path = dir.join(format!("{}.class", types::internal_name(&class.name)));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, &class.bytes)?;
            tracing::debug!(class = %class.name, path = %path.display(), "wrote class file");
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stubs_installed() {
        let unit = CompileUnit::new();
        let object = unit.find(names::OBJECT).unwrap();
        let string = unit.find(names::STRING).unwrap();
        assert_eq!(unit.super_class_id(string), Some(object));
        assert_eq!(unit.object_distance(object), 0);
        assert_eq!(unit.object_distance(string), 1);
        assert!(unit.primary_classes().is_empty());
    }

    #[test]
    fn test_hierarchy_queries() {
        let mut unit = CompileUnit::new();
        let a = unit.add_class(ClassNode::new("p.A", ClassKind::Class));
        let mut b = ClassNode::new("p.B", ClassKind::Class).with_super(TypeRef::class("p.A"));
        b.interfaces.push(TypeRef::class("java.lang.Runnable"));
        let b = unit.add_class(b);
        assert!(unit.is_subclass_of(b, a));
        assert!(!unit.is_subclass_of(a, b));
        assert!(unit.implements(b, "java.lang.Runnable"));
        assert_eq!(unit.object_distance(b), 2);
        assert!(unit.is_assignable(&TypeRef::class("p.B"), &TypeRef::class("p.A")));
        assert!(unit.is_assignable(
            &TypeRef::class("java.lang.Integer"),
            &TypeRef::class("java.lang.Number")
        ));
        assert!(!unit.is_assignable(&TypeRef::string(), &TypeRef::class("p.A")));
    }

    #[test]
    fn test_inner_links() {
        let mut unit = CompileUnit::new();
        let outer = unit.add_class(ClassNode::new("p.O", ClassKind::Class));
        let inner = unit.add_inner(outer, ClassNode::new("p.O$I", ClassKind::Class));
        let deeper = unit.add_inner(inner, ClassNode::new("p.O$I$J", ClassKind::Class));
        assert_eq!(unit.class(outer).inner_classes, vec![inner]);
        assert_eq!(unit.outer_distance(deeper, outer), Some(2));
        assert_eq!(unit.top_level(deeper), outer);
    }

    #[test]
    fn test_write_classes() {
        let mut unit = CompileUnit::new();
        unit.output.push(GeneratedClass {
            name: "p.q.A".to_string(),
            bytes: vec![0xCA, 0xFE, 0xBA, 0xBE],
        });
        let dir = tempfile::tempdir().unwrap();
        let paths = unit.write_classes(dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("p/q/A.class"));
        assert_eq!(std::fs::read(&paths[0]).unwrap(), vec![0xCA, 0xFE, 0xBA, 0xBE]);
    }
}
