//! Local variable slots
//!
//! `this` takes slot 0 in instance methods, parameters follow in order, then
//! locals. Slots are handed out per block scope and reused once the scope
//! closes. A closure-shared variable always occupies one slot holding its
//! `groovy.lang.Reference` cell, whatever its declared type.

use crate::ast::{TypeRef, VarId};
use rustc_hash::FxHashMap;

/// Where a variable lives in the frame
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSlot {
    pub index: u16,
    /// Declared type of the variable (not of the cell)
    pub ty: TypeRef,
    /// Slot holds a `Reference` cell
    pub shared: bool,
}

impl LocalSlot {
    /// Type of the value stored in the slot itself
    pub fn storage_type(&self) -> TypeRef {
        if self.shared {
            TypeRef::class(crate::ast::names::REFERENCE)
        } else {
            self.ty.erasure()
        }
    }

    fn width(&self) -> u16 {
        if self.shared {
            1
        } else {
            self.ty.slots().max(1)
        }
    }
}

#[derive(Debug)]
pub struct SlotTable {
    next: u16,
    max: u16,
    vars: FxHashMap<VarId, LocalSlot>,
    /// `next` at each open scope
    marks: Vec<u16>,
}

impl SlotTable {
    pub fn new(is_static: bool) -> Self {
        let next = if is_static { 0 } else { 1 };
        Self {
            next,
            max: next,
            vars: FxHashMap::default(),
            marks: Vec::new(),
        }
    }

    /// Allocate the next slot(s) for `var`
    pub fn define(&mut self, var: VarId, ty: TypeRef, shared: bool) -> LocalSlot {
        let mut slot = LocalSlot { index: self.next, ty, shared };
        slot.index = self.reserve(slot.width());
        self.vars.insert(var, slot.clone());
        slot
    }

    /// Rebind `var` to a different slot (a parameter moved into a cell)
    pub fn rebind(&mut self, var: VarId, slot: LocalSlot) {
        self.vars.insert(var, slot);
    }

    /// Anonymous slot for compiler temporaries
    pub fn temp(&mut self, ty: &TypeRef) -> u16 {
        self.reserve(ty.slots().max(1))
    }

    fn reserve(&mut self, width: u16) -> u16 {
        let index = self.next;
        self.next += width;
        self.max = self.max.max(self.next);
        index
    }

    pub fn get(&self, var: VarId) -> Option<&LocalSlot> {
        self.vars.get(&var)
    }

    pub fn push_scope(&mut self) {
        self.marks.push(self.next);
    }

    /// Release every slot handed out since the matching `push_scope`
    pub fn pop_scope(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.vars.retain(|_, slot| slot.index < mark);
            self.next = mark;
        }
    }

    /// High-water mark, the method's `max_locals`
    pub fn max_locals(&self) -> u16 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_this_takes_slot_zero() {
        let mut slots = SlotTable::new(false);
        assert_eq!(slots.define(VarId(0), TypeRef::int(), false).index, 1);
        let mut slots = SlotTable::new(true);
        assert_eq!(slots.define(VarId(0), TypeRef::int(), false).index, 0);
    }

    #[test]
    fn test_wide_types_take_two_slots() {
        let mut slots = SlotTable::new(false);
        slots.define(VarId(0), TypeRef::long(), false);
        let next = slots.define(VarId(1), TypeRef::double(), false);
        assert_eq!(next.index, 3);
        assert_eq!(slots.max_locals(), 5);
    }

    #[test]
    fn test_shared_variable_is_one_reference_slot() {
        let mut slots = SlotTable::new(true);
        let slot = slots.define(VarId(0), TypeRef::long(), true);
        assert_eq!(slot.storage_type(), TypeRef::class("groovy.lang.Reference"));
        assert_eq!(slots.define(VarId(1), TypeRef::int(), false).index, 1);
    }

    #[test]
    fn test_scopes_reuse_slots() {
        let mut slots = SlotTable::new(false);
        slots.define(VarId(0), TypeRef::object(), false);
        slots.push_scope();
        slots.define(VarId(1), TypeRef::long(), false);
        assert!(slots.get(VarId(1)).is_some());
        slots.pop_scope();
        assert!(slots.get(VarId(1)).is_none());
        assert_eq!(slots.define(VarId(2), TypeRef::int(), false).index, 2);
        assert_eq!(slots.max_locals(), 4);
    }
}
