//! Reference-counted slot pools for heap objects and upvalues

use crate::bytecode::ProtoId;
use crate::error::VmError;
use crate::interpreter::Interpreter;
use crate::table::Table;
use crate::value::Value;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Ref-counting handle to a pooled entry. Cloning bumps the refcount; the
/// slot is released when the last handle drops.
pub type Handle<T> = Rc<RefCell<T>>;

/// Host function callable from script. Returns how many results it pushed.
pub type NativeFn = fn(&mut Interpreter) -> Result<usize, VmError>;

/// Slot pool with stable positions.
///
/// The pool keeps weak back-references only, so refcounts live entirely in
/// the handles: a slot is vacant exactly when every handle to it is gone.
/// Allocation reuses the first vacant slot before growing the backing
/// storage, and growth never moves existing entries.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Weak<RefCell<T>>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Create an empty pool.
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Allocate an entry, reusing the first vacant slot.
    pub fn alloc(&mut self, value: T) -> Handle<T> {
        let handle = Rc::new(RefCell::new(value));
        let entry = Rc::downgrade(&handle);

        match self.slots.iter_mut().find(|slot| slot.strong_count() == 0) {
            Some(slot) => *slot = entry,
            None => self.slots.push(entry),
        }

        handle
    }

    /// Number of slots in the backing storage, vacant or not.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn live(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    /// Iterate over handles to every occupied slot.
    pub fn iter_live(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.slots.iter().filter_map(Weak::upgrade)
    }
}

/// Script closure: a prototype bound to its captured upvalues.
#[derive(Debug, Clone)]
pub struct ScriptClosure {
    /// Prototype the closure executes.
    pub proto: ProtoId,
    /// Captured upvalue handles, in descriptor order.
    pub upvalues: Vec<UpvalRef>,
}

/// Heap-allocated object variants.
#[derive(Debug)]
pub enum HeapObject {
    /// Key-value table.
    Table(Table),
    /// Closure over a chunk prototype.
    Closure(ScriptClosure),
    /// Closure over a host function.
    Native(NativeFn),
}

impl HeapObject {
    /// Borrow the table variant, if that is what is stored.
    pub const fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Mutably borrow the table variant, if that is what is stored.
    pub fn as_table_mut(&mut self) -> Option<&mut Table> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

/// Handle to a heap object.
pub type ObjectRef = Handle<HeapObject>;

/// A captured variable.
///
/// Open upvalues alias a register stack slot of a still-live frame; closed
/// upvalues own their value and survive the frame.
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Aliases the register stack slot at the given absolute index.
    Open(usize),
    /// Owns its value.
    Closed(Value),
}

impl Upvalue {
    /// Stack slot an open upvalue aliases.
    pub const fn stack_index(&self) -> Option<usize> {
        match self {
            Self::Open(index) => Some(*index),
            Self::Closed(_) => None,
        }
    }
}

/// Handle to a pooled upvalue.
pub type UpvalRef = Handle<Upvalue>;

#[cfg(test)]
mod tests {
    use super::*;

    use quickcheck_macros::quickcheck;

    #[test]
    fn vacated_slot_is_reused() {
        let mut pool = Pool::new();

        let first = pool.alloc(1u8);
        assert_eq!(pool.slots(), 1);

        drop(first);
        assert_eq!(pool.live(), 0);

        let _second = pool.alloc(2u8);
        assert_eq!(pool.slots(), 1);
        assert_eq!(pool.live(), 1);
    }

    #[test]
    fn growth_keeps_existing_entries() {
        let mut pool = Pool::new();

        let a = pool.alloc(1u8);
        let b = pool.alloc(2u8);
        let c = pool.alloc(3u8);

        assert_eq!(pool.slots(), 3);
        assert_eq!((*a.borrow(), *b.borrow(), *c.borrow()), (1, 2, 3));
    }

    #[quickcheck]
    fn copies_pin_the_slot(extra_copies: u8) -> bool {
        let mut pool = Pool::new();

        let handle = pool.alloc(0u8);
        let copies: Vec<_> = (0..extra_copies).map(|_| handle.clone()).collect();

        let pinned = pool.live() == 1;

        drop(copies);
        drop(handle);

        pinned && pool.live() == 0 && pool.slots() == 1
    }
}
