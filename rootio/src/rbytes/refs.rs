//! Back-reference table for polymorphic object decoding

use hashbrown::HashMap;

use crate::rtypes::Object;

#[derive(Debug, Clone)]
enum Slot {
    Class(String),
    /// Reserved while the object body is being decoded
    Pending,
    Object(usize),
}

/// Tag-to-entry table scoped to one decode call
///
/// Objects live in an arena so that a slot registered before its body is
/// decoded can be filled once decoding completes. Back-references hand out
/// clones of the arena entry.
#[derive(Debug, Default)]
pub struct RefTable {
    slots: HashMap<u64, Slot>,
    arena: Vec<Object>,
}

impl RefTable {
    /// Slot number used by streams written without byte counts
    pub fn next_slot(&self) -> u64 {
        self.slots.len() as u64 + 1
    }

    pub fn insert_class(&mut self, slot: u64, class: String) {
        self.slots.insert(slot, Slot::Class(class));
    }

    pub fn reserve(&mut self, slot: u64) {
        self.slots.insert(slot, Slot::Pending);
    }

    pub fn fill(&mut self, slot: u64, obj: Object) {
        self.arena.push(obj);
        self.slots.insert(slot, Slot::Object(self.arena.len() - 1));
    }

    pub fn class(&self, slot: u64) -> Option<&str> {
        match self.slots.get(&slot)? {
            Slot::Class(name) => Some(name),
            _ => None,
        }
    }

    /// Completed object registered at `slot`
    ///
    /// A pending slot (a reference to an object still being decoded) yields
    /// `None`.
    pub fn object(&self, slot: u64) -> Option<&Object> {
        match self.slots.get(&slot)? {
            Slot::Object(idx) => self.arena.get(*idx),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
