use crate::backtrack::{Backtrack, DecLvl};

/// Handle to an object living in a [RevArena].
///
/// The handle records the generation of the slot it points to, which makes it
/// possible to detect accesses to an object that was freed by backtracking.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    object: Option<T>,
    generation: u32,
}

/// An arena for objects allocated during search, whose lifetime is tied to the
/// decision level at which they were allocated: backtracking below that level
/// frees them in bulk.
///
/// This stands in for reversible allocation in a garbage-collected setting:
/// objects created mid-search disappear deterministically, and stale handles
/// are detectable through the generation counter.
pub struct RevArena<T> {
    slots: Vec<Slot<T>>,
    /// Number of live slots at the start of each saved level.
    saved_states: Vec<usize>,
    /// Incremented on each backtrack, so that a freed slot reused by a later
    /// allocation does not alias with handles to the freed object.
    generation: u32,
}

impl<T> RevArena<T> {
    pub fn new() -> Self {
        RevArena {
            slots: vec![],
            saved_states: vec![],
            generation: 0,
        }
    }

    /// Transfers ownership of `object` to the arena. The object will be freed
    /// when backtracking below the current decision level.
    pub fn alloc(&mut self, object: T) -> ObjRef {
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            object: Some(object),
            generation: self.generation,
        });
        ObjRef {
            index,
            generation: self.generation,
        }
    }

    /// Returns the object if the handle is still live, None if it was freed.
    pub fn get(&self, r: ObjRef) -> Option<&T> {
        let slot = self.slots.get(r.index as usize)?;
        if slot.generation == r.generation {
            slot.object.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut T> {
        let slot = self.slots.get_mut(r.index as usize)?;
        if slot.generation == r.generation {
            slot.object.as_mut()
        } else {
            None
        }
    }

    pub fn num_live(&self) -> usize {
        self.slots.len()
    }

    /// Iterates over all live objects, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.iter().filter_map(|s| s.object.as_ref())
    }
}

impl<T> Backtrack for RevArena<T> {
    fn save_state(&mut self) -> DecLvl {
        self.saved_states.push(self.slots.len());
        self.current_decision_level()
    }

    fn num_saved(&self) -> u32 {
        self.saved_states.len() as u32
    }

    fn restore_last(&mut self) {
        let n = self.saved_states.pop().expect("No saved state");
        if n < self.slots.len() {
            self.slots.truncate(n);
            self.generation += 1;
        }
    }
}

impl<T> Default for RevArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
