use crate::backtrack::{Backtrack, DecLvl};

/// A trail consists of a sequence of events typically representing the changes
/// to a data structure.
/// The purpose of this structure is to allow undoing the changes in order to restore a
/// previous state.
///
/// It supports save points, on which one may backtrack. Events pushed before the
/// first save point are not recorded, as there is nothing to undo them to.
#[derive(Clone)]
pub struct Trail<Event> {
    events: Vec<Event>,
    /// Maps each decision level to the index of its first event.
    saved_states: Vec<usize>,
}

impl<Event> Trail<Event> {
    pub fn new() -> Self {
        Trail {
            events: vec![],
            saved_states: vec![],
        }
    }

    pub fn push(&mut self, e: Event) {
        if !self.saved_states.is_empty() {
            // only record if we have an initial save point.
            // Otherwise there is no point in maintaining it as it cannot be undone.
            self.events.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Undoes all events of the last decision level, invoking `f` on each one
    /// in reverse chronological order.
    pub fn restore_last_with(&mut self, mut f: impl FnMut(Event)) {
        let last_index = self.saved_states.pop().expect("No saved state");
        while self.events.len() > last_index {
            let e = self.events.pop().expect("No event left");
            f(e);
        }
    }

    pub fn restore_with(&mut self, saved_id: DecLvl, mut f: impl FnMut(Event)) {
        while self.current_decision_level() > saved_id {
            self.restore_last_with(&mut f);
        }
    }
}

impl<Event> Backtrack for Trail<Event> {
    fn save_state(&mut self) -> DecLvl {
        self.saved_states.push(self.events.len());
        self.current_decision_level()
    }

    fn num_saved(&self) -> u32 {
        self.saved_states.len() as u32
    }

    fn restore_last(&mut self) {
        self.restore_last_with(|_| {})
    }
}

impl<Event> Default for Trail<Event> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_before_first_save_point_are_dropped() {
        let mut trail: Trail<i32> = Trail::new();
        trail.push(1);
        trail.push(2);
        assert!(trail.is_empty());
        trail.save_state();
        trail.push(3);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_lifo_restoration() {
        let mut trail = Trail::new();
        trail.save_state();
        trail.push("a");
        trail.push("b");
        trail.save_state();
        trail.push("c");

        let mut undone = vec![];
        trail.restore_last_with(|e| undone.push(e));
        assert_eq!(undone, vec!["c"]);
        trail.restore_last_with(|e| undone.push(e));
        assert_eq!(undone, vec!["c", "b", "a"]);
        assert_eq!(trail.current_decision_level(), DecLvl::ROOT);
    }

    #[test]
    fn test_restore_to_level() {
        let mut trail = Trail::new();
        trail.save_state(); // level 1
        trail.push(1);
        trail.save_state(); // level 2
        trail.push(2);
        trail.save_state(); // level 3
        trail.push(3);
        trail.push(4);

        let mut undone = vec![];
        trail.restore_with(DecLvl::new(1), |e| undone.push(e));
        assert_eq!(undone, vec![4, 3, 2]);
        assert_eq!(trail.current_decision_level(), DecLvl::new(1));
        assert_eq!(trail.len(), 1);
    }
}
