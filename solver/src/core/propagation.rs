//! Narrow posting surface towards the (external) propagation engine.
//!
//! The search core does not implement a constraint library: it only needs a
//! way to post constraints — at the root or mid-search — and to reach a
//! propagation fixpoint after each decision. Anything richer (global
//! constraints, expressions) belongs to the collaborator that owns the
//! variables.

use crate::backtrack::{Backtrack, DecLvl};
use crate::core::{Failure, IntCst, Store, VarRef};
use smallvec::SmallVec;

/// A deductive rule over the domains of the store.
///
/// `propagate` must be repeatable: called twice on the same domains it must
/// perform the same prunings and have no side effect outside the store.
pub trait Propagator {
    fn propagate(&mut self, store: &mut Store) -> Result<(), Failure>;
}

/// The set of posted propagators.
///
/// Posting is reversible: a propagator posted after a save point is removed
/// when backtracking past it, which gives mid-search constraint injection
/// (metaheuristics, symmetry clauses) the same lifetime discipline as domain
/// changes.
pub struct PropagatorSet {
    props: Vec<Box<dyn Propagator>>,
    saved_states: Vec<usize>,
}

impl PropagatorSet {
    pub fn new() -> Self {
        PropagatorSet {
            props: vec![],
            saved_states: vec![],
        }
    }

    pub fn post(&mut self, propagator: Box<dyn Propagator>) {
        self.props.push(propagator);
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl Backtrack for PropagatorSet {
    fn save_state(&mut self) -> DecLvl {
        self.saved_states.push(self.props.len());
        self.current_decision_level()
    }

    fn num_saved(&self) -> u32 {
        self.saved_states.len() as u32
    }

    fn restore_last(&mut self) {
        let n = self.saved_states.pop().expect("No saved state");
        self.props.truncate(n);
    }
}

impl Default for PropagatorSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs all propagators until no domain changes anymore, or a failure occurs.
pub fn propagate(store: &mut Store, props: &mut PropagatorSet) -> Result<(), Failure> {
    loop {
        let stamp = store.stamp();
        for p in props.props.iter_mut() {
            p.propagate(store)?;
        }
        if store.stamp() == stamp {
            return Ok(());
        }
    }
}

/// The literal `var == value`, used as premise or conclusion of posted clauses.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Term {
    pub var: VarRef,
    pub value: IntCst,
}

impl Term {
    pub fn new(var: VarRef, value: IntCst) -> Term {
        Term { var, value }
    }

    /// True if the literal necessarily holds in the current domains.
    pub fn entailed(&self, store: &Store) -> bool {
        store.is_bound(self.var) && store.value(self.var) == self.value
    }

    /// True if the literal can no longer hold.
    pub fn impossible(&self, store: &Store) -> bool {
        !store.contains(self.var, self.value)
    }
}

/// `premises => excluded is false`: once every premise literal is entailed,
/// removes `excluded.value` from the domain of `excluded.var`.
///
/// This is the clause shape posted by the symmetry manager.
pub struct GuardedRemoval {
    pub premises: SmallVec<[Term; 4]>,
    pub excluded: Term,
}

impl Propagator for GuardedRemoval {
    fn propagate(&mut self, store: &mut Store) -> Result<(), Failure> {
        if self.premises.iter().all(|t| t.entailed(store)) {
            store.remove_value(self.excluded.var, self.excluded.value)?;
        }
        Ok(())
    }
}

/// `a != b + offset`. Enough of a constraint library for the tests and demos
/// of this crate (n-queens style disequalities).
pub struct NeqOffset {
    pub a: VarRef,
    pub b: VarRef,
    pub offset: IntCst,
}

impl NeqOffset {
    pub fn new(a: VarRef, b: VarRef, offset: IntCst) -> Self {
        NeqOffset { a, b, offset }
    }
}

impl Propagator for NeqOffset {
    fn propagate(&mut self, store: &mut Store) -> Result<(), Failure> {
        if store.is_bound(self.b) {
            store.remove_value(self.a, store.value(self.b) + self.offset)?;
        }
        if store.is_bound(self.a) {
            store.remove_value(self.b, store.value(self.a) - self.offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_neq_fixpoint() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let x = store.new_var(0, 2);
        let y = store.new_var(0, 2);
        let z = store.new_var(0, 2);
        props.post(Box::new(NeqOffset::new(x, y, 0)));
        props.post(Box::new(NeqOffset::new(y, z, 0)));

        store.set_value(x, 0).unwrap();
        store.set_value(z, 2).unwrap();
        propagate(&mut store, &mut props).unwrap();
        assert!(store.is_bound(y));
        assert_eq!(store.value(y), 1);
    }

    #[test]
    fn test_posted_propagators_removed_on_backtrack() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let x = store.new_var(0, 5);

        store.save_state();
        props.save_state();
        props.post(Box::new(NeqOffset::new(x, x, 1)));
        assert_eq!(props.len(), 1);
        props.restore_last();
        store.restore_last();
        assert!(props.is_empty());
    }

    #[test]
    fn test_guarded_removal_fires_only_when_premises_hold() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let x = store.new_var(0, 3);
        let y = store.new_var(0, 3);
        props.post(Box::new(GuardedRemoval {
            premises: smallvec![Term::new(x, 1)],
            excluded: Term::new(y, 2),
        }));

        propagate(&mut store, &mut props).unwrap();
        assert!(store.contains(y, 2));

        store.set_value(x, 1).unwrap();
        propagate(&mut store, &mut props).unwrap();
        assert!(!store.contains(y, 2));
    }
}
