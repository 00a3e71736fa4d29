//! Symmetry breaking during search.
//!
//! Each registered breaker maps assignment literals to their image under one
//! symmetry of the problem. While the search descends, the manager records
//! the images of the applied assignments; when a decision `x == v` is
//! refuted, the symmetric refutation also holds under the recorded context,
//! so a guarded removal clause is posted:
//!
//! `(AND of recorded images) => image(x == v) is false`
//!
//! Both the recorded prefixes and the posted clauses are reversible, so the
//! manager needs no explicit cleanup on backtrack.

use crate::core::propagation::{GuardedRemoval, Term};
use crate::core::{Failure, IntCst, Store, TrailedInt, VarRef};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::{Decision, SearchCtx};
use smallvec::SmallVec;

/// One symmetry of the problem, as a mapping on assignment literals.
pub trait SymmetryBreaker {
    /// Image of the literal `var == value` under this symmetry, if the
    /// literal is in its scope.
    fn image(&self, store: &Store, var: VarRef, value: IntCst) -> Option<Term>;
}

/// Breaker defined by a plain closure over literals.
pub struct MappedSymmetry {
    map: Box<dyn Fn(&Store, VarRef, IntCst) -> Option<Term>>,
}

impl MappedSymmetry {
    pub fn new(map: Box<dyn Fn(&Store, VarRef, IntCst) -> Option<Term>>) -> Self {
        MappedSymmetry { map }
    }
}

impl SymmetryBreaker for MappedSymmetry {
    fn image(&self, store: &Store, var: VarRef, value: IntCst) -> Option<Term> {
        (self.map)(store, var, value)
    }
}

struct BreakerState {
    breaker: Box<dyn SymmetryBreaker>,
    /// Images of the applied assignments, oldest first. Only the first
    /// `len` entries are live; the tail is garbage left by backtracking.
    terms: Vec<Term>,
    len: TrailedInt,
}

pub struct SymmetryManager {
    breakers: Vec<BreakerState>,
}

impl SymmetryManager {
    pub fn new() -> Self {
        SymmetryManager { breakers: vec![] }
    }

    pub fn add(&mut self, store: &mut Store, breaker: Box<dyn SymmetryBreaker>) -> &mut Self {
        let len = store.new_trailed_int(0);
        self.breakers.push(BreakerState {
            breaker,
            terms: vec![],
            len,
        });
        self
    }
}

impl Default for SymmetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchMonitor for SymmetryManager {
    fn apply_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        let Some((var, value)) = decision.assignment() else {
            return Ok(());
        };
        for state in &mut self.breakers {
            if let Some(term) = state.breaker.image(ctx.store, var, value) {
                let len = ctx.store.get_int(state.len) as usize;
                state.terms.truncate(len);
                state.terms.push(term);
                ctx.store.set_int(state.len, (len + 1) as IntCst);
            }
        }
        Ok(())
    }

    fn refute_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        let Some((var, value)) = decision.assignment() else {
            return Ok(());
        };
        for state in &self.breakers {
            let Some(excluded) = state.breaker.image(ctx.store, var, value) else {
                continue;
            };
            let len = ctx.store.get_int(state.len) as usize;
            let live = &state.terms[..len];
            if live.iter().any(|t| t.impossible(ctx.store)) {
                // the symmetric context can no longer occur
                continue;
            }
            // entailed images stay entailed in the whole subtree where the
            // clause lives, so they can be dropped from the guard
            let premises: SmallVec<[Term; 4]> =
                live.iter().copied().filter(|t| !t.entailed(ctx.store)).collect();
            if premises.is_empty() {
                ctx.store.remove_value(excluded.var, excluded.value)?;
            } else {
                ctx.props.post(Box::new(GuardedRemoval { premises, excluded }));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::propagation::{propagate, PropagatorSet};
    use crate::core::Store;
    use crate::solver::stats::Stats;

    /// x and y are interchangeable: the image of `x == v` is `y == v` and
    /// conversely.
    fn swap(a: VarRef, b: VarRef) -> Box<MappedSymmetry> {
        Box::new(MappedSymmetry::new(Box::new(move |_, var, value| {
            if var == a {
                Some(Term::new(b, value))
            } else if var == b {
                Some(Term::new(a, value))
            } else {
                None
            }
        })))
    }

    #[test]
    fn test_refutation_posts_symmetric_clause() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let x = store.new_var(0, 3);
        let y = store.new_var(0, 3);
        let mut sym = SymmetryManager::new();
        sym.add(&mut store, swap(x, y));

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        ctx.store.save_state();
        let d1 = Decision::Assign { var: x, value: 1 };
        d1.apply(ctx.store).unwrap();
        sym.apply_decision(&mut ctx, &d1).unwrap();

        let d2 = Decision::Assign { var: y, value: 2 };
        d2.refute(ctx.store).unwrap();
        sym.refute_decision(&mut ctx, &d2).unwrap();
        assert_eq!(ctx.props.len(), 1);

        // once the recorded context holds (y == 1), the symmetric value is
        // removed from x
        ctx.store.set_value(y, 1).unwrap();
        propagate(ctx.store, ctx.props).unwrap();
        assert!(!ctx.store.contains(x, 2));
    }

    #[test]
    fn test_entailed_context_prunes_immediately() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let x = store.new_var(0, 3);
        let y = store.new_var(0, 3);
        let mut sym = SymmetryManager::new();
        sym.add(&mut store, swap(x, y));

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        let d1 = Decision::Assign { var: x, value: 1 };
        d1.apply(ctx.store).unwrap();
        sym.apply_decision(&mut ctx, &d1).unwrap();
        // the recorded image y == 1 is not yet entailed, so refuting y == 2
        // posts a clause rather than pruning
        let d2 = Decision::Assign { var: y, value: 2 };
        ctx.store.set_value(y, 1).unwrap();
        // now the context is entailed: the refutation prunes x directly
        sym.refute_decision(&mut ctx, &d2).unwrap();
        assert!(ctx.props.is_empty());
        assert!(!ctx.store.contains(x, 2));
    }

    #[test]
    fn test_impossible_context_is_vacuous() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let x = store.new_var(0, 3);
        let y = store.new_var(0, 3);
        let mut sym = SymmetryManager::new();
        sym.add(&mut store, swap(x, y));

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        let d1 = Decision::Assign { var: x, value: 1 };
        d1.apply(ctx.store).unwrap();
        sym.apply_decision(&mut ctx, &d1).unwrap();
        // the recorded image y == 1 becomes impossible
        ctx.store.remove_value(y, 1).unwrap();
        let d2 = Decision::Assign { var: y, value: 2 };
        sym.refute_decision(&mut ctx, &d2).unwrap();
        assert!(ctx.props.is_empty());
        assert!(ctx.store.contains(x, 2));
    }

    #[test]
    fn test_recorded_prefix_is_reversible() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let x = store.new_var(0, 3);
        let y = store.new_var(0, 3);
        let mut sym = SymmetryManager::new();
        sym.add(&mut store, swap(x, y));

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        ctx.store.save_state();
        let d1 = Decision::Assign { var: x, value: 1 };
        d1.apply(ctx.store).unwrap();
        sym.apply_decision(&mut ctx, &d1).unwrap();
        ctx.store.restore_last();

        // the record of x == 1 is gone: refuting y == 2 has an empty guard
        // and prunes immediately
        let d2 = Decision::Assign { var: y, value: 2 };
        sym.refute_decision(&mut ctx, &d2).unwrap();
        assert!(ctx.props.is_empty());
        assert!(!ctx.store.contains(x, 2));
    }
}
