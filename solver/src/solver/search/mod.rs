pub mod annealing;
pub mod builders;
pub mod collector;
pub mod gls;
pub mod limit;
pub mod monitor;
pub mod optimize;
pub mod restart;
pub mod symmetry;
pub mod tabu;
pub mod value_order;
pub mod var_order;

use crate::core::propagation::PropagatorSet;
use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::stats::Stats;

/// A reversible, two-sided choice point of the search tree.
///
/// `apply` takes the left branch, `refute` the right one. Refutation is the
/// exact logical complement of application restricted to the touched
/// variable, except for the `*OrFail` variants whose refutation is an
/// unconditional failure (used to commit irrevocably to one attempt).
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Decision {
    /// `var == value`; refuted as `var != value`.
    Assign { var: VarRef, value: IntCst },
    /// `var == value`; refutation fails the search at this node.
    AssignOrFail { var: VarRef, value: IntCst },
    /// `var <= pivot`; refuted as `var >= pivot + 1`.
    SplitLow { var: VarRef, pivot: IntCst },
    /// `var >= pivot + 1`; refuted as `var <= pivot`.
    SplitHigh { var: VarRef, pivot: IntCst },
    /// Binds a whole vector of variables at once; refutation fails.
    AssignAll { pairs: Vec<(VarRef, IntCst)> },
}

impl Decision {
    pub fn apply(&self, store: &mut Store) -> Result<(), Failure> {
        match *self {
            Decision::Assign { var, value } | Decision::AssignOrFail { var, value } => {
                store.set_value(var, value)?;
            }
            Decision::SplitLow { var, pivot } => {
                store.set_max(var, pivot)?;
            }
            Decision::SplitHigh { var, pivot } => {
                store.set_min(var, pivot + 1)?;
            }
            Decision::AssignAll { ref pairs } => {
                for &(var, value) in pairs {
                    store.set_value(var, value)?;
                }
            }
        }
        Ok(())
    }

    pub fn refute(&self, store: &mut Store) -> Result<(), Failure> {
        match *self {
            Decision::Assign { var, value } => {
                store.remove_value(var, value)?;
            }
            Decision::SplitLow { var, pivot } => {
                store.set_min(var, pivot + 1)?;
            }
            Decision::SplitHigh { var, pivot } => {
                store.set_max(var, pivot)?;
            }
            Decision::AssignOrFail { .. } | Decision::AssignAll { .. } => return Err(Failure),
        }
        Ok(())
    }

    /// The `(variable, value)` pair of an assignment decision.
    pub fn assignment(&self) -> Option<(VarRef, IntCst)> {
        match *self {
            Decision::Assign { var, value } | Decision::AssignOrFail { var, value } => Some((var, value)),
            _ => None,
        }
    }
}

/// View of the solver handed to decision builders and search monitors.
///
/// It exposes the shared reversible state (domains, posted propagators), the
/// monotonic counters, and the restart request channel. It deliberately does
/// not expose the monitor list: event dispatch is the engine's business.
pub struct SearchCtx<'a> {
    pub store: &'a mut Store,
    pub props: &'a mut PropagatorSet,
    pub stats: &'a mut Stats,
    restart_requested: &'a mut bool,
}

impl<'a> SearchCtx<'a> {
    pub fn new(
        store: &'a mut Store,
        props: &'a mut PropagatorSet,
        stats: &'a mut Stats,
        restart_requested: &'a mut bool,
    ) -> Self {
        SearchCtx {
            store,
            props,
            stats,
            restart_requested,
        }
    }

    /// Asks the engine to unwind to the base of the current run and restart.
    /// Takes effect at the next failure handling point.
    pub fn request_restart(&mut self) {
        *self.restart_requested = true;
    }

    pub fn restart_requested(&self) -> bool {
        *self.restart_requested
    }
}

/// Manufactures [Decision]s on demand.
///
/// Returning `Ok(None)` signals exhaustion at this level: there is nothing
/// left to branch on for this builder, which the engine treats as a solution
/// leaf (or hands over to the next builder in a composition).
/// The error channel lets a builder fail the current node, e.g. when a nested
/// solve finds no solution.
pub trait DecisionBuilder {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure>;
}
