//! Branch-and-bound objective monitors.

use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::{Decision, SearchCtx};

/// Optimization direction, objective variable and improvement step.
///
/// Shared by [OptimizeVar] and the metaheuristics, which all reason in terms
/// of "strictly better by at least `step`".
#[derive(Copy, Clone, Debug)]
pub struct Objective {
    pub var: VarRef,
    pub maximize: bool,
    pub step: IntCst,
}

impl Objective {
    pub fn new(var: VarRef, maximize: bool, step: IntCst) -> Objective {
        assert!(step > 0, "improvement step must be positive, got {step}");
        Objective { var, maximize, step }
    }

    pub fn minimize(var: VarRef) -> Objective {
        Self::new(var, false, 1)
    }

    pub fn maximize(var: VarRef) -> Objective {
        Self::new(var, true, 1)
    }

    /// Value of the (bound) objective variable.
    pub fn value(&self, store: &Store) -> IntCst {
        store.value(self.var)
    }

    pub fn is_better(&self, a: IntCst, b: IntCst) -> bool {
        if self.maximize {
            a > b
        } else {
            a < b
        }
    }

    /// The loosest value still considered an improvement over `v`.
    pub fn improved(&self, v: IntCst) -> IntCst {
        if self.maximize {
            v + self.step
        } else {
            v - self.step
        }
    }

    /// Constrains the objective to be at least as good as `target`.
    pub fn apply_bound(&self, store: &mut Store, target: IntCst) -> Result<bool, Failure> {
        if self.maximize {
            store.set_min(self.var, target)
        } else {
            store.set_max(self.var, target)
        }
    }
}

/// Turns the search into branch and bound: each solution must improve on the
/// previous one by at least `step`, enforced by tightening the objective
/// domain on every refutation and restart.
pub struct OptimizeVar {
    obj: Objective,
    best: Option<IntCst>,
}

impl OptimizeVar {
    pub fn new(obj: Objective) -> Self {
        OptimizeVar { obj, best: None }
    }

    pub fn objective(&self) -> &Objective {
        &self.obj
    }

    /// Best objective value reached so far in this run, if any.
    pub fn best_value(&self) -> Option<IntCst> {
        self.best
    }

    fn apply_bound(&self, store: &mut Store) -> Result<(), Failure> {
        if let Some(best) = self.best {
            self.obj.apply_bound(store, self.obj.improved(best))?;
        }
        Ok(())
    }
}

impl SearchMonitor for OptimizeVar {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.best = None;
    }

    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        self.apply_bound(ctx.store)
    }

    fn refute_decision(&mut self, ctx: &mut SearchCtx, _decision: &Decision) -> Result<(), Failure> {
        self.apply_bound(ctx.store)
    }

    fn accept_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let value = self.obj.value(ctx.store);
        match self.best {
            None => true,
            Some(best) => self.obj.is_better(value, self.obj.improved(best)) || value == self.obj.improved(best),
        }
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let value = self.obj.value(ctx.store);
        if let Some(best) = self.best {
            assert!(
                self.obj.is_better(value, best),
                "non-improving solution reached the objective monitor: {value} vs best {best}"
            );
        }
        self.best = Some(value);
        // keep searching for a better one
        true
    }
}

/// [OptimizeVar] over a linear combination of sub-objectives.
///
/// The composite variable is supplied by the caller (the constraint layer
/// owns the arithmetic); this monitor only verifies at each solution that it
/// matches the weighted sum, with overflow treated as a modelling error.
pub struct WeightedOptimizeVar {
    inner: OptimizeVar,
    sub_objectives: Vec<VarRef>,
    weights: Vec<IntCst>,
}

impl WeightedOptimizeVar {
    pub fn new(obj: Objective, sub_objectives: Vec<VarRef>, weights: Vec<IntCst>) -> Self {
        assert_eq!(
            sub_objectives.len(),
            weights.len(),
            "one weight per sub-objective expected"
        );
        WeightedOptimizeVar {
            inner: OptimizeVar::new(obj),
            sub_objectives,
            weights,
        }
    }

    pub fn best_value(&self) -> Option<IntCst> {
        self.inner.best_value()
    }

    fn weighted_sum(&self, store: &Store) -> IntCst {
        self.sub_objectives
            .iter()
            .zip(&self.weights)
            .map(|(&var, &w)| {
                store
                    .value(var)
                    .checked_mul(w)
                    .unwrap_or_else(|| panic!("weighted objective overflow on {var:?}"))
            })
            .try_fold(0 as IntCst, IntCst::checked_add)
            .unwrap_or_else(|| panic!("weighted objective overflow"))
    }
}

impl SearchMonitor for WeightedOptimizeVar {
    fn enter_search(&mut self, ctx: &mut SearchCtx) {
        self.inner.enter_search(ctx);
    }

    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        self.inner.restart_search(ctx)
    }

    fn refute_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        self.inner.refute_decision(ctx, decision)
    }

    fn accept_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        self.inner.accept_solution(ctx)
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let composite = self.inner.obj.value(ctx.store);
        let sum = self.weighted_sum(ctx.store);
        assert_eq!(
            composite, sum,
            "composite objective out of sync with its weighted sum"
        );
        self.inner.at_solution(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::propagation::PropagatorSet;
    use crate::core::Store;
    use crate::solver::stats::Stats;

    #[test]
    fn test_bound_tightens_on_refutation() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let obj = store.new_var(0, 100);
        let mut opt = OptimizeVar::new(Objective::minimize(obj));
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        opt.enter_search(&mut ctx);

        // first solution at 40
        ctx.store.save_state();
        ctx.store.set_value(obj, 40).unwrap();
        assert!(opt.accept_solution(&mut ctx));
        assert!(opt.at_solution(&mut ctx));
        ctx.store.restore_last();

        let d = Decision::Assign { var: obj, value: 40 };
        opt.refute_decision(&mut ctx, &d).unwrap();
        assert_eq!(ctx.store.max(obj), 39);
        assert_eq!(opt.best_value(), Some(40));
    }

    #[test]
    fn test_refutation_fails_when_no_improvement_possible() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let obj = store.new_var(10, 100);
        let mut opt = OptimizeVar::new(Objective::minimize(obj));
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        opt.enter_search(&mut ctx);

        ctx.store.set_value(obj, 10).unwrap();
        assert!(opt.at_solution(&mut ctx));
        // the optimum was reached: bounding below 10 empties the domain
        let d = Decision::Assign { var: obj, value: 10 };
        assert_eq!(opt.refute_decision(&mut ctx, &d), Err(Failure));
    }

    #[test]
    fn test_maximize_with_larger_step() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let obj = store.new_var(0, 100);
        let mut opt = OptimizeVar::new(Objective::new(obj, true, 5));
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        opt.enter_search(&mut ctx);

        ctx.store.save_state();
        ctx.store.set_value(obj, 50).unwrap();
        assert!(opt.at_solution(&mut ctx));
        ctx.store.restore_last();

        let d = Decision::Assign { var: obj, value: 50 };
        opt.refute_decision(&mut ctx, &d).unwrap();
        assert_eq!(ctx.store.min(obj), 55);
    }

    #[test]
    fn test_weighted_sum_checked_at_solution() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let a = store.new_var(0, 10);
        let b = store.new_var(0, 10);
        let composite = store.new_var(0, 100);
        let mut opt =
            WeightedOptimizeVar::new(Objective::minimize(composite), vec![a, b], vec![2, 3]);
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        opt.enter_search(&mut ctx);

        ctx.store.set_value(a, 2).unwrap();
        ctx.store.set_value(b, 4).unwrap();
        ctx.store.set_value(composite, 16).unwrap();
        assert!(opt.at_solution(&mut ctx));
        assert_eq!(opt.best_value(), Some(16));
    }
}
