//! Guided local search metaheuristic.
//!
//! At every local optimum the monitor penalizes the assignment features with
//! the highest utility `cost / (1 + penalty)`, then lets the next run trade
//! objective quality against accumulated penalties: a candidate is acceptable
//! when it improves the penalty-augmented objective of the last solution, or
//! beats the best solution outright.

use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::search::collector::Assignment;
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::optimize::Objective;
use crate::solver::search::SearchCtx;
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;

/// Per-feature penalty counters, keyed by `(variable, value)`.
pub trait PenaltyTable {
    fn get(&self, var: VarRef, value: IntCst) -> IntCst;
    /// Increments the penalty of one feature by one.
    fn add(&mut self, var: VarRef, value: IntCst);
    fn reset(&mut self);
    fn is_empty(&self) -> bool;
}

/// Flat table over the initial domains; O(1) access, memory proportional to
/// the sum of the domain widths.
pub struct DensePenaltyTable {
    rows: HashMap<VarRef, (IntCst, usize, usize)>,
    table: Vec<IntCst>,
    touched: bool,
}

impl DensePenaltyTable {
    pub fn new(store: &Store, vars: &[VarRef]) -> Self {
        let mut rows = HashMap::with_capacity(vars.len());
        let mut size = 0usize;
        for &var in vars {
            let width = (store.max(var) - store.min(var) + 1) as usize;
            rows.insert(var, (store.min(var), size, width));
            size += width;
        }
        DensePenaltyTable {
            rows,
            table: vec![0; size],
            touched: false,
        }
    }

    fn index(&self, var: VarRef, value: IntCst) -> Option<usize> {
        let &(lb, start, width) = self.rows.get(&var)?;
        let offset = value - lb;
        if offset < 0 || offset as usize >= width {
            return None;
        }
        Some(start + offset as usize)
    }
}

impl PenaltyTable for DensePenaltyTable {
    fn get(&self, var: VarRef, value: IntCst) -> IntCst {
        self.index(var, value).map_or(0, |i| self.table[i])
    }

    fn add(&mut self, var: VarRef, value: IntCst) {
        if let Some(i) = self.index(var, value) {
            self.table[i] += 1;
            self.touched = true;
        }
    }

    fn reset(&mut self) {
        self.table.fill(0);
        self.touched = false;
    }

    fn is_empty(&self) -> bool {
        !self.touched
    }
}

/// Hash-backed table with a bitmap of penalized variables, for scopes whose
/// domains are too wide to materialize.
pub struct SparsePenaltyTable {
    penalties: HashMap<(VarRef, IntCst), IntCst>,
    /// Variables with at least one penalized value.
    penalized_vars: FixedBitSet,
}

impl SparsePenaltyTable {
    pub fn new(num_vars: usize) -> Self {
        SparsePenaltyTable {
            penalties: HashMap::new(),
            penalized_vars: FixedBitSet::with_capacity(num_vars),
        }
    }
}

impl PenaltyTable for SparsePenaltyTable {
    fn get(&self, var: VarRef, value: IntCst) -> IntCst {
        if !self.penalized_vars.contains(var.to_index()) {
            return 0;
        }
        self.penalties.get(&(var, value)).copied().unwrap_or(0)
    }

    fn add(&mut self, var: VarRef, value: IntCst) {
        *self.penalties.entry((var, value)).or_insert(0) += 1;
        self.penalized_vars.grow(var.to_index() + 1);
        self.penalized_vars.insert(var.to_index());
    }

    fn reset(&mut self) {
        self.penalties.clear();
        self.penalized_vars.clear();
    }

    fn is_empty(&self) -> bool {
        self.penalties.is_empty()
    }
}

#[derive(Copy, Clone, Debug)]
pub struct GlsConfig {
    /// Weight of one penalty unit in the augmented objective.
    pub penalty_factor: IntCst,
    pub use_sparse_penalties: bool,
}

impl Default for GlsConfig {
    fn default() -> Self {
        GlsConfig {
            penalty_factor: 1,
            use_sparse_penalties: false,
        }
    }
}

pub struct GuidedLocalSearch {
    objective: Objective,
    vars: Vec<VarRef>,
    /// Cost of assigning `value` to `var`, the feature cost of GLS.
    ///
    /// Higher-arity cost structures (e.g. routing arcs priced by the pair of
    /// adjacent nodes) are expressed by capturing the extra operands in the
    /// closure; materializing the penalized costs as constraints is the
    /// propagation engine's job, not this monitor's.
    cost: Box<dyn Fn(VarRef, IntCst) -> IntCst>,
    penalties: Box<dyn PenaltyTable>,
    factor: IntCst,
    current: Option<IntCst>,
    best: Option<IntCst>,
    last: HashMap<VarRef, IntCst>,
}

impl GuidedLocalSearch {
    pub fn new(
        store: &Store,
        objective: Objective,
        vars: Vec<VarRef>,
        cost: Box<dyn Fn(VarRef, IntCst) -> IntCst>,
        config: GlsConfig,
    ) -> Self {
        assert!(config.penalty_factor > 0, "penalty factor must be positive");
        let penalties: Box<dyn PenaltyTable> = if config.use_sparse_penalties {
            Box::new(SparsePenaltyTable::new(store.num_vars()))
        } else {
            Box::new(DensePenaltyTable::new(store, &vars))
        };
        GuidedLocalSearch {
            objective,
            vars,
            cost,
            penalties,
            factor: config.penalty_factor,
            current: None,
            best: None,
            last: HashMap::new(),
        }
    }

    pub fn best_value(&self) -> Option<IntCst> {
        self.best
    }

    pub fn penalty(&self, var: VarRef, value: IntCst) -> IntCst {
        self.penalties.get(var, value)
    }

    /// Penalty mass of the recorded solution, scaled by the factor.
    fn penalized(&self) -> IntCst {
        self.last
            .iter()
            .map(|(&var, &value)| self.penalties.get(var, value))
            .sum::<IntCst>()
            * self.factor
    }

    fn penalty_of(&self, assignment: &Assignment) -> IntCst {
        assignment
            .vars()
            .map(|(var, value)| self.penalties.get(var, value))
            .sum::<IntCst>()
            * self.factor
    }
}

impl SearchMonitor for GuidedLocalSearch {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.penalties.reset();
        self.current = None;
        self.best = None;
        self.last.clear();
    }

    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        let (Some(current), Some(best)) = (self.current, self.best) else {
            return Ok(());
        };
        // acceptable: improve the augmented objective of the last solution,
        // or beat the best solution outright
        let augmented = self.objective.improved(current.saturating_add(if self.objective.maximize {
            -self.penalized()
        } else {
            self.penalized()
        }));
        let aspiration = self.objective.improved(best);
        if self.objective.maximize {
            ctx.store.set_min(self.objective.var, augmented.min(aspiration))?;
        } else {
            ctx.store.set_max(self.objective.var, augmented.max(aspiration))?;
        }
        Ok(())
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        for &var in &self.vars {
            self.last.insert(var, ctx.store.value(var));
        }
        let value = self.objective.value(ctx.store);
        self.current = Some(value);
        match self.best {
            Some(best) if !self.objective.is_better(value, best) => {}
            _ => self.best = Some(value),
        }
        true
    }

    /// Penalizes every maximum-utility feature of the last solution, where
    /// the utility of a feature is `cost / (1 + penalty)`.
    fn local_optimum(&mut self, _ctx: &mut SearchCtx) -> bool {
        if self.last.is_empty() {
            return false;
        }
        // compare utilities by cross multiplication to stay in integers
        let utility = |this: &Self, var: VarRef, value: IntCst| {
            ((this.cost)(var, value), 1 + this.penalties.get(var, value))
        };
        let mut winners: Vec<(VarRef, IntCst)> = vec![];
        let mut best: Option<(IntCst, IntCst)> = None;
        for (&var, &value) in &self.last {
            let (c, d) = utility(self, var, value);
            match best {
                None => {
                    best = Some((c, d));
                    winners.push((var, value));
                }
                Some((bc, bd)) => {
                    let lhs = c.checked_mul(bd).unwrap_or_else(|| panic!("feature cost overflow"));
                    let rhs = bc.checked_mul(d).unwrap_or_else(|| panic!("feature cost overflow"));
                    if lhs > rhs {
                        best = Some((c, d));
                        winners.clear();
                        winners.push((var, value));
                    } else if lhs == rhs {
                        winners.push((var, value));
                    }
                }
            }
        }
        for (var, value) in winners {
            self.penalties.add(var, value);
        }
        true
    }

    /// Compares the penalty-augmented objective of a candidate move against
    /// the last solution. Invoked by an external neighborhood driver, not by
    /// the engine. The penalty mass of both sides is recomputed in full on
    /// every call (cost proportional to the delta and scope sizes);
    /// `deltadelta` is unused.
    fn accept_delta(&mut self, _ctx: &mut SearchCtx, delta: &Assignment, _deltadelta: &Assignment) -> bool {
        let (Some(obj), Some(current)) = (delta.objective(), self.current) else {
            return true;
        };
        if self.objective.maximize {
            obj.saturating_sub(self.penalty_of(delta)) > current.saturating_sub(self.penalized())
        } else {
            obj.saturating_add(self.penalty_of(delta)) < current.saturating_add(self.penalized())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtrack::Backtrack;
    use crate::core::propagation::PropagatorSet;
    use crate::solver::stats::Stats;

    fn setup(use_sparse: bool) -> (Store, GuidedLocalSearch, Vec<VarRef>, VarRef) {
        let mut store = Store::new();
        let vars: Vec<_> = (0..3).map(|_| store.new_var(0, 9)).collect();
        let obj = store.new_var(0, 1000);
        // the feature cost of assigning v to any variable is v itself
        let gls = GuidedLocalSearch::new(
            &store,
            Objective::minimize(obj),
            vars.clone(),
            Box::new(|_, value| value),
            GlsConfig {
                penalty_factor: 2,
                use_sparse_penalties: use_sparse,
            },
        );
        (store, gls, vars, obj)
    }

    fn reach_solution(
        gls: &mut GuidedLocalSearch,
        ctx: &mut SearchCtx,
        values: &[(VarRef, IntCst)],
        obj: (VarRef, IntCst),
    ) {
        ctx.store.save_state();
        for &(var, value) in values {
            ctx.store.set_value(var, value).unwrap();
        }
        ctx.store.set_value(obj.0, obj.1).unwrap();
        assert!(gls.at_solution(ctx));
        ctx.store.restore_last();
    }

    #[test]
    fn test_penalty_grows_one_per_local_optimum() {
        for use_sparse in [false, true] {
            let (mut store, mut gls, vars, obj) = setup(use_sparse);
            let mut props = PropagatorSet::new();
            let mut stats = Stats::new();
            let mut restart = false;
            let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
            gls.enter_search(&mut ctx);
            reach_solution(&mut gls, &mut ctx, &[(vars[0], 9), (vars[1], 1), (vars[2], 1)], (obj, 11));

            // vars[0] == 9 is the highest-cost feature: penalized first
            assert!(gls.local_optimum(&mut ctx));
            assert_eq!(gls.penalty(vars[0], 9), 1);
            assert_eq!(gls.penalty(vars[1], 1), 0);

            // its utility halves but stays the highest: penalized again
            assert!(gls.local_optimum(&mut ctx));
            assert_eq!(gls.penalty(vars[0], 9), 2);
        }
    }

    #[test]
    fn test_restart_bound_accounts_for_penalties() {
        let (mut store, mut gls, vars, obj) = setup(false);
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        gls.enter_search(&mut ctx);
        reach_solution(&mut gls, &mut ctx, &[(vars[0], 9), (vars[1], 1), (vars[2], 1)], (obj, 11));
        gls.local_optimum(&mut ctx);

        ctx.store.save_state();
        gls.restart_search(&mut ctx).unwrap();
        // augmented bound: current 11 - step 1 + factor 2 * penalty 1 = 12
        assert_eq!(ctx.store.max(obj), 12);
        ctx.store.restore_last();
    }

    #[test]
    fn test_ties_are_all_penalized() {
        let (mut store, mut gls, vars, obj) = setup(false);
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        gls.enter_search(&mut ctx);
        reach_solution(&mut gls, &mut ctx, &[(vars[0], 5), (vars[1], 5), (vars[2], 2)], (obj, 12));

        gls.local_optimum(&mut ctx);
        assert_eq!(gls.penalty(vars[0], 5), 1);
        assert_eq!(gls.penalty(vars[1], 5), 1);
        assert_eq!(gls.penalty(vars[2], 2), 0);
    }

    #[test]
    fn test_accept_delta_uses_augmented_objective() {
        let (mut store, mut gls, vars, obj) = setup(false);
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        gls.enter_search(&mut ctx);
        reach_solution(&mut gls, &mut ctx, &[(vars[0], 9), (vars[1], 1), (vars[2], 1)], (obj, 11));
        gls.local_optimum(&mut ctx); // penalizes (vars[0], 9)

        let empty = Assignment::new();

        // reference augmented cost: 11 + 2
        // keeping the penalized feature: 11 + 2, no improvement
        let mut same = Assignment::new();
        same.set(vars[0], 9);
        same.set_objective(11);
        assert!(!gls.accept_delta(&mut ctx, &same, &empty));

        // dropping it: 11 + 0 improves on 11 + 2
        let mut moved = Assignment::new();
        moved.set(vars[0], 3);
        moved.set_objective(11);
        assert!(gls.accept_delta(&mut ctx, &moved, &empty));
    }
}
