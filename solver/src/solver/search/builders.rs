//! Decision builders: the strategies that grow the search tree.
//!
//! A builder produces the next [Decision] for the engine, or `None` when it
//! has nothing left to branch on. Builders compose: [Compose] chains several
//! of them, and [SolveOnce] / [NestedOptimize] wrap a whole nested search as a
//! single opaque step of the outer tree.

use crate::core::propagation::propagate;
use crate::core::{Failure, IntCst, Store, TrailedInt, VarRef};
use crate::solver::run_search;
use crate::solver::search::collector::{Assignment, SolutionCollector};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::optimize::{Objective, OptimizeVar};
use crate::solver::search::value_order::{ValStrategy, ValueSelector};
use crate::solver::search::var_order::{VarStrategy, VariableSelector};
use crate::solver::search::{Decision, DecisionBuilder, SearchCtx};
use itertools::Itertools;

/// Cost of trying `var == value` in the current domains.
pub type Evaluator = Box<dyn Fn(&Store, VarRef, IntCst) -> IntCst>;

/// The workhorse builder: picks an unbound variable with its variable
/// selector, a value with its value selector, and branches `var == value`.
pub struct AssignVariables {
    var_sel: Box<dyn VariableSelector>,
    val_sel: Box<dyn ValueSelector>,
    or_fail: bool,
}

impl AssignVariables {
    pub fn new(var_sel: Box<dyn VariableSelector>, val_sel: Box<dyn ValueSelector>) -> Self {
        AssignVariables {
            var_sel,
            val_sel,
            or_fail: false,
        }
    }

    pub fn from_strategies(
        store: &mut Store,
        vars: Vec<VarRef>,
        var_strategy: VarStrategy,
        val_strategy: ValStrategy,
    ) -> Self {
        AssignVariables::new(var_strategy.build(store, vars), val_strategy.build())
    }

    /// Commits to the selected value: refuting the decision fails the node
    /// instead of trying another value.
    pub fn or_fail(mut self) -> Self {
        self.or_fail = true;
        self
    }
}

impl DecisionBuilder for AssignVariables {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        let Some(var) = self.var_sel.select(ctx.store) else {
            return Ok(None);
        };
        let value = self.val_sel.select(ctx.store, var);
        let decision = if self.or_fail {
            Decision::AssignOrFail { var, value }
        } else {
            Decision::Assign { var, value }
        };
        Ok(Some(decision))
    }
}

/// Chains several builders: each one runs until exhausted, then the next
/// takes over. The hand-over point is trailed, so an exhausted builder is
/// never consulted again within the subtree where it was passed.
pub struct Compose {
    builders: Vec<Box<dyn DecisionBuilder>>,
    /// Index of the first possibly-unexhausted builder.
    start: TrailedInt,
}

impl Compose {
    pub fn new(store: &mut Store, builders: Vec<Box<dyn DecisionBuilder>>) -> Self {
        let start = store.new_trailed_int(0);
        Compose { builders, start }
    }
}

impl DecisionBuilder for Compose {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        let mut i = ctx.store.get_int(self.start) as usize;
        while i < self.builders.len() {
            if let Some(d) = self.builders[i].next(ctx)? {
                return Ok(Some(d));
            }
            i += 1;
            ctx.store.set_int(self.start, i as IntCst);
        }
        Ok(None)
    }
}

/// Runs a nested search to its first solution and commits the values of
/// `vars` at the current level, as a single step of the outer tree.
/// The step fails if the subproblem has no solution.
pub struct SolveOnce {
    builder: Box<dyn DecisionBuilder>,
    vars: Vec<VarRef>,
    /// Monitors of the nested runs, typically limits.
    monitors: Vec<Box<dyn SearchMonitor>>,
}

impl SolveOnce {
    pub fn new(builder: Box<dyn DecisionBuilder>, vars: Vec<VarRef>) -> Self {
        SolveOnce {
            builder,
            vars,
            monitors: vec![],
        }
    }

    pub fn with_monitor(mut self, monitor: Box<dyn SearchMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

impl DecisionBuilder for SolveOnce {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        if self.vars.iter().all(|&v| ctx.store.is_bound(v)) {
            // already committed on this path
            return Ok(None);
        }
        let mut collector = SolutionCollector::first();
        collector.add_all(&self.vars);
        let mut monitors: Vec<&mut dyn SearchMonitor> = vec![&mut collector];
        for m in self.monitors.iter_mut() {
            monitors.push(m.as_mut());
        }
        run_search(ctx.store, ctx.props, ctx.stats, self.builder.as_mut(), &mut monitors);
        if collector.solution_count() == 0 {
            return Err(Failure);
        }
        collector.solution(0).restore(ctx.store)?;
        propagate(ctx.store, ctx.props)?;
        Ok(None)
    }
}

/// Runs a nested branch-and-bound search and commits the values of `vars`
/// from the best solution found, as a single step of the outer tree.
/// The step fails if the subproblem has no solution at all.
///
/// The objective variable must be part of `vars` for its value to be
/// committed along with the rest.
pub struct NestedOptimize {
    builder: Box<dyn DecisionBuilder>,
    vars: Vec<VarRef>,
    objective: Objective,
    monitors: Vec<Box<dyn SearchMonitor>>,
}

impl NestedOptimize {
    pub fn new(builder: Box<dyn DecisionBuilder>, vars: Vec<VarRef>, objective: Objective) -> Self {
        NestedOptimize {
            builder,
            vars,
            objective,
            monitors: vec![],
        }
    }

    pub fn with_monitor(mut self, monitor: Box<dyn SearchMonitor>) -> Self {
        self.monitors.push(monitor);
        self
    }
}

impl DecisionBuilder for NestedOptimize {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        if self.vars.iter().all(|&v| ctx.store.is_bound(v)) {
            return Ok(None);
        }
        let mut optimize = OptimizeVar::new(self.objective);
        let mut collector = SolutionCollector::best_value(self.objective.maximize, self.objective.var);
        collector.add_all(&self.vars);
        let mut monitors: Vec<&mut dyn SearchMonitor> = vec![&mut optimize, &mut collector];
        for m in self.monitors.iter_mut() {
            monitors.push(m.as_mut());
        }
        run_search(ctx.store, ctx.props, ctx.stats, self.builder.as_mut(), &mut monitors);
        if collector.solution_count() == 0 {
            return Err(Failure);
        }
        collector.solution(0).restore(ctx.store)?;
        propagate(ctx.store, ctx.props)?;
        Ok(None)
    }
}

/// Replays a reference assignment: the prefix variables are bound to their
/// recorded values, in order, before handing over to the fallback builder.
///
/// A prefix variable whose recorded value is no longer in its domain is
/// skipped and left to the fallback, so refuting a replayed decision makes
/// progress instead of retrying it.
pub struct AssignVariablesFromAssignment {
    assignment: Assignment,
    prefix: Vec<VarRef>,
    cursor: TrailedInt,
    fallback: Box<dyn DecisionBuilder>,
}

impl AssignVariablesFromAssignment {
    pub fn new(
        store: &mut Store,
        assignment: Assignment,
        prefix: Vec<VarRef>,
        fallback: Box<dyn DecisionBuilder>,
    ) -> Self {
        let cursor = store.new_trailed_int(0);
        for &var in &prefix {
            assert!(assignment.get(var).is_some(), "{var:?} has no recorded value to replay");
        }
        AssignVariablesFromAssignment {
            assignment,
            prefix,
            cursor,
            fallback,
        }
    }
}

impl DecisionBuilder for AssignVariablesFromAssignment {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        let mut i = ctx.store.get_int(self.cursor) as usize;
        while i < self.prefix.len() {
            let var = self.prefix[i];
            let value = self.assignment.value(var);
            if !ctx.store.is_bound(var) && ctx.store.contains(var, value) {
                return Ok(Some(Decision::Assign { var, value }));
            }
            i += 1;
            ctx.store.set_int(self.cursor, i as IntCst);
        }
        self.fallback.next(ctx)
    }
}

/// Branches on the `(variable, value)` pair of minimum cost, re-evaluating
/// every candidate pair against the current domains at each node.
pub struct DynamicEvaluatorBuilder {
    vars: Vec<VarRef>,
    eval: Evaluator,
}

impl DynamicEvaluatorBuilder {
    pub fn new(vars: Vec<VarRef>, eval: Evaluator) -> Self {
        DynamicEvaluatorBuilder { vars, eval }
    }
}

impl DecisionBuilder for DynamicEvaluatorBuilder {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        let store = &*ctx.store;
        let mut best: Option<(IntCst, VarRef, IntCst)> = None;
        for &var in &self.vars {
            if store.is_bound(var) {
                continue;
            }
            for value in store.domain_values(var) {
                let cost = (self.eval)(store, var, value);
                // strict comparison: ties go to the earliest pair in scope order
                if best.is_none_or(|(c, _, _)| cost < c) {
                    best = Some((cost, var, value));
                }
            }
        }
        Ok(best.map(|(_, var, value)| Decision::Assign { var, value }))
    }
}

/// Branches on `(variable, value)` pairs in the order of their cost against
/// the root domains, computed once on the first call.
///
/// A trailed cursor walks the sorted pairs and skips the stale ones (bound
/// variable or removed value); backtracking rewinds it, so a pair skipped
/// deep in the tree is reconsidered where it is valid again.
pub struct StaticEvaluatorBuilder {
    vars: Vec<VarRef>,
    eval: Evaluator,
    /// `(cost, scope index, value)`, sorted; filled on first use.
    pairs: Option<Vec<(IntCst, usize, IntCst)>>,
    cursor: TrailedInt,
}

impl StaticEvaluatorBuilder {
    pub fn new(store: &mut Store, vars: Vec<VarRef>, eval: Evaluator) -> Self {
        let cursor = store.new_trailed_int(0);
        StaticEvaluatorBuilder {
            vars,
            eval,
            pairs: None,
            cursor,
        }
    }
}

impl DecisionBuilder for StaticEvaluatorBuilder {
    fn next(&mut self, ctx: &mut SearchCtx) -> Result<Option<Decision>, Failure> {
        if self.pairs.is_none() {
            let store = &*ctx.store;
            let pairs = self
                .vars
                .iter()
                .enumerate()
                .flat_map(|(i, &var)| {
                    let eval = &self.eval;
                    store.domain_values(var).map(move |v| (eval(store, var, v), i, v))
                })
                .sorted_unstable()
                .collect_vec();
            self.pairs = Some(pairs);
        }
        let pairs = self.pairs.as_ref().unwrap();
        let mut i = ctx.store.get_int(self.cursor) as usize;
        while i < pairs.len() {
            let (_, scope_idx, value) = pairs[i];
            let var = self.vars[scope_idx];
            if !ctx.store.is_bound(var) && ctx.store.contains(var, value) {
                return Ok(Some(Decision::Assign { var, value }));
            }
            i += 1;
            ctx.store.set_int(self.cursor, i as IntCst);
        }
        Ok(None)
    }
}
