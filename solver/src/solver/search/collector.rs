//! Solution snapshots and the monitors that collect them.

use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::SearchCtx;
use hashbrown::HashMap;
use std::time::Duration;

/// A scheduling interval, as a record of four integer variables.
/// `performed` is a 0/1 variable; the three temporal fields are only
/// meaningful when it is 1.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct IntervalVar {
    pub start: VarRef,
    pub duration: VarRef,
    pub end: VarRef,
    pub performed: VarRef,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct IntervalValue {
    pub start: IntCst,
    pub duration: IntCst,
    pub end: IntCst,
    pub performed: bool,
}

/// A (possibly partial) valuation of variables, frozen out of the store.
///
/// Collectors capture one per solution; metaheuristics use them as deltas
/// between candidate assignments.
#[derive(Clone, Debug, Default)]
pub struct Assignment {
    ints: HashMap<VarRef, IntCst>,
    intervals: Vec<(IntervalVar, IntervalValue)>,
    objective: Option<IntCst>,
    wall_time: Duration,
    branches: u64,
    failures: u64,
}

impl Assignment {
    pub fn new() -> Assignment {
        Assignment::default()
    }

    pub fn set(&mut self, var: VarRef, value: IntCst) {
        self.ints.insert(var, value);
    }

    pub fn get(&self, var: VarRef) -> Option<IntCst> {
        self.ints.get(&var).copied()
    }

    /// Value of a variable that is known to be recorded.
    pub fn value(&self, var: VarRef) -> IntCst {
        self.get(var).unwrap_or_else(|| panic!("{var:?} is not part of this assignment"))
    }

    pub fn interval_value(&self, interval: IntervalVar) -> IntervalValue {
        self.intervals
            .iter()
            .find(|(iv, _)| *iv == interval)
            .map(|&(_, v)| v)
            .unwrap_or_else(|| panic!("{interval:?} is not part of this assignment"))
    }

    pub fn objective(&self) -> Option<IntCst> {
        self.objective
    }

    pub fn set_objective(&mut self, value: IntCst) {
        self.objective = Some(value);
    }

    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    pub fn branches(&self) -> u64 {
        self.branches
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn num_vars(&self) -> usize {
        self.ints.len()
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarRef, IntCst)> + '_ {
        self.ints.iter().map(|(&v, &x)| (v, x))
    }

    pub fn clear(&mut self) {
        self.ints.clear();
        self.intervals.clear();
        self.objective = None;
    }

    /// Re-imposes every recorded value on the store.
    pub fn restore(&self, store: &mut Store) -> Result<(), Failure> {
        for (&var, &value) in &self.ints {
            store.set_value(var, value)?;
        }
        for &(iv, v) in &self.intervals {
            store.set_value(iv.performed, v.performed as IntCst)?;
            if v.performed {
                store.set_value(iv.start, v.start)?;
                store.set_value(iv.duration, v.duration)?;
                store.set_value(iv.end, v.end)?;
            }
        }
        Ok(())
    }
}

/// Declares which variables a collector snapshots.
#[derive(Clone, Default)]
struct Prototype {
    vars: Vec<VarRef>,
    intervals: Vec<IntervalVar>,
    objective: Option<VarRef>,
}

impl Prototype {
    /// Fills `out` with the current store values of the declared variables.
    /// All of them must be bound.
    fn capture(&self, out: &mut Assignment, store: &Store, ctx_branches: u64, ctx_failures: u64, wall: Duration) {
        out.clear();
        for &var in &self.vars {
            out.set(var, store.value(var));
        }
        for &iv in &self.intervals {
            let performed = store.value(iv.performed) != 0;
            out.intervals.push((
                iv,
                IntervalValue {
                    start: if performed { store.value(iv.start) } else { 0 },
                    duration: if performed { store.value(iv.duration) } else { 0 },
                    end: if performed { store.value(iv.end) } else { 0 },
                    performed,
                },
            ));
        }
        out.objective = self.objective.map(|obj| store.value(obj));
        out.branches = ctx_branches;
        out.failures = ctx_failures;
        out.wall_time = wall;
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Policy {
    /// Keep the first solution and stop the search.
    First,
    /// Keep only the most recent solution.
    Last,
    /// Keep every solution, in discovery order.
    All,
    /// Keep the solution with the best objective.
    Best { maximize: bool },
}

/// Records solutions reached during the search, according to its policy.
///
/// With the `first` policy the collector also stops the search; the other
/// policies vote to continue and leave termination to limits or exhaustion.
pub struct SolutionCollector {
    policy: Policy,
    prototype: Prototype,
    solutions: Vec<Assignment>,
    /// Discarded snapshots, recycled to avoid reallocating their tables.
    free: Vec<Assignment>,
}

impl SolutionCollector {
    fn new(policy: Policy) -> Self {
        SolutionCollector {
            policy,
            prototype: Prototype::default(),
            solutions: vec![],
            free: vec![],
        }
    }

    pub fn first() -> Self {
        Self::new(Policy::First)
    }

    pub fn last() -> Self {
        Self::new(Policy::Last)
    }

    pub fn all() -> Self {
        Self::new(Policy::All)
    }

    /// Keeps the solution minimizing (or maximizing) `objective`.
    pub fn best_value(maximize: bool, objective: VarRef) -> Self {
        let mut c = Self::new(Policy::Best { maximize });
        c.prototype.objective = Some(objective);
        c
    }

    pub fn add(&mut self, var: VarRef) -> &mut Self {
        self.prototype.vars.push(var);
        self
    }

    pub fn add_all(&mut self, vars: &[VarRef]) -> &mut Self {
        self.prototype.vars.extend_from_slice(vars);
        self
    }

    pub fn add_interval(&mut self, interval: IntervalVar) -> &mut Self {
        self.prototype.intervals.push(interval);
        self
    }

    pub fn set_objective(&mut self, objective: VarRef) -> &mut Self {
        self.prototype.objective = Some(objective);
        self
    }

    // ===================== accessors ========================

    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }

    pub fn solution(&self, n: usize) -> &Assignment {
        assert!(n < self.solutions.len(), "no solution #{n} (only {} collected)", self.solutions.len());
        &self.solutions[n]
    }

    pub fn value(&self, n: usize, var: VarRef) -> IntCst {
        self.solution(n).value(var)
    }

    pub fn start_value(&self, n: usize, interval: IntervalVar) -> IntCst {
        self.solution(n).interval_value(interval).start
    }

    pub fn duration_value(&self, n: usize, interval: IntervalVar) -> IntCst {
        self.solution(n).interval_value(interval).duration
    }

    pub fn end_value(&self, n: usize, interval: IntervalVar) -> IntCst {
        self.solution(n).interval_value(interval).end
    }

    pub fn performed_value(&self, n: usize, interval: IntervalVar) -> bool {
        self.solution(n).interval_value(interval).performed
    }

    pub fn objective_value(&self, n: usize) -> IntCst {
        self.solution(n)
            .objective()
            .unwrap_or_else(|| panic!("collector has no objective"))
    }

    pub fn wall_time(&self, n: usize) -> Duration {
        self.solution(n).wall_time()
    }

    pub fn branches(&self, n: usize) -> u64 {
        self.solution(n).branches()
    }

    pub fn failures(&self, n: usize) -> u64 {
        self.solution(n).failures()
    }

    // ===================== capture ========================

    fn capture(&mut self, ctx: &SearchCtx) -> Assignment {
        let mut out = self.free.pop().unwrap_or_default();
        self.prototype.capture(
            &mut out,
            ctx.store,
            ctx.stats.num_branches,
            ctx.stats.num_failures,
            ctx.stats.wall_time(),
        );
        out
    }

    fn discard(&mut self, a: Assignment) {
        self.free.push(a);
    }
}

impl SearchMonitor for SolutionCollector {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        while let Some(a) = self.solutions.pop() {
            self.free.push(a);
        }
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        match self.policy {
            Policy::First => {
                if self.solutions.is_empty() {
                    let a = self.capture(ctx);
                    self.solutions.push(a);
                }
                false
            }
            Policy::Last => {
                let a = self.capture(ctx);
                if let Some(old) = self.solutions.pop() {
                    self.discard(old);
                }
                self.solutions.push(a);
                true
            }
            Policy::All => {
                let a = self.capture(ctx);
                self.solutions.push(a);
                true
            }
            Policy::Best { maximize } => {
                let a = self.capture(ctx);
                let obj = a.objective().unwrap_or_else(|| panic!("best-value collector requires a bound objective"));
                let better = match self.solutions.first().and_then(|b| b.objective()) {
                    None => true,
                    Some(best) if maximize => obj > best,
                    Some(best) => obj < best,
                };
                if better {
                    if let Some(old) = self.solutions.pop() {
                        self.discard(old);
                    }
                    self.solutions.push(a);
                } else {
                    self.discard(a);
                }
                true
            }
        }
    }
}
