use crate::backtrack::Backtrack;
use crate::core::{Failure, VarRef};
use crate::solver::search::collector::Assignment;
use crate::solver::search::{Decision, SearchCtx};

/// Observer of the search, notified of every search-tree event.
///
/// All methods have default no-op implementations; concrete monitors override
/// only what they need. Monitors are invoked synchronously and in
/// registration order. Any hook fired inside the search may force a
/// solver-level failure by returning `Err(Failure)`.
#[allow(unused_variables)]
pub trait SearchMonitor {
    /// Beginning of a run. Monitors reset their per-run state here.
    fn enter_search(&mut self, ctx: &mut SearchCtx) {}

    /// The engine unwound to the base of the run and starts over.
    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        Ok(())
    }

    /// End of a run. Fired exactly once, after `no_more_solutions` when the
    /// tree was exhausted.
    fn exit_search(&mut self, ctx: &mut SearchCtx) {}

    /// Before the decision builder is asked for the next decision.
    fn begin_next_decision(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        Ok(())
    }

    /// After the decision builder produced `decision` (None = exhausted).
    fn end_next_decision(&mut self, ctx: &mut SearchCtx, decision: Option<&Decision>) {}

    /// Before a decision is applied (left branch).
    fn apply_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        Ok(())
    }

    /// Before a decision is refuted (right branch).
    fn refute_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        Ok(())
    }

    /// After a branch was taken and propagation succeeded.
    /// `applied` distinguishes the left branch from the right one.
    fn after_decision(&mut self, ctx: &mut SearchCtx, decision: &Decision, applied: bool) {}

    /// A failure was raised and is about to be handled.
    fn begin_fail(&mut self, ctx: &mut SearchCtx) {}

    /// The failure bookkeeping is done; backtracking follows.
    fn end_fail(&mut self, ctx: &mut SearchCtx) {}

    fn begin_initial_propagation(&mut self, ctx: &mut SearchCtx) {}

    fn end_initial_propagation(&mut self, ctx: &mut SearchCtx) {}

    /// A candidate leaf was reached. Returning `false` rejects it: the leaf
    /// is not counted as a solution and the search backtracks.
    /// The engine ANDs the answers of all monitors.
    fn accept_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        true
    }

    /// An accepted solution was found. Returning `true` asks the engine to
    /// resume the search for further solutions; the engine ORs the answers of
    /// all monitors.
    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        false
    }

    /// The whole tree (bounded by the active limits) was exhausted.
    fn no_more_solutions(&mut self, ctx: &mut SearchCtx) {}

    /// A local-search run reached a local optimum. Returning `true` asks for
    /// the local search to continue (e.g. after penalizing or reheating).
    fn local_optimum(&mut self, ctx: &mut SearchCtx) -> bool {
        false
    }

    /// Incremental acceptance test of a candidate move, given the `delta`
    /// from the last accepted assignment and the `deltadelta` from the
    /// previously evaluated candidate.
    fn accept_delta(&mut self, ctx: &mut SearchCtx, delta: &Assignment, deltadelta: &Assignment) -> bool {
        true
    }

    /// A neighbor was accepted by all monitors.
    fn accept_neighbor(&mut self, ctx: &mut SearchCtx) {}

    /// Hook fired from high-frequency points (before each decision and on
    /// each refutation) so that budget enforcement stays cheap.
    fn periodic_check(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        Ok(())
    }
}

/// Logs every single search event, verbatim, for debugging.
pub struct SearchTrace {
    prefix: String,
}

impl SearchTrace {
    pub fn new(prefix: impl Into<String>) -> Self {
        SearchTrace { prefix: prefix.into() }
    }
}

impl SearchMonitor for SearchTrace {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} EnterSearch", self.prefix);
    }
    fn restart_search(&mut self, _ctx: &mut SearchCtx) -> Result<(), Failure> {
        tracing::debug!("{} RestartSearch", self.prefix);
        Ok(())
    }
    fn exit_search(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} ExitSearch", self.prefix);
    }
    fn begin_next_decision(&mut self, _ctx: &mut SearchCtx) -> Result<(), Failure> {
        tracing::debug!("{} BeginNextDecision", self.prefix);
        Ok(())
    }
    fn end_next_decision(&mut self, _ctx: &mut SearchCtx, decision: Option<&Decision>) {
        tracing::debug!("{} EndNextDecision {:?}", self.prefix, decision);
    }
    fn apply_decision(&mut self, _ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        tracing::debug!("{} ApplyDecision {:?}", self.prefix, decision);
        Ok(())
    }
    fn refute_decision(&mut self, _ctx: &mut SearchCtx, decision: &Decision) -> Result<(), Failure> {
        tracing::debug!("{} RefuteDecision {:?}", self.prefix, decision);
        Ok(())
    }
    fn after_decision(&mut self, _ctx: &mut SearchCtx, decision: &Decision, applied: bool) {
        tracing::debug!("{} AfterDecision {:?} applied={}", self.prefix, decision, applied);
    }
    fn begin_fail(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} BeginFail", self.prefix);
    }
    fn end_fail(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} EndFail", self.prefix);
    }
    fn begin_initial_propagation(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} BeginInitialPropagation", self.prefix);
    }
    fn end_initial_propagation(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} EndInitialPropagation", self.prefix);
    }
    fn accept_solution(&mut self, _ctx: &mut SearchCtx) -> bool {
        tracing::debug!("{} AcceptSolution", self.prefix);
        true
    }
    fn at_solution(&mut self, _ctx: &mut SearchCtx) -> bool {
        tracing::debug!("{} AtSolution", self.prefix);
        false
    }
    fn no_more_solutions(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} NoMoreSolutions", self.prefix);
    }
    fn local_optimum(&mut self, _ctx: &mut SearchCtx) -> bool {
        tracing::debug!("{} LocalOptimum", self.prefix);
        false
    }
    fn accept_neighbor(&mut self, _ctx: &mut SearchCtx) {
        tracing::debug!("{} AcceptNeighbor", self.prefix);
    }
}

/// Periodically reports branch/failure/time/depth statistics, and one line
/// per solution. Purely observational: never stops or redirects the search.
pub struct SearchLog {
    /// Number of branches between two periodic reports.
    period: u64,
    objective: Option<VarRef>,
    display: Option<Box<dyn Fn() -> String>>,
    branches_at_last_report: u64,
    branches_at_enter: u64,
    solutions_at_enter: u64,
    /// Sliding window of tree depths visited since the last report.
    min_depth: u32,
    max_depth: u32,
}

impl SearchLog {
    pub fn new(period: u64) -> Self {
        SearchLog {
            period: period.max(1),
            objective: None,
            display: None,
            branches_at_last_report: 0,
            branches_at_enter: 0,
            solutions_at_enter: 0,
            min_depth: u32::MAX,
            max_depth: 0,
        }
    }

    pub fn with_objective(mut self, objective: VarRef) -> Self {
        self.objective = Some(objective);
        self
    }

    /// Extra user-supplied text appended to each solution line.
    pub fn with_display(mut self, display: Box<dyn Fn() -> String>) -> Self {
        self.display = Some(display);
        self
    }

    fn note_depth(&mut self, depth: u32) {
        self.min_depth = self.min_depth.min(depth);
        self.max_depth = self.max_depth.max(depth);
    }

    /// 1-based ordinal of the solution being reported. The engine counts the
    /// solution before firing `at_solution`, so the current one is already
    /// included in `num_solutions`.
    fn solution_ordinal(&self, ctx: &SearchCtx) -> u64 {
        ctx.stats.num_solutions - self.solutions_at_enter
    }

    fn objective_text(&self, ctx: &SearchCtx) -> String {
        match self.objective {
            Some(obj) if ctx.store.is_bound(obj) => format!(", objective = {}", ctx.store.value(obj)),
            Some(_) => ", objective unbound".to_string(),
            None => String::new(),
        }
    }

    fn report(&mut self, ctx: &SearchCtx) {
        let depth_range = if self.min_depth == u32::MAX {
            "-".to_string()
        } else {
            format!("{}..{}", self.min_depth, self.max_depth)
        };
        tracing::info!(
            "{} branches, {} failures, depth {}, {:.3} s{}",
            ctx.stats.num_branches - self.branches_at_enter,
            ctx.stats.num_failures,
            depth_range,
            ctx.stats.wall_time().as_secs_f64(),
            self.objective_text(ctx),
        );
        self.branches_at_last_report = ctx.stats.num_branches;
        self.min_depth = u32::MAX;
        self.max_depth = 0;
    }
}

impl SearchMonitor for SearchLog {
    fn enter_search(&mut self, ctx: &mut SearchCtx) {
        self.branches_at_enter = ctx.stats.num_branches;
        self.branches_at_last_report = ctx.stats.num_branches;
        self.solutions_at_enter = ctx.stats.num_solutions;
        self.min_depth = u32::MAX;
        self.max_depth = 0;
        tracing::info!("Start search");
    }

    fn begin_next_decision(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        let depth = ctx.store.current_decision_level().to_int();
        self.note_depth(depth);
        if ctx.stats.num_branches - self.branches_at_last_report >= self.period {
            self.report(ctx);
        }
        Ok(())
    }

    fn refute_decision(&mut self, ctx: &mut SearchCtx, _decision: &Decision) -> Result<(), Failure> {
        self.note_depth(ctx.store.current_decision_level().to_int());
        Ok(())
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let n = self.solution_ordinal(ctx);
        let extra = self.display.as_ref().map(|d| format!(", {}", d())).unwrap_or_default();
        tracing::info!(
            "Solution #{n} ({} branches, {} failures, {:.3} s{}{})",
            ctx.stats.num_branches - self.branches_at_enter,
            ctx.stats.num_failures,
            ctx.stats.wall_time().as_secs_f64(),
            self.objective_text(ctx),
            extra,
        );
        false
    }

    fn exit_search(&mut self, ctx: &mut SearchCtx) {
        tracing::info!(
            "End search ({} branches, {} failures, {} solutions, {:.3} s)",
            ctx.stats.num_branches - self.branches_at_enter,
            ctx.stats.num_failures,
            ctx.stats.num_solutions - self.solutions_at_enter,
            ctx.stats.wall_time().as_secs_f64(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::propagation::PropagatorSet;
    use crate::core::Store;
    use crate::solver::stats::Stats;

    #[test]
    fn test_search_log_numbers_solutions_from_one() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let mut log = SearchLog::new(1000);

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        log.enter_search(&mut ctx);
        // the engine counts each solution before firing at_solution
        ctx.stats.add_solution();
        assert_eq!(log.solution_ordinal(&ctx), 1);
        ctx.stats.add_solution();
        assert_eq!(log.solution_ordinal(&ctx), 2);
    }

    #[test]
    fn test_search_log_ordinal_is_per_run() {
        let mut store = Store::new();
        let mut props = PropagatorSet::new();
        let mut stats = Stats::new();
        let mut restart = false;
        let mut log = SearchLog::new(1000);

        // solutions accumulated by an earlier run
        stats.add_solution();
        stats.add_solution();
        stats.add_solution();

        let mut ctx = SearchCtx::new(&mut store, &mut props, &mut stats, &mut restart);
        log.enter_search(&mut ctx);
        ctx.stats.add_solution();
        assert_eq!(log.solution_ordinal(&ctx), 1);
    }
}
