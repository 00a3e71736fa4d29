//! Budget enforcement monitors.
//!
//! A limit is a [SearchMonitor] that, once its budget is exhausted, fails
//! every periodic check. The engine then unwinds the whole tree as if it were
//! proven infeasible, which terminates the run through the regular
//! `NoMoreSolutions` / `ExitSearch` path.

use crate::core::Failure;
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::SearchCtx;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Number of periodic checks before the smart time check starts skipping
/// clock reads.
const CHECK_WARMUP_ITERATIONS: u64 = 100;
/// Upper bound on the number of clock reads skipped in a row.
const MAX_SKIP: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitError {
    #[error("a limit must bound at least one of time, branches, failures or solutions")]
    Unbounded,
    #[error("limit budgets must be positive (got {0} = 0)")]
    ZeroBudget(&'static str),
}

/// Declarative budget of a [RegularLimit].
#[derive(Clone, Debug, Default)]
pub struct LimitSpec {
    pub time: Option<Duration>,
    pub branches: Option<u64>,
    pub failures: Option<u64>,
    pub solutions: Option<u64>,
    /// Estimate the check frequency and skip most clock reads.
    pub smart_time_check: bool,
    /// Carry the unconsumed budget over to the next run instead of resetting.
    pub cumulative: bool,
}

impl LimitSpec {
    fn validate(&self) -> Result<(), LimitError> {
        if self.time.is_none() && self.branches.is_none() && self.failures.is_none() && self.solutions.is_none() {
            return Err(LimitError::Unbounded);
        }
        if self.branches == Some(0) {
            return Err(LimitError::ZeroBudget("branches"));
        }
        if self.failures == Some(0) {
            return Err(LimitError::ZeroBudget("failures"));
        }
        if self.solutions == Some(0) {
            return Err(LimitError::ZeroBudget("solutions"));
        }
        Ok(())
    }
}

/// A crossed limit stays crossed until the next `EnterSearch`.
pub trait SearchLimit: SearchMonitor {
    fn crossed(&self) -> bool;
}

/// Standard limit over time, branches, failures and solutions.
pub struct RegularLimit {
    /// Remaining budget; equals the spec until a cumulative run consumes some.
    remaining: LimitSpec,
    spec: LimitSpec,
    crossed: bool,
    branches_offset: u64,
    failures_offset: u64,
    solutions_offset: u64,
    run_start: Instant,
    checks: u64,
    skip_remaining: u64,
}

impl RegularLimit {
    pub fn new(spec: LimitSpec) -> Result<Self, LimitError> {
        spec.validate()?;
        Ok(RegularLimit {
            remaining: spec.clone(),
            spec,
            crossed: false,
            branches_offset: 0,
            failures_offset: 0,
            solutions_offset: 0,
            run_start: Instant::now(),
            checks: 0,
            skip_remaining: 0,
        })
    }

    fn time_crossed(&mut self) -> bool {
        let Some(budget) = self.remaining.time else {
            return false;
        };
        if self.remaining.smart_time_check {
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                return false;
            }
            let elapsed = self.run_start.elapsed();
            if elapsed >= budget {
                return true;
            }
            self.checks += 1;
            if self.checks >= CHECK_WARMUP_ITERATIONS && !elapsed.is_zero() {
                // conservative estimate: half of the checks that would fit in
                // the remaining time, at the observed check rate
                let per_check = elapsed.as_nanos() / self.checks as u128;
                let fit = (budget - elapsed).as_nanos() / per_check.max(1);
                self.skip_remaining = ((fit / 2) as u64).min(MAX_SKIP);
            }
            false
        } else {
            self.run_start.elapsed() >= budget
        }
    }

    fn update(&mut self, ctx: &SearchCtx) {
        if self.crossed {
            return;
        }
        let over = |budget: Option<u64>, used: u64| budget.is_some_and(|b| used >= b);
        if over(self.remaining.branches, ctx.stats.num_branches - self.branches_offset)
            || over(self.remaining.failures, ctx.stats.num_failures - self.failures_offset)
            || over(self.remaining.solutions, ctx.stats.num_solutions - self.solutions_offset)
            || self.time_crossed()
        {
            self.crossed = true;
        }
    }
}

impl SearchLimit for RegularLimit {
    fn crossed(&self) -> bool {
        self.crossed
    }
}

impl SearchMonitor for RegularLimit {
    fn enter_search(&mut self, ctx: &mut SearchCtx) {
        self.crossed = false;
        self.branches_offset = ctx.stats.num_branches;
        self.failures_offset = ctx.stats.num_failures;
        self.solutions_offset = ctx.stats.num_solutions;
        self.run_start = Instant::now();
        self.checks = 0;
        self.skip_remaining = 0;
        if !self.spec.cumulative {
            self.remaining = self.spec.clone();
        }
    }

    fn exit_search(&mut self, ctx: &mut SearchCtx) {
        if !self.spec.cumulative {
            return;
        }
        // consume the budget used by this run
        let consume = |budget: &mut Option<u64>, used: u64| {
            if let Some(b) = budget {
                *b = b.saturating_sub(used);
            }
        };
        consume(&mut self.remaining.branches, ctx.stats.num_branches - self.branches_offset);
        consume(&mut self.remaining.failures, ctx.stats.num_failures - self.failures_offset);
        consume(&mut self.remaining.solutions, ctx.stats.num_solutions - self.solutions_offset);
        if let Some(t) = &mut self.remaining.time {
            *t = t.saturating_sub(self.run_start.elapsed());
        }
    }

    fn periodic_check(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        self.update(ctx);
        if self.crossed {
            Err(Failure)
        } else {
            Ok(())
        }
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        self.update(ctx);
        false
    }
}

/// Crossed as soon as either child is. Both children are always checked so
/// that their internal accounting stays live.
pub struct OrLimit {
    left: Box<dyn SearchLimit>,
    right: Box<dyn SearchLimit>,
}

impl OrLimit {
    pub fn new(left: Box<dyn SearchLimit>, right: Box<dyn SearchLimit>) -> Self {
        OrLimit { left, right }
    }
}

impl SearchLimit for OrLimit {
    fn crossed(&self) -> bool {
        self.left.crossed() || self.right.crossed()
    }
}

impl SearchMonitor for OrLimit {
    fn enter_search(&mut self, ctx: &mut SearchCtx) {
        self.left.enter_search(ctx);
        self.right.enter_search(ctx);
    }

    fn exit_search(&mut self, ctx: &mut SearchCtx) {
        self.left.exit_search(ctx);
        self.right.exit_search(ctx);
    }

    fn periodic_check(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        let left = self.left.periodic_check(ctx);
        let right = self.right.periodic_check(ctx);
        left.and(right)
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let left = self.left.at_solution(ctx);
        let right = self.right.at_solution(ctx);
        left || right
    }
}

/// Limit driven by a caller-supplied predicate, re-evaluated at each check.
/// Returning `true` crosses the limit.
pub struct CustomLimit {
    predicate: Box<dyn FnMut(&mut SearchCtx) -> bool>,
    crossed: bool,
}

impl CustomLimit {
    pub fn new(predicate: Box<dyn FnMut(&mut SearchCtx) -> bool>) -> Self {
        CustomLimit {
            predicate,
            crossed: false,
        }
    }
}

impl SearchLimit for CustomLimit {
    fn crossed(&self) -> bool {
        self.crossed
    }
}

impl SearchMonitor for CustomLimit {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.crossed = false;
    }

    fn periodic_check(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        if self.crossed || (self.predicate)(ctx) {
            self.crossed = true;
            Err(Failure)
        } else {
            Ok(())
        }
    }
}
