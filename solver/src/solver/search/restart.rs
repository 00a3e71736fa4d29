//! Restart policies.
//!
//! A restart monitor counts failures and, when its budget for the current
//! run-segment is spent, asks the engine to unwind to the base of the run and
//! start over. Restarting only pays off with some source of diversity
//! (randomized selectors, nogoods posted by a symmetry breaker, a tightened
//! objective bound).

use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::SearchCtx;

/// Reluctant-doubling generator of the Luby sequence 1,1,2,1,1,2,4,...
#[derive(Copy, Clone, Debug)]
pub struct Luby {
    u: u64,
    v: u64,
}

impl Luby {
    pub fn new() -> Luby {
        Luby { u: 1, v: 1 }
    }

    pub fn next(&mut self) -> u64 {
        let current = self.v;
        if (self.u & self.u.wrapping_neg()) == self.v {
            self.u += 1;
            self.v = 1;
        } else {
            self.v *= 2;
        }
        current
    }
}

impl Default for Luby {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for Luby {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(Luby::next(self))
    }
}

/// Restarts after `scale * luby(k)` failures for the k-th segment.
pub struct LubyRestart {
    scale: u64,
    luby: Luby,
    budget: u64,
    failures: u64,
}

impl LubyRestart {
    pub fn new(scale: u64) -> Self {
        assert!(scale > 0, "restart scale must be positive");
        let mut luby = Luby::new();
        let budget = scale * luby.next();
        LubyRestart {
            scale,
            luby,
            budget,
            failures: 0,
        }
    }
}

impl SearchMonitor for LubyRestart {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.luby = Luby::new();
        self.budget = self.scale * self.luby.next();
        self.failures = 0;
    }

    fn end_fail(&mut self, ctx: &mut SearchCtx) {
        self.failures += 1;
        if self.failures >= self.budget {
            self.failures = 0;
            self.budget = self.scale * self.luby.next();
            ctx.request_restart();
        }
    }
}

/// Restarts every `budget` failures.
pub struct ConstantRestart {
    budget: u64,
    failures: u64,
}

impl ConstantRestart {
    pub fn new(budget: u64) -> Self {
        assert!(budget > 0, "restart budget must be positive");
        ConstantRestart { budget, failures: 0 }
    }
}

impl SearchMonitor for ConstantRestart {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.failures = 0;
    }

    fn end_fail(&mut self, ctx: &mut SearchCtx) {
        self.failures += 1;
        if self.failures >= self.budget {
            self.failures = 0;
            ctx.request_restart();
        }
    }
}
