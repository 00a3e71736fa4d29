//! Simulated annealing metaheuristic.
//!
//! Each run must improve on the last solution, relaxed by a random energy
//! slack proportional to the current temperature. The temperature follows a
//! Cauchy schedule `t0 / k` over the local-optimum count, so early runs roam
//! and late runs behave like strict hill climbing.

use crate::core::{Failure, IntCst};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::optimize::Objective;
use crate::solver::search::SearchCtx;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub struct SimulatedAnnealing {
    objective: Objective,
    temperature0: f64,
    iteration: u64,
    rng: SmallRng,
    current: Option<IntCst>,
    best: Option<IntCst>,
}

impl SimulatedAnnealing {
    pub fn new(objective: Objective, temperature0: f64, seed: u64) -> Self {
        assert!(temperature0 > 0.0, "initial temperature must be positive");
        SimulatedAnnealing {
            objective,
            temperature0,
            iteration: 0,
            rng: SmallRng::seed_from_u64(seed),
            current: None,
            best: None,
        }
    }

    pub fn best_value(&self) -> Option<IntCst> {
        self.best
    }

    pub fn temperature(&self) -> f64 {
        if self.iteration == 0 {
            self.temperature0
        } else {
            self.temperature0 / self.iteration as f64
        }
    }

    /// Random slack added to the improvement requirement. Always
    /// non-negative, unbounded for hot temperatures, near zero for cold ones.
    fn energy_slack(&mut self) -> f64 {
        let r: f64 = self.rng.random();
        (self.temperature() * r.max(f64::MIN_POSITIVE).log2()).abs()
    }
}

impl SearchMonitor for SimulatedAnnealing {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.iteration = 0;
        self.current = None;
        self.best = None;
    }

    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        let Some(current) = self.current else {
            return Ok(());
        };
        let slack = self.energy_slack();
        if self.objective.maximize {
            let bound = (self.objective.improved(current) as f64 - slack).ceil() as IntCst;
            ctx.store.set_min(self.objective.var, bound)?;
        } else {
            let bound = (self.objective.improved(current) as f64 + slack).floor() as IntCst;
            ctx.store.set_max(self.objective.var, bound)?;
        }
        Ok(())
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        let value = self.objective.value(ctx.store);
        self.current = Some(value);
        match self.best {
            Some(best) if !self.objective.is_better(value, best) => {}
            _ => self.best = Some(value),
        }
        true
    }

    fn local_optimum(&mut self, _ctx: &mut SearchCtx) -> bool {
        self.iteration += 1;
        self.current.is_some() && self.temperature() > 0.0
    }
}
