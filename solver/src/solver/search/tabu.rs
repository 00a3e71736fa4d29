//! Tabu search metaheuristic.
//!
//! Between two solutions the monitor diffs the assignments: variables that
//! changed enter the keep list with their new value and the forbid list with
//! their old one, each for a bounded tenure. On every restart the next run is
//! constrained to improve strictly on the last solution and to respect at
//! least a `tabu_factor` fraction of the live tabu pairs, unless it can beat
//! the best solution found so far (aspiration).

use crate::core::propagation::Propagator;
use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::optimize::Objective;
use crate::solver::search::SearchCtx;
use hashbrown::HashMap;
use std::collections::VecDeque;

#[derive(Copy, Clone, Debug)]
struct TabuEntry {
    var: VarRef,
    value: IntCst,
    /// Iteration at which the entry stops being live.
    expiry: u64,
}

pub struct TabuSearch {
    objective: Objective,
    vars: Vec<VarRef>,
    keep_tenure: u64,
    forbid_tenure: u64,
    /// Fraction of the live tabu pairs each candidate must respect, in
    /// `[0, 1]`. At 1.0 every pair is enforced.
    tabu_factor: f64,
    keep: VecDeque<TabuEntry>,
    forbid: VecDeque<TabuEntry>,
    iteration: u64,
    best: Option<IntCst>,
    current: Option<IntCst>,
    last: HashMap<VarRef, IntCst>,
}

impl TabuSearch {
    pub fn new(
        objective: Objective,
        vars: Vec<VarRef>,
        keep_tenure: u64,
        forbid_tenure: u64,
        tabu_factor: f64,
    ) -> Self {
        assert!((0.0..=1.0).contains(&tabu_factor), "tabu factor must be in [0, 1]");
        TabuSearch {
            objective,
            vars,
            keep_tenure,
            forbid_tenure,
            tabu_factor,
            keep: VecDeque::new(),
            forbid: VecDeque::new(),
            iteration: 0,
            best: None,
            current: None,
            last: HashMap::new(),
        }
    }

    pub fn best_value(&self) -> Option<IntCst> {
        self.best
    }

    fn expire(&mut self) {
        while self.keep.front().is_some_and(|e| e.expiry <= self.iteration) {
            self.keep.pop_front();
        }
        while self.forbid.front().is_some_and(|e| e.expiry <= self.iteration) {
            self.forbid.pop_front();
        }
    }

    /// Constraints imposed on the next run.
    fn constrain(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        let Some(current) = self.current else {
            return Ok(());
        };
        // strict progress over the last accepted solution
        self.objective.apply_bound(ctx.store, self.objective.improved(current))?;

        self.expire();
        let live = self.keep.len() + self.forbid.len();
        if live == 0 {
            return Ok(());
        }
        let max_violations = ((1.0 - self.tabu_factor) * live as f64).floor() as usize;
        ctx.props.post(Box::new(TabuCheck {
            keep: self.keep.iter().map(|e| (e.var, e.value)).collect(),
            forbid: self.forbid.iter().map(|e| (e.var, e.value)).collect(),
            max_violations,
            objective: self.objective,
            aspiration: self.best.map(|b| self.objective.improved(b)),
        }));
        Ok(())
    }
}

impl SearchMonitor for TabuSearch {
    fn enter_search(&mut self, _ctx: &mut SearchCtx) {
        self.keep.clear();
        self.forbid.clear();
        self.iteration = 0;
        self.best = None;
        self.current = None;
        self.last.clear();
    }

    fn restart_search(&mut self, ctx: &mut SearchCtx) -> Result<(), Failure> {
        self.constrain(ctx)
    }

    fn at_solution(&mut self, ctx: &mut SearchCtx) -> bool {
        self.iteration += 1;
        for &var in &self.vars {
            let value = ctx.store.value(var);
            let old = self.last.insert(var, value);
            if old != Some(value) {
                self.keep.push_back(TabuEntry {
                    var,
                    value,
                    expiry: self.iteration + self.keep_tenure,
                });
                if let Some(old) = old {
                    self.forbid.push_back(TabuEntry {
                        var,
                        value: old,
                        expiry: self.iteration + self.forbid_tenure,
                    });
                }
            }
        }
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
        self.expire();
        // keep going as long as an initial solution exists to move from
        self.current.is_some()
    }
}

/// Fails any state that definitely violates more tabu pairs than allowed,
/// unless the objective can still beat the aspiration value.
struct TabuCheck {
    keep: Vec<(VarRef, IntCst)>,
    forbid: Vec<(VarRef, IntCst)>,
    max_violations: usize,
    objective: Objective,
    aspiration: Option<IntCst>,
}

impl TabuCheck {
    fn aspiration_reachable(&self, store: &Store) -> bool {
        match self.aspiration {
            None => false,
            Some(asp) if self.objective.maximize => store.max(self.objective.var) >= asp,
            Some(asp) => store.min(self.objective.var) <= asp,
        }
    }
}

impl Propagator for TabuCheck {
    fn propagate(&mut self, store: &mut Store) -> Result<(), Failure> {
        if self.aspiration_reachable(store) {
            return Ok(());
        }
        let keep_violated = self
            .keep
            .iter()
            .filter(|&&(var, value)| !store.contains(var, value))
            .count();
        let forbid_violated = self
            .forbid
            .iter()
            .filter(|&&(var, value)| store.is_bound(var) && store.value(var) == value)
            .count();
        if keep_violated + forbid_violated > self.max_violations {
            return Err(Failure);
        }
        Ok(())
    }
}
