//! The depth-first search engine.
//!
//! [run_search] drives one complete exploration: it repeatedly asks the
//! decision builder for the next decision, applies it, propagates, and on
//! failure rewinds the trail and refutes the decision. Every transition is
//! reported to the registered [SearchMonitor]s, in registration order, and any
//! monitor may force a failure from its hooks — limits, branch-and-bound
//! bounds and metaheuristic acceptance all go through that single channel.
//!
//! The engine is reentrant: all reversible state lives in the store and the
//! propagator set, so nested solves ([search::builders::SolveOnce],
//! [search::builders::NestedOptimize]) simply recurse into [run_search].

use crate::backtrack::Backtrack;
use crate::core::propagation::{propagate, Propagator, PropagatorSet};
use crate::core::{Failure, IntCst, Store, VarRef};
use crate::solver::search::builders::AssignVariables;
use crate::solver::search::monitor::SearchMonitor;
use crate::solver::search::value_order::ValStrategy;
use crate::solver::search::var_order::VarStrategy;
use crate::solver::search::{Decision, DecisionBuilder, SearchCtx};
use crate::solver::stats::Stats;
use crate::utils::EnvParam;

pub mod search;
pub mod stats;

/// If true, decisions and solutions are traced as the search takes them.
static LOG_DECISIONS: EnvParam<bool> = EnvParam::new("ARBO_LOG_DECISIONS", "false");

/// Same syntax as `println!` but only evaluates its arguments and emits a
/// trace event when `ARBO_LOG_DECISIONS` is set.
macro_rules! log_dec {
    ($($arg:tt)+) => {
        if LOG_DECISIONS.get() {
            tracing::trace!($($arg)+);
        }
    };
}

/// Notifies every monitor of one event and combines their verdicts.
///
/// All monitors are notified even after one of them failed, so that their
/// internal accounting (limit offsets in particular) does not depend on
/// registration order.
fn fire(
    store: &mut Store,
    props: &mut PropagatorSet,
    stats: &mut Stats,
    restart: &mut bool,
    monitors: &mut [&mut dyn SearchMonitor],
    mut event: impl FnMut(&mut dyn SearchMonitor, &mut SearchCtx) -> Result<(), Failure>,
) -> Result<(), Failure> {
    let mut ctx = SearchCtx::new(store, props, stats, restart);
    let mut result = Ok(());
    for m in monitors.iter_mut() {
        result = result.and(event(&mut **m, &mut ctx));
    }
    result
}

/// Runs one complete depth-first search driven by `builder`, notifying
/// `monitors` of every event. Returns true if at least one solution was
/// accepted during the run.
///
/// Solutions are observed through the monitors (typically a
/// [search::collector::SolutionCollector]); the store and the propagator set
/// are always unwound back to their entry level before returning.
pub fn run_search(
    store: &mut Store,
    props: &mut PropagatorSet,
    stats: &mut Stats,
    builder: &mut dyn DecisionBuilder,
    monitors: &mut [&mut dyn SearchMonitor],
) -> bool {
    let base = store.current_decision_level();
    let props_base = props.current_decision_level();
    let mut restart = false;
    let mut found = false;
    // decisions applied on the current path, most recent last; each entry
    // owns one saved level of the store and of the propagator set
    let mut path: Vec<Decision> = Vec::new();

    macro_rules! fire {
        ($event:expr) => {
            fire(store, props, stats, &mut restart, monitors, $event)
        };
    }

    let _ = fire!(|m, c| {
        m.enter_search(c);
        Ok(())
    });
    let _ = fire!(|m, c| {
        m.begin_initial_propagation(c);
        Ok(())
    });
    let mut alive = propagate(store, props).is_ok();
    let _ = fire!(|m, c| {
        m.end_initial_propagation(c);
        Ok(())
    });

    loop {
        // =============== descend ===============
        while alive {
            let checks = fire!(|m, c| m.periodic_check(c)).and(fire!(|m, c| m.begin_next_decision(c)));
            if checks.is_err() {
                alive = false;
                break;
            }
            let produced = {
                let mut ctx = SearchCtx::new(store, props, stats, &mut restart);
                builder.next(&mut ctx)
            };
            let decision = match produced {
                Ok(d) => d,
                Err(Failure) => {
                    alive = false;
                    break;
                }
            };
            let _ = fire!(|m, c| {
                m.end_next_decision(c, decision.as_ref());
                Ok(())
            });
            let Some(decision) = decision else {
                // =============== leaf ===============
                stats.num_neighbors += 1;
                let accepted = {
                    let mut ctx = SearchCtx::new(store, props, stats, &mut restart);
                    let mut accepted = true;
                    for m in monitors.iter_mut() {
                        accepted &= m.accept_solution(&mut ctx);
                    }
                    accepted
                };
                if !accepted {
                    stats.num_filtered_neighbors += 1;
                    alive = false;
                    break;
                }
                stats.add_solution();
                stats.num_accepted_neighbors += 1;
                found = true;
                log_dec!("=> solution #{}", stats.num_solutions);
                let resume = {
                    let mut ctx = SearchCtx::new(store, props, stats, &mut restart);
                    let mut resume = false;
                    for m in monitors.iter_mut() {
                        resume |= m.at_solution(&mut ctx);
                    }
                    resume
                };
                let _ = fire!(|m, c| {
                    m.accept_neighbor(c);
                    Ok(())
                });
                if resume {
                    // look for the next solution: unwind as if this leaf failed
                    alive = false;
                    break;
                }
                store.restore(base);
                props.restore(props_base);
                let _ = fire!(|m, c| {
                    m.exit_search(c);
                    Ok(())
                });
                return true;
            };
            // =============== apply (left branch) ===============
            log_dec!("apply {decision:?}");
            store.save_state();
            props.save_state();
            stats.add_branch();
            let mut ok = fire!(|m, c| m.apply_decision(c, &decision));
            if ok.is_ok() {
                ok = decision.apply(store);
            }
            if ok.is_ok() {
                ok = propagate(store, props);
            }
            alive = ok.is_ok();
            if alive {
                let _ = fire!(|m, c| {
                    m.after_decision(c, &decision, true);
                    Ok(())
                });
            }
            // the saved level is popped by the unwinder, which then refutes
            // this same decision
            path.push(decision);
        }

        // =============== fail and unwind ===============
        stats.add_failure();
        let _ = fire!(|m, c| {
            m.begin_fail(c);
            Ok(())
        });
        let _ = fire!(|m, c| {
            m.end_fail(c);
            Ok(())
        });
        loop {
            if restart {
                restart = false;
                store.restore(base);
                props.restore(props_base);
                path.clear();
                if fire!(|m, c| m.restart_search(c)).is_ok() {
                    stats.add_restart();
                    alive = true;
                    break;
                }
                // the restarted run is infeasible from the root: exhausted
                let _ = fire!(|m, c| {
                    m.no_more_solutions(c);
                    Ok(())
                });
                let _ = fire!(|m, c| {
                    m.exit_search(c);
                    Ok(())
                });
                return found;
            }
            match path.pop() {
                Some(decision) => {
                    // =============== refute (right branch) ===============
                    store.restore_last();
                    props.restore_last();
                    log_dec!("refute {decision:?}");
                    let mut ok = fire!(|m, c| m.periodic_check(c));
                    if ok.is_ok() {
                        stats.add_branch();
                        ok = fire!(|m, c| m.refute_decision(c, &decision));
                    }
                    if ok.is_ok() {
                        ok = decision.refute(store);
                    }
                    if ok.is_ok() {
                        ok = propagate(store, props);
                    }
                    if ok.is_ok() {
                        let _ = fire!(|m, c| {
                            m.after_decision(c, &decision, false);
                            Ok(())
                        });
                        alive = true;
                        break;
                    }
                    stats.add_failure();
                    let _ = fire!(|m, c| {
                        m.begin_fail(c);
                        Ok(())
                    });
                    let _ = fire!(|m, c| {
                        m.end_fail(c);
                        Ok(())
                    });
                }
                None => {
                    // back at the base level: the bounded tree is exhausted,
                    // unless a metaheuristic turns the local optimum into a
                    // fresh run (never past a crossed limit)
                    let keep_going = fire!(|m, c| m.periodic_check(c)).is_ok() && {
                        let mut ctx = SearchCtx::new(store, props, stats, &mut restart);
                        let mut any = false;
                        for m in monitors.iter_mut() {
                            any |= m.local_optimum(&mut ctx);
                        }
                        any
                    };
                    if keep_going && fire!(|m, c| m.restart_search(c)).is_ok() {
                        stats.add_restart();
                        restart = false;
                        alive = true;
                        break;
                    }
                    let _ = fire!(|m, c| {
                        m.no_more_solutions(c);
                        Ok(())
                    });
                    let _ = fire!(|m, c| {
                        m.exit_search(c);
                        Ok(())
                    });
                    return found;
                }
            }
        }
    }
}

/// Owner of the search state: variable store, posted constraints, counters.
pub struct Solver {
    pub store: Store,
    pub props: PropagatorSet,
    pub stats: Stats,
}

impl Solver {
    pub fn new() -> Solver {
        Solver {
            store: Store::new(),
            props: PropagatorSet::new(),
            stats: Stats::new(),
        }
    }

    pub fn new_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        self.store.new_var(lb, ub)
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Propagator>) {
        self.props.post(constraint);
    }

    /// Binary-branching builder over `vars` with the given strategies.
    pub fn make_builder(
        &mut self,
        vars: Vec<VarRef>,
        var_strategy: VarStrategy,
        val_strategy: ValStrategy,
    ) -> AssignVariables {
        AssignVariables::from_strategies(&mut self.store, vars, var_strategy, val_strategy)
    }

    /// Runs a search without observers; stops at the first solution.
    pub fn solve(&mut self, builder: &mut dyn DecisionBuilder) -> bool {
        self.solve_with(builder, &mut [])
    }

    /// Runs a search observed by `monitors`. Returns true if at least one
    /// solution was accepted.
    pub fn solve_with(&mut self, builder: &mut dyn DecisionBuilder, monitors: &mut [&mut dyn SearchMonitor]) -> bool {
        run_search(&mut self.store, &mut self.props, &mut self.stats, builder, monitors)
    }
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::propagation::NeqOffset;
    use crate::solver::search::collector::SolutionCollector;
    use crate::solver::search::limit::{LimitSpec, RegularLimit, SearchLimit};
    use crate::solver::search::optimize::{Objective, OptimizeVar};
    use crate::solver::search::tabu::TabuSearch;
    use crate::solver::search::value_order::MinValue;
    use crate::solver::search::var_order::FirstUnbound;
    use crate::solver::search::symmetry::{MappedSymmetry, SymmetryManager};
    use crate::core::propagation::Term;

    fn first_min_builder(solver: &mut Solver, vars: Vec<VarRef>) -> AssignVariables {
        let selector = FirstUnbound::new(&mut solver.store, vars);
        AssignVariables::new(Box::new(selector), Box::new(MinValue))
    }

    /// Records the name of every event it observes.
    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
    }

    impl SearchMonitor for Recorder {
        fn enter_search(&mut self, _: &mut SearchCtx) {
            self.events.push("EnterSearch");
        }
        fn restart_search(&mut self, _: &mut SearchCtx) -> Result<(), Failure> {
            self.events.push("RestartSearch");
            Ok(())
        }
        fn exit_search(&mut self, _: &mut SearchCtx) {
            self.events.push("ExitSearch");
        }
        fn begin_next_decision(&mut self, _: &mut SearchCtx) -> Result<(), Failure> {
            self.events.push("BeginNextDecision");
            Ok(())
        }
        fn end_next_decision(&mut self, _: &mut SearchCtx, _: Option<&Decision>) {
            self.events.push("EndNextDecision");
        }
        fn apply_decision(&mut self, _: &mut SearchCtx, _: &Decision) -> Result<(), Failure> {
            self.events.push("ApplyDecision");
            Ok(())
        }
        fn refute_decision(&mut self, _: &mut SearchCtx, _: &Decision) -> Result<(), Failure> {
            self.events.push("RefuteDecision");
            Ok(())
        }
        fn after_decision(&mut self, _: &mut SearchCtx, _: &Decision, _: bool) {
            self.events.push("AfterDecision");
        }
        fn begin_fail(&mut self, _: &mut SearchCtx) {
            self.events.push("BeginFail");
        }
        fn end_fail(&mut self, _: &mut SearchCtx) {
            self.events.push("EndFail");
        }
        fn begin_initial_propagation(&mut self, _: &mut SearchCtx) {
            self.events.push("BeginInitialPropagation");
        }
        fn end_initial_propagation(&mut self, _: &mut SearchCtx) {
            self.events.push("EndInitialPropagation");
        }
        fn accept_solution(&mut self, _: &mut SearchCtx) -> bool {
            self.events.push("AcceptSolution");
            true
        }
        fn at_solution(&mut self, _: &mut SearchCtx) -> bool {
            self.events.push("AtSolution");
            false
        }
        fn no_more_solutions(&mut self, _: &mut SearchCtx) {
            self.events.push("NoMoreSolutions");
        }
        fn accept_neighbor(&mut self, _: &mut SearchCtx) {
            self.events.push("AcceptNeighbor");
        }
        fn periodic_check(&mut self, _: &mut SearchCtx) -> Result<(), Failure> {
            self.events.push("PeriodicCheck");
            Ok(())
        }
    }

    #[test]
    fn test_event_order_up_to_first_solution() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 1);
        let mut builder = first_min_builder(&mut solver, vec![x]);
        let mut recorder = Recorder::default();

        assert!(solver.solve_with(&mut builder, &mut [&mut recorder]));
        assert_eq!(
            recorder.events,
            vec![
                "EnterSearch",
                "BeginInitialPropagation",
                "EndInitialPropagation",
                "PeriodicCheck",
                "BeginNextDecision",
                "EndNextDecision",
                "ApplyDecision",
                "AfterDecision",
                "PeriodicCheck",
                "BeginNextDecision",
                "EndNextDecision",
                "AcceptSolution",
                "AtSolution",
                "AcceptNeighbor",
                "ExitSearch",
            ]
        );
    }

    #[test]
    fn test_exhaustive_enumeration_and_counters() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 1);
        let mut builder = first_min_builder(&mut solver, vec![x]);
        let mut all = SolutionCollector::all();
        all.add(x);

        assert!(solver.solve_with(&mut builder, &mut [&mut all]));
        assert_eq!(all.solution_count(), 2);
        assert_eq!(all.value(0, x), 0);
        assert_eq!(all.value(1, x), 1);
        assert_eq!(solver.stats.num_solutions, 2);
        assert_eq!(solver.stats.num_branches, 2); // apply x=0, refute x=0
        assert_eq!(solver.stats.num_failures, 2); // after each solution
        // the refutation of x == 0 happened at the base level and persists
        assert_eq!(solver.store.value(x), 1);
    }

    #[test]
    fn test_infeasible_root_finds_nothing() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 0);
        let y = solver.new_var(0, 0);
        solver.add_constraint(Box::new(NeqOffset::new(x, y, 0)));
        let mut builder = first_min_builder(&mut solver, vec![x, y]);
        let mut recorder = Recorder::default();

        assert!(!solver.solve_with(&mut builder, &mut [&mut recorder]));
        assert!(recorder.events.contains(&"NoMoreSolutions"));
        assert_eq!(solver.stats.num_solutions, 0);
    }

    fn queens(n: usize) -> (Solver, Vec<VarRef>) {
        let mut solver = Solver::new();
        let vars: Vec<_> = (0..n).map(|_| solver.new_var(0, n as IntCst - 1)).collect();
        for i in 0..n {
            for j in i + 1..n {
                let d = (j - i) as IntCst;
                solver.add_constraint(Box::new(NeqOffset::new(vars[i], vars[j], 0)));
                solver.add_constraint(Box::new(NeqOffset::new(vars[i], vars[j], d)));
                solver.add_constraint(Box::new(NeqOffset::new(vars[i], vars[j], -d)));
            }
        }
        (solver, vars)
    }

    #[test]
    fn test_eight_queens_has_92_solutions() {
        let (mut solver, vars) = queens(8);
        let mut builder = first_min_builder(&mut solver, vars.clone());
        let mut all = SolutionCollector::all();
        all.add_all(&vars);

        assert!(solver.solve_with(&mut builder, &mut [&mut all]));
        assert_eq!(all.solution_count(), 92);
    }

    #[test]
    fn test_branch_and_bound_reaches_the_optimum() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 9);
        let y = solver.new_var(0, 9);
        solver.add_constraint(Box::new(NeqOffset::new(x, y, 0)));
        let mut builder = first_min_builder(&mut solver, vec![x, y]);
        let mut opt = OptimizeVar::new(Objective::minimize(y));
        let mut best = SolutionCollector::best_value(false, y);
        best.add_all(&[x, y]);

        assert!(solver.solve_with(&mut builder, &mut [&mut opt, &mut best]));
        assert_eq!(opt.best_value(), Some(0));
        assert_eq!(best.solution_count(), 1);
        assert_eq!(best.value(0, y), 0);
        // x was assigned first with its minimum, so the optimum has x == 1
        assert_eq!(best.value(0, x), 1);
    }

    #[test]
    fn test_limit_terminates_the_search() {
        let (mut solver, vars) = queens(8);
        let mut builder = first_min_builder(&mut solver, vars.clone());
        let mut all = SolutionCollector::all();
        all.add_all(&vars);
        let mut limit = RegularLimit::new(LimitSpec {
            branches: Some(50),
            ..Default::default()
        })
        .unwrap();

        solver.solve_with(&mut builder, &mut [&mut all, &mut limit]);
        assert!(limit.crossed());
        assert!(all.solution_count() < 92);
        assert!(solver.stats.num_branches <= 52);
    }

    #[test]
    fn test_symmetry_breaking_keeps_one_solution_per_orbit() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 2);
        let y = solver.new_var(0, 2);
        let mut sym = SymmetryManager::new();
        // x and y are interchangeable
        sym.add(
            &mut solver.store,
            Box::new(MappedSymmetry::new(Box::new(move |_, var, value| {
                if var == x {
                    Some(Term::new(y, value))
                } else if var == y {
                    Some(Term::new(x, value))
                } else {
                    None
                }
            }))),
        );
        let mut builder = first_min_builder(&mut solver, vec![x, y]);
        let mut all = SolutionCollector::all();
        all.add_all(&[x, y]);

        assert!(solver.solve_with(&mut builder, &mut [&mut sym, &mut all]));
        // only the canonical representative of each orbit is enumerated
        let collected: Vec<_> = (0..all.solution_count())
            .map(|n| (all.value(n, x), all.value(n, y)))
            .collect();
        assert_eq!(collected, vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_local_optimum_restarts_with_tabu() {
        let mut solver = Solver::new();
        let x = solver.new_var(0, 2);
        let mut builder = first_min_builder(&mut solver, vec![x]);
        // fully permissive tabu factor: only the strict-progress bound acts
        let mut tabu = TabuSearch::new(Objective::minimize(x), vec![x], 10, 10, 0.0);
        let mut all = SolutionCollector::all();
        all.add(x);

        assert!(solver.solve_with(&mut builder, &mut [&mut tabu, &mut all]));
        // segments enumerate {0,1,2}, then {0,1}, then {0}; the last restart
        // asks for an improvement below 0 and terminates the run
        assert_eq!(all.solution_count(), 6);
        assert_eq!(solver.stats.num_restarts, 2);
        assert_eq!(tabu.best_value(), Some(0));
    }
}
