//! Backtracking search core for constraint programming.
//!
//! The crate provides the combinatorial exploration machinery of a CP solver:
//! a reversible trail and object arena ([backtrack]), an integer variable
//! store with a narrow constraint-posting surface ([core]), and a depth-first
//! search engine driven by pluggable decision builders and observed by search
//! monitors ([solver]) — limits, solution collectors, branch and bound,
//! restarts, symmetry breaking and the local-search metaheuristics (tabu
//! search, simulated annealing, guided local search).
//!
//! The constraint propagation engine itself is an external collaborator: the
//! search only requires the domain surface of [core::Store] and the
//! [core::propagation::Propagator] posting seam.

pub mod backtrack;
pub mod core;
pub mod solver;
pub mod utils;
