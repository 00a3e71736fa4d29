//! Variable selection heuristics for the assignment builders.
//!
//! A selector picks the next variable to branch on among a fixed scope of
//! candidates, or `None` when every candidate is bound. Selectors keep their
//! scan positions in reversible cells of the store so that backtracking
//! rewinds them for free.

use crate::core::{IntCst, Store, TrailedInt, VarRef};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub trait VariableSelector {
    fn select(&mut self, store: &mut Store) -> Option<VarRef>;
}

/// Parameterless selection strategies, for configuration surfaces.
/// Strategies needing a cost function ([CheapestVar]) are built directly.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum VarStrategy {
    /// First candidate, in scope order, that is not bound.
    FirstUnbound,
    /// Smallest domain, ties broken by the given bound preference.
    MinSize(TieBreak),
    /// Uniformly random unbound candidate.
    Random { seed: u64 },
    /// Path-extension heuristic for successor models.
    Path,
}

impl VarStrategy {
    pub fn build(self, store: &mut Store, vars: Vec<VarRef>) -> Box<dyn VariableSelector> {
        match self {
            VarStrategy::FirstUnbound => Box::new(FirstUnbound::new(store, vars)),
            VarStrategy::MinSize(tie) => Box::new(MinSize::new(vars, tie)),
            VarStrategy::Random { seed } => Box::new(RandomVar::new(vars, seed)),
            VarStrategy::Path => Box::new(Path::new(store, vars)),
        }
    }
}

/// Tie-breaking preference among equally small domains.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TieBreak {
    LowestMin,
    HighestMin,
    LowestMax,
    HighestMax,
}

/// Scans the scope left to right and returns the first unbound variable.
///
/// The scan position is reversible: variables proven bound at this level are
/// skipped on subsequent calls but reconsidered after backtracking.
pub struct FirstUnbound {
    vars: Vec<VarRef>,
    cursor: TrailedInt,
}

impl FirstUnbound {
    pub fn new(store: &mut Store, vars: Vec<VarRef>) -> Self {
        let cursor = store.new_trailed_int(0);
        FirstUnbound { vars, cursor }
    }
}

impl VariableSelector for FirstUnbound {
    fn select(&mut self, store: &mut Store) -> Option<VarRef> {
        let mut i = store.get_int(self.cursor) as usize;
        while i < self.vars.len() && store.is_bound(self.vars[i]) {
            i += 1;
        }
        store.set_int(self.cursor, i as IntCst);
        self.vars.get(i).copied()
    }
}

/// Smallest-domain-first, with a configurable bound preference on ties and
/// scope order as the final tie break.
pub struct MinSize {
    vars: Vec<VarRef>,
    tie: TieBreak,
}

impl MinSize {
    pub fn new(vars: Vec<VarRef>, tie: TieBreak) -> Self {
        MinSize { vars, tie }
    }

    fn tie_key(&self, store: &Store, var: VarRef) -> IntCst {
        match self.tie {
            TieBreak::LowestMin => store.min(var),
            TieBreak::HighestMin => -store.min(var),
            TieBreak::LowestMax => store.max(var),
            TieBreak::HighestMax => -store.max(var),
        }
    }
}

impl VariableSelector for MinSize {
    fn select(&mut self, store: &mut Store) -> Option<VarRef> {
        let mut best: Option<(IntCst, IntCst, VarRef)> = None;
        for &var in &self.vars {
            if store.is_bound(var) {
                continue;
            }
            let key = (store.size(var), self.tie_key(store, var));
            match best {
                Some((size, tie, _)) if (size, tie) <= key => {}
                _ => best = Some((key.0, key.1, var)),
            }
        }
        best.map(|(_, _, var)| var)
    }
}

/// Uniformly random choice among the unbound candidates.
pub struct RandomVar {
    vars: Vec<VarRef>,
    rng: SmallRng,
}

impl RandomVar {
    pub fn new(vars: Vec<VarRef>, seed: u64) -> Self {
        RandomVar {
            vars,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl VariableSelector for RandomVar {
    fn select(&mut self, store: &mut Store) -> Option<VarRef> {
        let unbound = self.vars.iter().filter(|&&v| !store.is_bound(v)).count();
        if unbound == 0 {
            return None;
        }
        let k = self.rng.random_range(0..unbound);
        self.vars
            .iter()
            .copied()
            .filter(|&v| !store.is_bound(v))
            .nth(k)
    }
}

/// Unbound variable minimizing a caller-supplied cost, scope order on ties.
pub struct CheapestVar {
    vars: Vec<VarRef>,
    cost: Box<dyn Fn(&Store, VarRef) -> IntCst>,
}

impl CheapestVar {
    pub fn new(vars: Vec<VarRef>, cost: Box<dyn Fn(&Store, VarRef) -> IntCst>) -> Self {
        CheapestVar { vars, cost }
    }
}

impl VariableSelector for CheapestVar {
    fn select(&mut self, store: &mut Store) -> Option<VarRef> {
        let mut best: Option<(IntCst, VarRef)> = None;
        for &var in &self.vars {
            if store.is_bound(var) {
                continue;
            }
            let c = (self.cost)(store, var);
            match best {
                Some((bc, _)) if bc <= c => {}
                _ => best = Some((c, var)),
            }
        }
        best.map(|(_, var)| var)
    }
}

/// Selector for successor models where `vars[i] = j` means "j follows i".
///
/// Starting from the last extended position, it walks the chain of bound
/// successors and proposes the variable at the end of the chain, so that the
/// search extends one path instead of scattering assignments. Chain walking
/// is capped at the scope size to survive cycles; when no chain can be
/// extended, a new one starts at an unbound variable that no other variable
/// can precede, or at the first unbound one when every candidate has a
/// possible predecessor.
pub struct Path {
    vars: Vec<VarRef>,
    /// Index of the start of the chain to extend, or -1.
    first: TrailedInt,
}

impl Path {
    pub fn new(store: &mut Store, vars: Vec<VarRef>) -> Self {
        let first = store.new_trailed_int(-1);
        Path { vars, first }
    }

    /// Follows bound successors from `start`, returning the first unbound
    /// variable reached, if any.
    fn chain_end(&self, store: &Store, start: usize) -> Option<usize> {
        let mut i = start;
        let mut hops = 0;
        while i < self.vars.len() && store.is_bound(self.vars[i]) {
            if hops >= self.vars.len() {
                return None; // cycle
            }
            let next = store.value(self.vars[i]);
            if next < 0 || next as usize >= self.vars.len() {
                return None;
            }
            i = next as usize;
            hops += 1;
        }
        if i < self.vars.len() {
            Some(i)
        } else {
            None
        }
    }

    /// Index at which to start a fresh chain: an unbound variable whose index
    /// appears in no other variable's domain (nothing can precede it), or the
    /// first unbound one.
    fn path_start(&self, store: &Store) -> Option<usize> {
        let mut fallback = None;
        for (i, &var) in self.vars.iter().enumerate() {
            if store.is_bound(var) {
                continue;
            }
            if fallback.is_none() {
                fallback = Some(i);
            }
            let has_predecessor = self
                .vars
                .iter()
                .enumerate()
                .any(|(j, &other)| j != i && store.contains(other, i as IntCst));
            if !has_predecessor {
                return Some(i);
            }
        }
        fallback
    }
}

impl VariableSelector for Path {
    fn select(&mut self, store: &mut Store) -> Option<VarRef> {
        let first = store.get_int(self.first);
        if first >= 0 {
            if let Some(end) = self.chain_end(store, first as usize) {
                store.set_int(self.first, end as IntCst);
                return Some(self.vars[end]);
            }
        }
        // no extendable chain, start a new one
        if let Some(i) = self.path_start(store) {
            store.set_int(self.first, i as IntCst);
            return Some(self.vars[i]);
        }
        None
    }
}
