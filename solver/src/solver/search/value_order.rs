//! Value selection heuristics, the second half of an assignment strategy.
//!
//! A selector proposes one value from the domain of an unbound variable. The
//! proposal does not mutate the store; the engine turns it into a decision.

use crate::core::{IntCst, Store, VarRef};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub trait ValueSelector {
    /// Picks a value in the domain of `var`. Only called on unbound variables.
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst;
}

/// Parameterless value strategies, for configuration surfaces.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValStrategy {
    Min,
    Max,
    Random { seed: u64 },
    /// Value closest to the middle of the interval.
    Center,
}

impl ValStrategy {
    pub fn build(self) -> Box<dyn ValueSelector> {
        match self {
            ValStrategy::Min => Box::new(MinValue),
            ValStrategy::Max => Box::new(MaxValue),
            ValStrategy::Random { seed } => Box::new(RandomValue::new(seed)),
            ValStrategy::Center => Box::new(CenterValue),
        }
    }
}

pub struct MinValue;

impl ValueSelector for MinValue {
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst {
        store.min(var)
    }
}

pub struct MaxValue;

impl ValueSelector for MaxValue {
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst {
        store.max(var)
    }
}

/// Uniformly random value of the domain.
///
/// Dense domains (at least a quarter of the interval present) are sampled by
/// rejection on the interval; sparse ones by rank from the nearer end, so
/// that neither shape degenerates.
pub struct RandomValue {
    rng: SmallRng,
}

impl RandomValue {
    pub fn new(seed: u64) -> Self {
        RandomValue {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl ValueSelector for RandomValue {
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst {
        let (lb, ub) = (store.min(var), store.max(var));
        let span = ub - lb + 1;
        let size = store.size(var);
        if size * 4 >= span {
            loop {
                let v = self.rng.random_range(lb..=ub);
                if store.contains(var, v) {
                    return v;
                }
            }
        }
        // sparse: pick the k-th present value, counting from the nearer end
        let k = self.rng.random_range(0..size) as usize;
        if (k as IntCst) * 2 < size {
            store.domain_values(var).nth(k).unwrap()
        } else {
            let from_top = (size as usize) - 1 - k;
            let mut v = ub;
            let mut skipped = 0;
            loop {
                if store.contains(var, v) {
                    if skipped == from_top {
                        return v;
                    }
                    skipped += 1;
                }
                v -= 1;
            }
        }
    }
}

/// Value closest to the center of the interval, preferring the lower value
/// on equidistant pairs.
pub struct CenterValue;

impl ValueSelector for CenterValue {
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst {
        let (lb, ub) = (store.min(var), store.max(var));
        let mid = (lb + ub) / 2;
        for delta in 0.. {
            let lo = mid - delta;
            if lo >= lb && store.contains(var, lo) {
                return lo;
            }
            let hi = mid + delta;
            if hi <= ub && store.contains(var, hi) {
                return hi;
            }
        }
        unreachable!("unbound variable with an empty domain")
    }
}

/// Value minimizing a caller-supplied cost.
///
/// Costs of a variable are cached between calls on the same variable while
/// its domain is unchanged; ties go to a secondary selector when provided,
/// otherwise to the smaller value.
pub struct CheapestValue {
    cost: Box<dyn Fn(&Store, VarRef, IntCst) -> IntCst>,
    tie_break: Option<Box<dyn Fn(&Store, VarRef, &[IntCst]) -> IntCst>>,
    cache: Option<(VarRef, u64, IntCst)>,
}

impl CheapestValue {
    pub fn new(cost: Box<dyn Fn(&Store, VarRef, IntCst) -> IntCst>) -> Self {
        CheapestValue {
            cost,
            tie_break: None,
            cache: None,
        }
    }

    /// Secondary selector invoked with all minimum-cost values.
    pub fn with_tie_break(mut self, tie_break: Box<dyn Fn(&Store, VarRef, &[IntCst]) -> IntCst>) -> Self {
        self.tie_break = Some(tie_break);
        self
    }
}

impl ValueSelector for CheapestValue {
    fn select(&mut self, store: &Store, var: VarRef) -> IntCst {
        if let Some((v, stamp, value)) = self.cache {
            if v == var && stamp == store.stamp() {
                return value;
            }
        }
        let mut best_cost = IntCst::MAX;
        let mut ties: Vec<IntCst> = vec![];
        for value in store.domain_values(var) {
            let c = (self.cost)(store, var, value);
            if c < best_cost {
                best_cost = c;
                ties.clear();
                ties.push(value);
            } else if c == best_cost {
                ties.push(value);
            }
        }
        let choice = match (&self.tie_break, ties.len()) {
            (Some(tb), n) if n > 1 => tb(store, var, &ties),
            _ => ties[0],
        };
        self.cache = Some((var, store.stamp(), choice));
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_values() {
        let mut store = Store::new();
        let x = store.new_var(2, 8);
        store.remove_value(x, 2).unwrap();
        store.remove_value(x, 8).unwrap();
        assert_eq!(MinValue.select(&store, x), 3);
        assert_eq!(MaxValue.select(&store, x), 7);
    }

    #[test]
    fn test_center_spirals_outward() {
        let mut store = Store::new();
        let x = store.new_var(0, 10);
        assert_eq!(CenterValue.select(&store, x), 5);
        store.remove_value(x, 5).unwrap();
        assert_eq!(CenterValue.select(&store, x), 4);
        store.remove_value(x, 4).unwrap();
        assert_eq!(CenterValue.select(&store, x), 6);
    }

    #[test]
    fn test_random_value_respects_holes() {
        let mut store = Store::new();
        let x = store.new_var(0, 20);
        for v in [3, 4, 5, 10, 15, 16] {
            store.remove_value(x, v).unwrap();
        }
        let mut sel = RandomValue::new(42);
        for _ in 0..200 {
            let v = sel.select(&store, x);
            assert!(store.contains(x, v));
        }
    }

    #[test]
    fn test_random_value_sparse_domain() {
        let mut store = Store::new();
        let x = store.new_var(0, 1000);
        for v in 1..1000 {
            if v % 100 != 0 {
                store.remove_value(x, v).unwrap();
            }
        }
        let mut sel = RandomValue::new(7);
        for _ in 0..50 {
            let v = sel.select(&store, x);
            assert!(store.contains(x, v));
        }
    }

    #[test]
    fn test_cheapest_value_with_tie_break() {
        let mut store = Store::new();
        let x = store.new_var(0, 5);
        // even values are cheap
        let mut sel = CheapestValue::new(Box::new(|_, _, v| v % 2))
            .with_tie_break(Box::new(|_, _, ties| *ties.last().unwrap()));
        assert_eq!(sel.select(&store, x), 4);

        // cache invalidated by a domain change
        store.remove_value(x, 4).unwrap();
        assert_eq!(sel.select(&store, x), 2);
    }
}
