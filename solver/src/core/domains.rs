use crate::backtrack::{Backtrack, DecLvl, Trail};
use crate::core::{Failure, IntCst, VarRef, INT_CST_MAX, INT_CST_MIN};
use hashbrown::HashSet;

/// Reference to a reversible integer cell of a [Store].
///
/// Writing through [Store::set_int] records the previous value on the trail,
/// so the cell transparently recovers its old content on backtrack. All
/// reversible cursors of the search components (scan positions, composition
/// indices, FIFO lengths) are kept in such cells.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TrailedInt(u32);

/// Undo event of the store.
enum Event {
    LbChanged { var: VarRef, previous: IntCst },
    UbChanged { var: VarRef, previous: IntCst },
    HoleAdded { var: VarRef, value: IntCst },
    IntChanged { cell: u32, previous: IntCst },
}

/// Integer variable store with reversible domains.
///
/// Domains are represented as an interval `[lb, ub]` plus a set of holes for
/// values removed strictly inside the interval. Every mutation pushes its undo
/// event on the trail; mutations that can empty a domain return
/// `Err(Failure)` when they do.
///
/// The store is the single shared mutable structure of the search: any state
/// that must survive backtracking correctly goes through it, either as a
/// variable domain or as a reversible cell.
pub struct Store {
    lbs: Vec<IntCst>,
    ubs: Vec<IntCst>,
    holes: Vec<HashSet<IntCst>>,
    cells: Vec<IntCst>,
    trail: Trail<Event>,
    /// Incremented on every effective domain change, including at the root.
    /// Used by the propagation loop to detect its fixpoint.
    stamp: u64,
}

impl Store {
    pub fn new() -> Store {
        Store {
            lbs: vec![],
            ubs: vec![],
            holes: vec![],
            cells: vec![],
            trail: Trail::new(),
            stamp: 0,
        }
    }

    pub fn new_var(&mut self, lb: IntCst, ub: IntCst) -> VarRef {
        assert!(lb <= ub, "empty initial domain [{lb}, {ub}]");
        assert!((INT_CST_MIN..=INT_CST_MAX).contains(&lb));
        assert!((INT_CST_MIN..=INT_CST_MAX).contains(&ub));
        let var = VarRef::from_index(self.lbs.len());
        self.lbs.push(lb);
        self.ubs.push(ub);
        self.holes.push(HashSet::new());
        var
    }

    pub fn num_vars(&self) -> usize {
        self.lbs.len()
    }

    pub fn variables(&self) -> impl Iterator<Item = VarRef> + '_ {
        (0..self.num_vars()).map(VarRef::from_index)
    }

    /// A counter incremented on every effective domain change.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    // ===================== domains ========================

    pub fn min(&self, var: VarRef) -> IntCst {
        self.lbs[var.to_index()]
    }

    pub fn max(&self, var: VarRef) -> IntCst {
        self.ubs[var.to_index()]
    }

    pub fn is_bound(&self, var: VarRef) -> bool {
        self.min(var) == self.max(var)
    }

    /// Value of a bound variable.
    pub fn value(&self, var: VarRef) -> IntCst {
        debug_assert!(self.is_bound(var), "{var:?} is not bound");
        self.min(var)
    }

    /// Number of values in the domain.
    pub fn size(&self, var: VarRef) -> IntCst {
        let (lb, ub) = (self.min(var), self.max(var));
        let holes = self.holes[var.to_index()]
            .iter()
            .filter(|&&v| lb < v && v < ub)
            .count();
        ub - lb + 1 - holes as IntCst
    }

    pub fn contains(&self, var: VarRef, value: IntCst) -> bool {
        self.min(var) <= value && value <= self.max(var) && !self.holes[var.to_index()].contains(&value)
    }

    /// Iterates over the present values of the domain, in increasing order.
    pub fn domain_values(&self, var: VarRef) -> impl Iterator<Item = IntCst> + '_ {
        (self.min(var)..=self.max(var)).filter(move |&v| self.contains(var, v))
    }

    /// Raises the lower bound to at least `new_lb`, skipping over holes.
    /// Returns `Ok(true)` if the domain changed, `Err(Failure)` if it became empty.
    pub fn set_min(&mut self, var: VarRef, new_lb: IntCst) -> Result<bool, Failure> {
        let lb = self.min(var);
        if new_lb <= lb {
            return Ok(false);
        }
        let mut new_lb = new_lb;
        while new_lb <= self.max(var) && self.holes[var.to_index()].contains(&new_lb) {
            new_lb += 1;
        }
        self.trail.push(Event::LbChanged { var, previous: lb });
        self.lbs[var.to_index()] = new_lb;
        self.stamp += 1;
        if new_lb > self.max(var) {
            Err(Failure)
        } else {
            Ok(true)
        }
    }

    /// Lowers the upper bound to at most `new_ub`, skipping over holes.
    /// Returns `Ok(true)` if the domain changed, `Err(Failure)` if it became empty.
    pub fn set_max(&mut self, var: VarRef, new_ub: IntCst) -> Result<bool, Failure> {
        let ub = self.max(var);
        if new_ub >= ub {
            return Ok(false);
        }
        let mut new_ub = new_ub;
        while new_ub >= self.min(var) && self.holes[var.to_index()].contains(&new_ub) {
            new_ub -= 1;
        }
        self.trail.push(Event::UbChanged { var, previous: ub });
        self.ubs[var.to_index()] = new_ub;
        self.stamp += 1;
        if new_ub < self.min(var) {
            Err(Failure)
        } else {
            Ok(true)
        }
    }

    /// Binds the variable to `value`, failing if the value is not present.
    pub fn set_value(&mut self, var: VarRef, value: IntCst) -> Result<bool, Failure> {
        if !self.contains(var, value) {
            // leave a record of the attempt so that the propagation loop
            // re-runs after backtracking past this point
            self.stamp += 1;
            return Err(Failure);
        }
        let a = self.set_min(var, value)?;
        let b = self.set_max(var, value)?;
        Ok(a || b)
    }

    /// Removes a single value from the domain.
    pub fn remove_value(&mut self, var: VarRef, value: IntCst) -> Result<bool, Failure> {
        if !self.contains(var, value) {
            return Ok(false);
        }
        if self.min(var) == value {
            self.set_min(var, value + 1)
        } else if self.max(var) == value {
            self.set_max(var, value - 1)
        } else {
            self.trail.push(Event::HoleAdded { var, value });
            self.holes[var.to_index()].insert(value);
            self.stamp += 1;
            Ok(true)
        }
    }

    // ===================== reversible cells ========================

    pub fn new_trailed_int(&mut self, init: IntCst) -> TrailedInt {
        let cell = self.cells.len() as u32;
        self.cells.push(init);
        TrailedInt(cell)
    }

    pub fn get_int(&self, cell: TrailedInt) -> IntCst {
        self.cells[cell.0 as usize]
    }

    /// Records the previous value on the trail, then writes the new one.
    /// No-op if the value is unchanged.
    pub fn set_int(&mut self, cell: TrailedInt, value: IntCst) {
        let previous = self.cells[cell.0 as usize];
        if previous == value {
            return;
        }
        self.trail.push(Event::IntChanged { cell: cell.0, previous });
        self.cells[cell.0 as usize] = value;
    }
}

impl Backtrack for Store {
    fn save_state(&mut self) -> DecLvl {
        self.trail.save_state()
    }

    fn num_saved(&self) -> u32 {
        self.trail.num_saved()
    }

    fn restore_last(&mut self) {
        let lbs = &mut self.lbs;
        let ubs = &mut self.ubs;
        let holes = &mut self.holes;
        let cells = &mut self.cells;
        self.trail.restore_last_with(|e| match e {
            Event::LbChanged { var, previous } => lbs[var.to_index()] = previous,
            Event::UbChanged { var, previous } => ubs[var.to_index()] = previous,
            Event::HoleAdded { var, value } => {
                holes[var.to_index()].remove(&value);
            }
            Event::IntChanged { cell, previous } => cells[cell as usize] = previous,
        });
        self.stamp += 1;
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_ops() {
        let mut store = Store::new();
        let x = store.new_var(0, 9);
        assert_eq!(store.size(x), 10);
        assert!(store.contains(x, 0) && store.contains(x, 9));
        assert!(!store.contains(x, 10));

        assert_eq!(store.remove_value(x, 4), Ok(true));
        assert_eq!(store.size(x), 9);
        assert!(!store.contains(x, 4));

        // raising the lower bound onto a hole skips past it
        assert_eq!(store.set_min(x, 4), Ok(true));
        assert_eq!(store.min(x), 5);

        assert_eq!(store.set_max(x, 5), Ok(true));
        assert!(store.is_bound(x));
        assert_eq!(store.value(x), 5);

        assert_eq!(store.set_min(x, 6), Err(Failure));
    }

    #[test]
    fn test_backtrack_restores_domains() {
        let mut store = Store::new();
        let x = store.new_var(0, 9);
        store.save_state();
        store.set_min(x, 3).unwrap();
        store.remove_value(x, 5).unwrap();
        store.save_state();
        store.set_value(x, 7).unwrap();

        store.restore_last();
        assert_eq!((store.min(x), store.max(x)), (3, 9));
        assert!(!store.contains(x, 5));

        store.restore_last();
        assert_eq!((store.min(x), store.max(x)), (0, 9));
        assert!(store.contains(x, 5));
    }

    /// LIFO undo correctness: the value visible after backtracking to depth d
    /// is the value that was live when depth first reached d+1.
    #[test]
    fn test_trailed_int_round_trip() {
        let mut store = Store::new();
        let c = store.new_trailed_int(0);

        let mut live_at_entry = vec![store.get_int(c)]; // value when entering each depth
        for depth in 1..=20 {
            store.save_state();
            live_at_entry.push(store.get_int(c));
            // several writes per level, interleaved with no-ops
            store.set_int(c, depth * 10);
            store.set_int(c, depth * 10); // unchanged, not trailed
            store.set_int(c, depth * 10 + 1);
        }
        for depth in (0..20).rev() {
            store.restore_last();
            assert_eq!(store.get_int(c), live_at_entry[depth + 1]);
            assert_eq!(store.current_decision_level(), DecLvl::new(depth as u32));
        }
        assert_eq!(store.get_int(c), 0);
    }

    #[test]
    fn test_set_value_on_absent_value_fails() {
        let mut store = Store::new();
        let x = store.new_var(0, 5);
        store.save_state();
        store.remove_value(x, 3).unwrap();
        assert_eq!(store.set_value(x, 3), Err(Failure));
        store.restore_last();
        assert_eq!(store.set_value(x, 3), Ok(true));
    }
}
