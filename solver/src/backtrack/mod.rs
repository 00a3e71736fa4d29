mod arena;
mod trail;

pub use arena::{ObjRef, RevArena};
pub use trail::Trail;

use std::num::NonZeroU32;

/// Represents a decision level.
///
/// The ROOT is the level at which no decision has been made.
/// Each time a decision is made, the decision level increases.
///
/// As a layout optimization, the internal representation disallows the 0 value.
/// This enables the compiler to use this value to represent an `Option<DecLvl>`
/// on 32 bits (rather than 64 without this optimisation).
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct DecLvl(NonZeroU32);

impl DecLvl {
    /// Represents the root decision level, at which no decision has been taken yet.
    pub const ROOT: DecLvl = Self::new(0);

    pub const fn new(num_saved: u32) -> Self {
        match NonZeroU32::new(num_saved + 1) {
            Some(n) => DecLvl(n),
            None => panic!("decision level overflow"),
        }
    }

    /// Returns an integer representation of the decision level.
    /// 0 represents the ROOT.
    pub fn to_int(self) -> u32 {
        self.0.get() - 1
    }
}

impl Default for DecLvl {
    fn default() -> Self {
        Self::ROOT
    }
}

impl std::ops::Add<i32> for DecLvl {
    type Output = DecLvl;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Self::new(((self.to_int() as i32) + rhs) as u32)
    }
}
impl std::ops::AddAssign<i32> for DecLvl {
    fn add_assign(&mut self, rhs: i32) {
        *self = *self + rhs
    }
}
impl std::ops::Sub<i32> for DecLvl {
    type Output = DecLvl;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        self + (-rhs)
    }
}
impl std::ops::SubAssign<i32> for DecLvl {
    fn sub_assign(&mut self, rhs: i32) {
        *self = *self - rhs
    }
}

impl From<u32> for DecLvl {
    fn from(u: u32) -> Self {
        DecLvl::new(u)
    }
}
impl From<usize> for DecLvl {
    fn from(u: usize) -> Self {
        DecLvl::new(u as u32)
    }
}
impl From<DecLvl> for usize {
    fn from(dl: DecLvl) -> Self {
        dl.to_int() as usize
    }
}

impl std::fmt::Debug for DecLvl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dl({})", self.to_int())
    }
}

/// Ability to save the current state and restore any previously saved one.
///
/// Restoration is always in LIFO order: restoring to a given level undoes
/// everything that happened at the more recent levels.
pub trait Backtrack {
    fn save_state(&mut self) -> DecLvl;
    fn num_saved(&self) -> u32;
    fn current_decision_level(&self) -> DecLvl {
        DecLvl::new(self.num_saved())
    }
    fn restore_last(&mut self);
    fn restore(&mut self, saved_id: DecLvl) {
        while self.current_decision_level() > saved_id {
            self.restore_last();
        }
    }

    fn reset(&mut self) {
        if self.current_decision_level() > DecLvl::ROOT {
            self.restore(DecLvl::ROOT);
        }
    }
}

/// A simple counter that allows tracking the current decision level.
#[derive(Copy, Clone, Debug, Default)]
pub struct DecisionLevelTracker(DecLvl);

impl DecisionLevelTracker {
    pub fn new() -> Self {
        DecisionLevelTracker(DecLvl::ROOT)
    }
}

impl Backtrack for DecisionLevelTracker {
    fn save_state(&mut self) -> DecLvl {
        self.0 += 1;
        self.0
    }

    fn num_saved(&self) -> u32 {
        self.0.to_int()
    }

    fn restore_last(&mut self) {
        self.0 -= 1
    }
}
