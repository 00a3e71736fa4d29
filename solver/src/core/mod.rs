mod domains;
pub mod propagation;

pub use domains::{Store, TrailedInt};

use std::num::NonZeroU32;

/// Type of integer constants and domain bounds.
pub type IntCst = i64;

/// Overflow-safe bounds for domain values. Keeping a margin below the
/// representable extremes lets bound arithmetic (`value + 1`, `best - step`)
/// stay in range without checked operations on every call.
pub const INT_CST_MIN: IntCst = IntCst::MIN / 4;
pub const INT_CST_MAX: IntCst = IntCst::MAX / 4;

/// Reference to an integer variable of a [Store].
///
/// The internal representation disallows the 0 value so that `Option<VarRef>`
/// fits on 32 bits.
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct VarRef(NonZeroU32);

impl VarRef {
    pub fn from_index(index: usize) -> Self {
        match NonZeroU32::new(index as u32 + 1) {
            Some(n) => VarRef(n),
            None => panic!("variable index overflow"),
        }
    }

    pub fn to_index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl std::fmt::Debug for VarRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.to_index())
    }
}

impl std::fmt::Display for VarRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.to_index())
    }
}

/// Signal of a logical failure: an empty domain, a crossed limit, a rejected
/// branch. This is the normal control-flow signal of the search, propagated
/// with `?` up to the nearest choice point with an unexplored alternative.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Failure;

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failure")
    }
}
