//! Helpers for configuration values.

use std::cmp;

//------------ DefMinMax -----------------------------------------------------

/// The default value and the permitted range of a config variable.
#[derive(Clone, Copy, Debug)]
pub struct DefMinMax<T> {
    /// The value used if nothing is configured.
    def: T,

    /// The smallest value accepted.
    min: T,

    /// The largest value accepted.
    max: T,
}

impl<T> DefMinMax<T> {
    /// Creates a new value.
    pub const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    pub fn default(self) -> T {
        self.def
    }

    /// Clamps the given value into the permitted range.
    pub fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//============ Testing =======================================================
