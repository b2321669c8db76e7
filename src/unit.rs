// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Energy unit factors
//!
//! Raw energy registers count in hardware-specific units. The factor that
//! converts them to Joules arrives on its own channel, independently of the
//! value stream, so metrics read it through a [`UnitProvider`] at the moment a
//! value is finalized or reported.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current energy unit factor
pub trait UnitProvider: Send + Sync {
    /// The current factor, or `None` while it is unknown
    ///
    /// Implementations must never return a non-positive factor.
    fn current_factor(&self) -> Option<f64>;
}

// Bit pattern of 0.0, read back as "unknown"
const UNSET: u64 = 0;

/// Settable unit factor shared between the unit channel and every metric
///
/// Clones share the same underlying value. Reads and writes are lock-free.
#[derive(Clone, Default)]
pub struct SharedUnitFactor {
    bits: Arc<AtomicU64>,
}

impl SharedUnitFactor {
    /// Create an unknown factor
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an already-known factor
    pub fn with_factor(factor: f64) -> Self {
        let shared = Self::new();
        shared.set(factor);
        shared
    }

    /// Update the factor; values that are not positive and finite clear it
    pub fn set(&self, factor: f64) {
        let bits = if factor.is_finite() && factor > 0.0 {
            factor.to_bits()
        } else {
            UNSET
        };
        self.bits.store(bits, Ordering::Release);
    }

    /// Forget the factor
    pub fn clear(&self) {
        self.bits.store(UNSET, Ordering::Release);
    }

    /// Whether a factor is known
    pub fn is_known(&self) -> bool {
        self.current_factor().is_some()
    }
}

impl UnitProvider for SharedUnitFactor {
    fn current_factor(&self) -> Option<f64> {
        let factor = f64::from_bits(self.bits.load(Ordering::Acquire));
        (factor > 0.0).then_some(factor)
    }
}

impl fmt::Debug for SharedUnitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedUnitFactor")
            .field("factor", &self.current_factor())
            .finish()
    }
}

/// Factor fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedUnitFactor(Option<f64>);

impl FixedUnitFactor {
    /// A known factor; non-positive values are treated as unknown
    pub fn new(factor: f64) -> Self {
        Self((factor.is_finite() && factor > 0.0).then_some(factor))
    }

    /// A factor that is never known
    pub const fn unknown() -> Self {
        Self(None)
    }
}

impl UnitProvider for FixedUnitFactor {
    fn current_factor(&self) -> Option<f64> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_starts_unknown() {
        let unit = SharedUnitFactor::new();
        assert_eq!(unit.current_factor(), None);
        assert!(!unit.is_known());
    }

    #[test]
    fn test_shared_set_and_clear() {
        let unit = SharedUnitFactor::new();
        unit.set(6.103515625e-5);
        assert_eq!(unit.current_factor(), Some(6.103515625e-5));
        unit.clear();
        assert_eq!(unit.current_factor(), None);
    }

    #[test]
    fn test_shared_rejects_non_positive() {
        let unit = SharedUnitFactor::with_factor(2.0);
        unit.set(-1.0);
        assert_eq!(unit.current_factor(), None);
        unit.set(f64::NAN);
        assert_eq!(unit.current_factor(), None);
        unit.set(0.0);
        assert_eq!(unit.current_factor(), None);
    }

    #[test]
    fn test_shared_clones_share_value() {
        let unit = SharedUnitFactor::new();
        let other = unit.clone();
        unit.set(2.0);
        assert_eq!(other.current_factor(), Some(2.0));
    }

    #[test]
    fn test_fixed() {
        assert_eq!(FixedUnitFactor::new(0.5).current_factor(), Some(0.5));
        assert_eq!(FixedUnitFactor::new(0.0).current_factor(), None);
        assert_eq!(FixedUnitFactor::unknown().current_factor(), None);
    }
}
