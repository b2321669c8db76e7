// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Retained history of finalized values
//!
//! Consumers that cannot poll every cycle switch retention on and later drain
//! everything that was finalized in between. Samples are appended in the order
//! cycles complete and are only removed by [`History::drain`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One finalized value with the wall-clock instant it was captured
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Capture instant (receive side, not the payload timestamp)
    pub captured_at: DateTime<Utc>,
    /// Value in reported units
    pub value: f64,
}

/// Append-only sample buffer with an on/off switch
#[derive(Debug, Default)]
pub struct History {
    retain: AtomicBool,
    samples: Mutex<Vec<Sample>>,
}

impl History {
    /// Create an empty history
    pub fn new(retain: bool) -> Self {
        Self {
            retain: AtomicBool::new(retain),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Whether new samples are being captured
    pub fn is_retaining(&self) -> bool {
        self.retain.load(Ordering::Acquire)
    }

    /// Start or stop capturing; already captured samples are kept
    pub fn set_retaining(&self, retain: bool) {
        self.retain.store(retain, Ordering::Release);
    }

    /// Capture `value` now, if retention is on
    pub fn record(&self, value: f64) -> bool {
        self.record_at(Utc::now(), value)
    }

    /// Capture `value` at an explicit instant, if retention is on
    pub fn record_at(&self, captured_at: DateTime<Utc>, value: f64) -> bool {
        if !self.is_retaining() {
            return false;
        }
        self.samples().push(Sample { captured_at, value });
        true
    }

    /// Take every captured sample, leaving the history empty
    pub fn drain(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.samples())
    }

    /// Copy of the captured samples
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples().clone()
    }

    /// Number of captured samples
    pub fn len(&self) -> usize {
        self.samples().len()
    }

    /// Whether nothing is captured
    pub fn is_empty(&self) -> bool {
        self.samples().is_empty()
    }

    fn samples(&self) -> MutexGuard<'_, Vec<Sample>> {
        // A panic mid-push cannot leave the Vec inconsistent
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let history = History::default();
        assert!(!history.is_retaining());
        assert!(!history.record(1.0));
        assert!(history.is_empty());
    }

    #[test]
    fn test_record_and_drain() {
        let history = History::new(true);
        history.record(1.0);
        history.record(2.0);
        assert_eq!(history.len(), 2);

        let drained = history.drain();
        let values: Vec<f64> = drained.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
        assert!(drained[0].captured_at <= drained[1].captured_at);
        assert!(history.is_empty());
    }

    #[test]
    fn test_toggle_keeps_samples() {
        let history = History::new(true);
        history.record(1.0);
        history.set_retaining(false);
        history.record(2.0);
        assert_eq!(history.len(), 1);
        history.set_retaining(true);
        history.record(3.0);
        assert_eq!(history.snapshot().len(), 2);
    }

    #[test]
    fn test_record_at() {
        let history = History::new(true);
        let instant = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        history.record_at(instant, 4.5);
        assert_eq!(
            history.drain(),
            vec![Sample {
                captured_at: instant,
                value: 4.5
            }]
        );
    }
}
