// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Reduction cycles and fan-in calibration
//!
//! Several sources may publish under one metric name with the same logical
//! timestamp. Their readings form one *cycle* that is reduced to a single
//! value. How many sources take part (the fan-in) is not configured: it is
//! learned once, from the burst of readings that share the very first
//! timestamp, and frozen afterwards.
//!
//! ```text
//!   Bootstrapping ──first reading──▶ Learning ──next timestamp──▶ Steady
//!                                    (count burst)               (fan-in frozen)
//! ```

use serde::{Deserialize, Serialize};

use crate::descriptor::ReductionStrategy;
use crate::payload::Reading;

/// Counts the sources of the first timestamp burst
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    timestamp: f64,
    sources: u32,
}

impl Calibration {
    /// Start counting at the first reading's timestamp
    pub fn start(timestamp: f64) -> Self {
        Self {
            timestamp,
            sources: 1,
        }
    }

    /// Record one more reading with the same timestamp
    pub fn observe(&mut self) {
        self.sources = self.sources.saturating_add(1);
    }

    /// Timestamp of the burst being counted
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Sources counted so far
    pub fn sources(&self) -> u32 {
        self.sources
    }

    /// Freeze the count as the metric's fan-in
    pub fn finish(self) -> u32 {
        self.sources.max(1)
    }
}

/// Learn the fan-in from the start of a reading stream
///
/// Counts the leading readings that share the first reading's timestamp.
/// An empty burst yields a fan-in of 1.
pub fn learn<I>(first_burst: I) -> u32
where
    I: IntoIterator<Item = Reading>,
{
    let mut readings = first_burst.into_iter();
    let Some(first) = readings.next() else {
        return 1;
    };

    let mut calibration = Calibration::start(first.timestamp);
    for reading in readings {
        if reading.timestamp != calibration.timestamp() {
            break;
        }
        calibration.observe();
    }
    calibration.finish()
}

/// Life-cycle phase of a metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// No reading seen yet
    Bootstrapping,
    /// Inside the first timestamp; duplicates count as additional sources
    Learning(Calibration),
    /// Fan-in frozen; cycles are reduced and finalized
    Steady {
        /// Number of sources per cycle
        fan_in: u32,
    },
}

impl Phase {
    /// Fan-in as currently known (still growing while learning)
    pub fn fan_in(&self) -> u32 {
        match self {
            Phase::Bootstrapping => 1,
            Phase::Learning(calibration) => calibration.sources(),
            Phase::Steady { fan_in } => *fan_in,
        }
    }

    /// Phase after a new distinct timestamp arrives
    pub fn advance(self, timestamp: f64) -> Phase {
        match self {
            Phase::Bootstrapping => Phase::Learning(Calibration::start(timestamp)),
            Phase::Learning(calibration) => Phase::Steady {
                fan_in: calibration.finish(),
            },
            steady @ Phase::Steady { .. } => steady,
        }
    }

    /// Whether cycles are being reduced
    pub fn is_steady(&self) -> bool {
        matches!(self, Phase::Steady { .. })
    }

    /// Short lower-case name
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Bootstrapping => "bootstrapping",
            Phase::Learning(_) => "learning",
            Phase::Steady { .. } => "steady",
        }
    }
}

/// What to do with a cycle that a new timestamp interrupts before all
/// sources reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallPolicy {
    /// Drop the partial cycle; the previous result stays current
    #[default]
    Discard,
    /// Finalize from the readings that did arrive
    FinalizePartial,
}

impl ReductionStrategy {
    /// Fold one reading into the running accumulator
    pub fn fold(&self, accumulator: f64, value: f64) -> f64 {
        match self {
            ReductionStrategy::Average | ReductionStrategy::Sum => accumulator + value,
            ReductionStrategy::Min => accumulator.min(value),
            ReductionStrategy::Max => accumulator.max(value),
        }
    }

    /// Turn the accumulator of a cycle with `readings` readings into its result
    pub fn finish(&self, accumulator: f64, readings: u32) -> f64 {
        match self {
            ReductionStrategy::Average => accumulator / f64::from(readings.max(1)),
            _ => accumulator,
        }
    }

    /// Reduce a whole cycle at once
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        let (first, rest) = values.split_first()?;
        let accumulator = rest.iter().fold(*first, |acc, v| self.fold(acc, *v));
        let readings = u32::try_from(values.len()).unwrap_or(u32::MAX);
        Some(self.finish(accumulator, readings))
    }
}
