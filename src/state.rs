// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Per-metric aggregation state machine
//!
//! [`MetricState`] consumes decoded readings one at a time, learns the fan-in,
//! reduces each cycle and reports when a cycle completes. It owns no locks and
//! no history; [`crate::metric::Metric`] wraps it for shared use.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::cycle::{Phase, StallPolicy};
use crate::descriptor::MetricConfig;
use crate::payload::Reading;
use crate::unit::UnitProvider;

/// A cycle that was just finalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completion {
    /// Reduced value before unit conversion and scaling
    pub raw: f64,
    /// Finalized from fewer readings than the fan-in
    pub partial: bool,
}

/// Counters kept per metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricStats {
    /// Decoded readings ingested
    pub readings: u64,
    /// Payloads that failed to decode (counted outside the state)
    pub dropped_payloads: u64,
    /// Cycles finalized
    pub completed_cycles: u64,
    /// Cycles interrupted before all sources reported
    pub stalled_cycles: u64,
    /// Readings beyond the fan-in within one cycle
    pub overflow_readings: u64,
}

/// Mutable aggregation state of one metric
#[derive(Debug, Clone)]
pub struct MetricState {
    config: Arc<MetricConfig>,
    stall_policy: StallPolicy,
    phase: Phase,
    last_timestamp: Option<f64>,
    last_elapsed: f64,
    running: Option<f64>,
    finalized: Option<f64>,
    iteration_count: u64,
    sub_iteration_count: u32,
    stats: MetricStats,
}

impl MetricState {
    /// Create the zeroed state for a metric
    pub fn new(config: Arc<MetricConfig>) -> Self {
        Self {
            config,
            stall_policy: StallPolicy::default(),
            phase: Phase::Bootstrapping,
            last_timestamp: None,
            last_elapsed: 0.0,
            running: None,
            finalized: None,
            iteration_count: 0,
            sub_iteration_count: 0,
            stats: MetricStats::default(),
        }
    }

    /// Set the policy for interrupted cycles
    pub fn with_stall_policy(mut self, policy: StallPolicy) -> Self {
        self.stall_policy = policy;
        self
    }

    /// Change the policy for interrupted cycles
    pub fn set_stall_policy(&mut self, policy: StallPolicy) {
        self.stall_policy = policy;
    }

    /// Feed one reading
    ///
    /// Returns the cycle finalized by this reading, if any. Single-source
    /// metrics have no duplicate readings, so their cycle is reported complete
    /// when the next distinct timestamp arrives.
    pub fn ingest(&mut self, reading: Reading) -> Option<Completion> {
        self.stats.readings += 1;
        if self.last_timestamp == Some(reading.timestamp) {
            self.ingest_duplicate(reading.value)
        } else {
            self.ingest_distinct(reading)
        }
    }

    fn ingest_duplicate(&mut self, value: f64) -> Option<Completion> {
        self.sub_iteration_count = self.sub_iteration_count.saturating_add(1);

        let fan_in = match self.phase {
            Phase::Bootstrapping => return None,
            Phase::Learning(ref mut calibration) => {
                calibration.observe();
                return None;
            }
            Phase::Steady { fan_in } => fan_in,
        };

        if self.sub_iteration_count > fan_in {
            self.stats.overflow_readings += 1;
            debug!(
                "metric {}: reading {} exceeds fan-in {}, ignored",
                self.config.name, self.sub_iteration_count, fan_in
            );
            return None;
        }

        let reduction = self.config.reduction;
        let running = match self.running {
            Some(accumulator) => reduction.fold(accumulator, value),
            None => value,
        };
        self.running = Some(running);

        if self.sub_iteration_count == fan_in {
            let raw = reduction.finish(running, fan_in);
            Some(self.finalize(raw, false))
        } else {
            None
        }
    }

    fn ingest_distinct(&mut self, reading: Reading) -> Option<Completion> {
        if let Some(last) = self.last_timestamp {
            self.last_elapsed = reading.timestamp - last;
        }

        let completion = match self.phase {
            Phase::Bootstrapping => None,
            Phase::Learning(calibration) => {
                let fan_in = calibration.finish();
                info!("metric {}: learned fan-in {}", self.config.name, fan_in);
                if fan_in == 1 {
                    self.close_single()
                } else {
                    None
                }
            }
            Phase::Steady { fan_in: 1 } => self.close_single(),
            Phase::Steady { fan_in } => self.close_interrupted(fan_in),
        };

        self.phase = self.phase.advance(reading.timestamp);
        self.running = Some(reading.value);
        self.sub_iteration_count = 1;
        self.iteration_count += 1;
        self.last_timestamp = Some(reading.timestamp);
        completion
    }

    // The single reading of the previous timestamp is a complete cycle
    fn close_single(&mut self) -> Option<Completion> {
        let raw = self.running?;
        Some(self.finalize(raw, false))
    }

    fn close_interrupted(&mut self, fan_in: u32) -> Option<Completion> {
        let seen = self.sub_iteration_count;
        if seen == 0 || seen >= fan_in {
            return None;
        }

        self.stats.stalled_cycles += 1;
        match self.stall_policy {
            StallPolicy::Discard => {
                warn!(
                    "metric {}: cycle at {:?} stalled with {}/{} readings, discarded",
                    self.config.name, self.last_timestamp, seen, fan_in
                );
                None
            }
            StallPolicy::FinalizePartial => {
                warn!(
                    "metric {}: cycle at {:?} stalled with {}/{} readings, finalized partially",
                    self.config.name, self.last_timestamp, seen, fan_in
                );
                let running = self.running?;
                let raw = self.config.reduction.finish(running, seen);
                Some(self.finalize(raw, true))
            }
        }
    }

    fn finalize(&mut self, raw: f64, partial: bool) -> Completion {
        self.finalized = Some(raw);
        self.stats.completed_cycles += 1;
        Completion { raw, partial }
    }

    /// Current value in reported units, if there is one
    ///
    /// Multi-source metrics report the last finalized cycle, single-source
    /// metrics the latest reading.
    pub fn current_value(&self, unit: &dyn UnitProvider) -> Option<f64> {
        let raw = if self.fan_in() > 1 {
            self.finalized
        } else {
            self.running
        }?;
        Some(self.config.convert(raw, unit.current_factor()))
    }

    /// Whether [`Self::current_value`] is a real sample
    pub fn is_valid(&self, unit: &dyn UnitProvider) -> bool {
        if self.iteration_count <= 1 {
            return false;
        }
        if self.config.is_energy() && unit.current_factor().is_none() {
            return false;
        }
        self.fan_in() == 1 || self.finalized.is_some()
    }

    /// Current value only when valid
    pub fn sample(&self, unit: &dyn UnitProvider) -> Option<f64> {
        if self.is_valid(unit) {
            self.current_value(unit)
        } else {
            None
        }
    }

    /// Metric configuration
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sources per cycle (still growing while learning)
    pub fn fan_in(&self) -> u32 {
        self.phase.fan_in()
    }

    /// Number of distinct timestamps seen
    pub fn iteration_count(&self) -> u64 {
        self.iteration_count
    }

    /// Readings seen for the current timestamp
    pub fn sub_iteration_count(&self) -> u32 {
        self.sub_iteration_count
    }

    /// Timestamp of the current cycle
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    /// Logical time between the last two distinct timestamps
    pub fn last_elapsed(&self) -> f64 {
        self.last_elapsed
    }

    /// Accumulator of the current cycle
    pub fn running(&self) -> Option<f64> {
        self.running
    }

    /// Raw result of the last completed cycle
    pub fn finalized(&self) -> Option<f64> {
        self.finalized
    }

    /// Counters
    pub fn stats(&self) -> MetricStats {
        self.stats
    }
}
