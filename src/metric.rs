// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Shareable metric handle
//!
//! A [`Metric`] bundles the configuration, the aggregation state, the retained
//! history and the unit provider of one subscribed name. Ingestion and reads
//! go through the same lock, so a reader never sees a half-applied reading and
//! two ingesting threads cannot interleave within one metric.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::Serialize;

use crate::cycle::StallPolicy;
use crate::descriptor::{MetricConfig, ReportedKind};
use crate::history::{History, Sample};
use crate::payload::Reading;
use crate::state::{Completion, MetricState, MetricStats};
use crate::unit::{FixedUnitFactor, UnitProvider};

/// Value in the numeric kind the metric was declared with
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportedValue {
    /// Truncated toward zero, saturating at the i64 range
    Integer(i64),
    /// Unchanged
    Double(f64),
}

impl ReportedValue {
    /// Convert a value to the given kind
    pub fn new(kind: ReportedKind, value: f64) -> Self {
        match kind {
            // `as` saturates and maps NaN to 0
            ReportedKind::Integer => ReportedValue::Integer(value as i64),
            ReportedKind::Double => ReportedValue::Double(value),
        }
    }

    /// The value as a float
    pub fn as_f64(&self) -> f64 {
        match self {
            ReportedValue::Integer(v) => *v as f64,
            ReportedValue::Double(v) => *v,
        }
    }
}

/// Point-in-time view of a metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    /// Canonical name
    pub name: String,
    /// Subscribed topic
    pub topic: String,
    /// Phase name
    pub phase: &'static str,
    /// Sources per cycle
    pub fan_in: u32,
    /// Distinct timestamps seen
    pub iterations: u64,
    /// Whether `value` is a real sample
    pub valid: bool,
    /// Current value, even when not valid
    pub value: Option<ReportedValue>,
    /// Samples waiting in the history
    pub retained: usize,
    /// Counters
    pub stats: MetricStats,
}

/// One subscribed metric
pub struct Metric {
    config: Arc<MetricConfig>,
    topic: String,
    state: Mutex<MetricState>,
    history: History,
    unit: Arc<dyn UnitProvider>,
    dropped_payloads: AtomicU64,
}

impl Metric {
    /// Create a metric subscribed at its own name, with an unknown unit factor
    pub fn new(config: MetricConfig) -> Self {
        let topic = config.name.clone();
        let config = Arc::new(config);
        Self {
            state: Mutex::new(MetricState::new(Arc::clone(&config))),
            config,
            topic,
            history: History::default(),
            unit: Arc::new(FixedUnitFactor::unknown()),
            dropped_payloads: AtomicU64::new(0),
        }
    }

    /// Parse a declaration and create the metric
    pub fn parse(declaration: &str) -> Self {
        Self::new(MetricConfig::parse(declaration))
    }

    /// Subscribe at `topic` instead of the bare name
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Read unit factors from `unit`
    pub fn with_unit_provider(mut self, unit: Arc<dyn UnitProvider>) -> Self {
        self.unit = unit;
        self
    }

    /// Handle interrupted cycles with `policy`
    pub fn with_stall_policy(mut self, policy: StallPolicy) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .set_stall_policy(policy);
        self
    }

    /// Start with history retention on or off
    pub fn with_history(self, retain: bool) -> Self {
        self.history.set_retaining(retain);
        self
    }

    /// Configuration
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Canonical name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Subscribed topic pattern
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether an incoming topic belongs to this metric
    pub fn matches(&self, topic: &str) -> bool {
        crate::topic::matches(&self.topic, topic)
    }

    /// Feed one decoded reading
    pub fn ingest(&self, reading: Reading) -> Option<Completion> {
        let mut state = self.state();
        let completion = state.ingest(reading)?;
        // Appended under the state lock so history order equals cycle order
        self.retain(&completion);
        Some(completion)
    }

    /// Decode and feed a raw payload
    ///
    /// Returns `false` when the payload does not decode; the state is left
    /// untouched in that case.
    pub fn ingest_payload(&self, payload: &[u8]) -> bool {
        match Reading::decode(payload) {
            Ok(reading) => {
                self.ingest(reading);
                true
            }
            Err(e) => {
                self.dropped_payloads.fetch_add(1, Ordering::Relaxed);
                debug!("metric {}: dropping payload: {}", self.config.name, e);
                false
            }
        }
    }

    fn retain(&self, completion: &Completion) {
        if !self.history.is_retaining() {
            return;
        }
        let factor = self.unit.current_factor();
        if self.config.is_energy() && factor.is_none() {
            debug!(
                "metric {}: unit factor unknown, cycle not retained",
                self.config.name
            );
            return;
        }
        self.history
            .record(self.config.convert(completion.raw, factor));
    }

    /// Current value in reported units, valid or not
    pub fn current_value(&self) -> Option<f64> {
        self.state().current_value(self.unit.as_ref())
    }

    /// Whether the current value is a real sample
    pub fn is_valid(&self) -> bool {
        self.state().is_valid(self.unit.as_ref())
    }

    /// Current value only when valid, checked under one lock
    pub fn sample(&self) -> Option<f64> {
        self.state().sample(self.unit.as_ref())
    }

    /// Valid value converted to the declared kind
    pub fn reported(&self) -> Option<ReportedValue> {
        self.sample()
            .map(|value| ReportedValue::new(self.config.kind, value))
    }

    /// Copy of the aggregation state
    pub fn state_snapshot(&self) -> MetricState {
        self.state().clone()
    }

    /// Start or stop history retention
    pub fn set_retain_history(&self, retain: bool) {
        self.history.set_retaining(retain);
    }

    /// Whether history retention is on
    pub fn retains_history(&self) -> bool {
        self.history.is_retaining()
    }

    /// Take all retained samples
    pub fn drain_history(&self) -> Vec<Sample> {
        self.history.drain()
    }

    /// Retained history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Counters
    pub fn stats(&self) -> MetricStats {
        let mut stats = self.state().stats();
        stats.dropped_payloads = self.dropped_payloads.load(Ordering::Relaxed);
        stats
    }

    /// Point-in-time view
    pub fn snapshot(&self) -> MetricSnapshot {
        let state = self.state();
        let unit = self.unit.as_ref();
        let mut stats = state.stats();
        stats.dropped_payloads = self.dropped_payloads.load(Ordering::Relaxed);
        MetricSnapshot {
            name: self.config.name.clone(),
            topic: self.topic.clone(),
            phase: state.phase().name(),
            fan_in: state.fan_in(),
            iterations: state.iteration_count(),
            valid: state.is_valid(unit),
            value: state
                .current_value(unit)
                .map(|value| ReportedValue::new(self.config.kind, value)),
            retained: self.history.len(),
            stats,
        }
    }

    fn state(&self) -> MutexGuard<'_, MetricState> {
        // State fields are plain values, always consistent between statements
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metric")
            .field("config", &self.config)
            .field("topic", &self.topic)
            .field("retained", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::SharedUnitFactor;

    #[test]
    fn test_metric_new() {
        let metric = Metric::parse("cpu/0/temp;max");
        assert_eq!(metric.name(), "cpu/0/temp");
        assert_eq!(metric.topic(), "cpu/0/temp");
        assert!(!metric.is_valid());
        assert!(!metric.retains_history());
    }

    #[test]
    fn test_metric_matches_wildcard_topic() {
        let metric = Metric::parse("temp").with_topic("node/+/temp");
        assert!(metric.matches("node/r01/temp"));
        assert!(!metric.matches("node/r01/temp2"));
    }

    #[test]
    fn test_ingest_payload_drops_garbage() {
        let metric = Metric::parse("temp");
        assert!(metric.ingest_payload(b"1;1"));
        assert!(!metric.ingest_payload(b"garbage"));
        assert!(metric.ingest_payload(b"2;2"));

        let stats = metric.stats();
        assert_eq!(stats.readings, 2);
        assert_eq!(stats.dropped_payloads, 1);
        assert_eq!(metric.sample(), Some(2.0));
    }

    #[test]
    fn test_reported_integer() {
        let metric = Metric::parse("temp;int");
        metric.ingest(Reading::new(1.9, 1.0));
        metric.ingest(Reading::new(-2.7, 2.0));
        assert_eq!(metric.reported(), Some(ReportedValue::Integer(-2)));
    }

    #[test]
    fn test_reported_value_conversions() {
        assert_eq!(
            ReportedValue::new(ReportedKind::Integer, 1e30),
            ReportedValue::Integer(i64::MAX)
        );
        assert_eq!(ReportedValue::Double(2.5).as_f64(), 2.5);
        assert_eq!(ReportedValue::Integer(3).as_f64(), 3.0);
    }

    #[test]
    fn test_history_skips_energy_without_unit() {
        let unit = SharedUnitFactor::new();
        let metric = Metric::parse("erg_pkg")
            .with_unit_provider(Arc::new(unit.clone()))
            .with_history(true);

        for t in 1..=3 {
            metric.ingest(Reading::new(10.0, f64::from(t)));
        }
        assert!(metric.history().is_empty());

        unit.set(0.5);
        metric.ingest(Reading::new(10.0, 4.0));
        let samples = metric.drain_history();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 5.0);
    }

    #[test]
    fn test_stall_policy_builder() {
        let metric = Metric::parse("power;sum").with_stall_policy(StallPolicy::FinalizePartial);
        for (v, t) in [(0.0, 1.0), (0.0, 1.0), (3.0, 2.0), (1.0, 3.0)] {
            metric.ingest(Reading::new(v, t));
        }
        assert_eq!(metric.state_snapshot().finalized(), Some(3.0));
        assert_eq!(metric.stats().stalled_cycles, 1);
    }

    #[test]
    fn test_snapshot() {
        let metric = Metric::parse("power;sum;int");
        for (v, t) in [(0.0, 1.0), (0.0, 1.0), (1.5, 2.0), (1.0, 2.0)] {
            metric.ingest(Reading::new(v, t));
        }
        let snapshot = metric.snapshot();
        assert_eq!(snapshot.phase, "steady");
        assert_eq!(snapshot.fan_in, 2);
        assert_eq!(snapshot.iterations, 2);
        assert!(snapshot.valid);
        assert_eq!(snapshot.value, Some(ReportedValue::Integer(2)));
    }
}
