// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Routing of bus messages to metrics
//!
//! The [`Dispatcher`] owns every registered [`Metric`], matches each incoming
//! topic against their subscriptions and feeds the decoded payload to the
//! matching metrics. Messages on the unit topic update the shared energy unit
//! factor instead.
//!
//! # Example
//!
//! ```rust
//! use examon::{CollectorConfig, Dispatcher};
//!
//! let mut dispatcher = Dispatcher::new(CollectorConfig::bare());
//! let id = dispatcher.register("cpu/+/power;sum").unwrap();
//!
//! for (topic, payload) in [
//!     ("cpu/0/power", "10;1"),
//!     ("cpu/1/power", "12;1"),
//!     ("cpu/0/power", "11;2"),
//!     ("cpu/1/power", "13;2"),
//! ] {
//!     dispatcher.dispatch(topic, payload.as_bytes());
//! }
//!
//! assert_eq!(dispatcher.metric(id).unwrap().sample(), Some(24.0));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::config::CollectorConfig;
use crate::descriptor::MetricConfig;
use crate::error::{ExamonError, Result};
use crate::history::Sample;
use crate::metric::{Metric, MetricSnapshot, ReportedValue};
use crate::payload::Reading;
use crate::topic;
use crate::unit::{SharedUnitFactor, UnitProvider};

/// Identifier handed out on registration
pub type MetricId = i32;

/// What happened to one dispatched message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Metrics that received the reading
    pub routed: usize,
    /// The message updated the unit factor
    pub unit_update: bool,
    /// The topic matched but the payload did not decode
    pub dropped: bool,
}

impl Delivery {
    /// Whether any state changed
    pub fn is_consumed(&self) -> bool {
        self.routed > 0 || self.unit_update
    }
}

/// Dispatcher-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Messages seen
    pub events: u64,
    /// Deliveries to metrics (one message may reach several)
    pub routed: u64,
    /// Messages no metric subscribed to
    pub unmatched: u64,
    /// Matched messages with undecodable payloads
    pub dropped: u64,
    /// Unit factor updates
    pub unit_updates: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    routed: AtomicU64,
    unmatched: AtomicU64,
    dropped: AtomicU64,
    unit_updates: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events: self.events.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unit_updates: self.unit_updates.load(Ordering::Relaxed),
        }
    }
}

/// Registry of metrics plus topic routing
///
/// Registration needs `&mut self`; dispatching and reading only need `&self`,
/// so a registered dispatcher can be shared between an ingesting thread and
/// readers.
pub struct Dispatcher {
    metrics: HashMap<MetricId, Metric>,
    config: CollectorConfig,
    unit: SharedUnitFactor,
    unit_topic: String,
    counters: Counters,
}

impl Dispatcher {
    /// Create a dispatcher with no metrics
    pub fn new(config: CollectorConfig) -> Self {
        let unit_topic = config.topics.unit_topic();
        Self {
            metrics: HashMap::new(),
            config,
            unit: SharedUnitFactor::new(),
            unit_topic,
            counters: Counters::default(),
        }
    }

    /// Create a dispatcher and register the declarations in `config.metrics`
    pub fn from_config(config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        let declarations = config.metrics.clone();
        let mut dispatcher = Self::new(config);
        for declaration in &declarations {
            dispatcher.register(declaration)?;
        }
        Ok(dispatcher)
    }

    /// Register a metric from its declaration string
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A metric with the same canonical name is already registered
    /// - The maximum number of metrics has been reached
    /// - The resulting subscription topic is not a valid pattern
    pub fn register(&mut self, declaration: &str) -> Result<MetricId> {
        self.register_config(MetricConfig::parse(declaration))
    }

    /// Register a metric from an already parsed configuration
    pub fn register_config(&mut self, config: MetricConfig) -> Result<MetricId> {
        if self.find(&config.name).is_some() {
            return Err(ExamonError::MetricAlreadyRegistered(config.name));
        }
        if self.metrics.len() >= self.config.max_metrics {
            return Err(ExamonError::MaxMetricsReached {
                max: self.config.max_metrics,
            });
        }

        let topic = self.config.topics.data_topic(&config.name);
        topic::validate_pattern(&topic)?;

        let id = self.next_id();
        info!("registered metric {} ({}) at {}", id, config, topic);

        let unit: Arc<dyn UnitProvider> = Arc::new(self.unit.clone());
        let metric = Metric::new(config)
            .with_topic(topic)
            .with_unit_provider(unit)
            .with_stall_policy(self.config.stall_policy)
            .with_history(self.config.retain_history);
        self.metrics.insert(id, metric);
        Ok(id)
    }

    // Ids are never reused while a larger one is registered
    fn next_id(&self) -> MetricId {
        self.metrics.keys().max().map_or(0, |max| max + 1)
    }

    /// Remove a metric
    pub fn deregister(&mut self, id: MetricId) -> Result<Metric> {
        self.metrics
            .remove(&id)
            .ok_or(ExamonError::MetricNotFound(id))
    }

    /// Route one message
    ///
    /// Undecodable payloads are dropped without touching any metric.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> Delivery {
        self.counters.events.fetch_add(1, Ordering::Relaxed);

        let mut delivery = Delivery::default();
        // Decoded at most once, and only if someone wants it
        let mut decoded: Option<Option<Reading>> = None;
        let mut decode = || {
            *decoded.get_or_insert_with(|| match Reading::decode(payload) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    debug!("dropping payload on {}: {}", topic, e);
                    None
                }
            })
        };

        if self.config.unit_topic_enabled && topic::matches(&self.unit_topic, topic) {
            match decode() {
                Some(reading) => {
                    self.set_unit_factor(reading.value);
                    self.counters.unit_updates.fetch_add(1, Ordering::Relaxed);
                    delivery.unit_update = true;
                }
                None => delivery.dropped = true,
            }
        }

        let mut matched = false;
        for metric in self.metrics.values().filter(|m| m.matches(topic)) {
            matched = true;
            match decode() {
                Some(reading) => {
                    metric.ingest(reading);
                    delivery.routed += 1;
                }
                None => {
                    delivery.dropped = true;
                    break;
                }
            }
        }

        if delivery.dropped {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        } else if !matched && !delivery.unit_update {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
        }
        self.counters
            .routed
            .fetch_add(delivery.routed as u64, Ordering::Relaxed);
        delivery
    }

    /// Set the energy unit factor used by every metric
    pub fn set_unit_factor(&self, factor: f64) {
        if self.unit.current_factor() != Some(factor) {
            info!("energy unit factor set to {}", factor);
        }
        self.unit.set(factor);
    }

    /// Current energy unit factor
    pub fn unit_factor(&self) -> Option<f64> {
        self.unit.current_factor()
    }

    /// Handle to the shared unit factor
    pub fn unit_handle(&self) -> SharedUnitFactor {
        self.unit.clone()
    }

    /// Subscription topic of the unit factor
    pub fn unit_topic(&self) -> &str {
        &self.unit_topic
    }

    /// Get a registered metric
    pub fn metric(&self, id: MetricId) -> Result<&Metric> {
        self.metrics.get(&id).ok_or(ExamonError::MetricNotFound(id))
    }

    /// Find a metric by canonical name
    pub fn find(&self, name: &str) -> Option<(MetricId, &Metric)> {
        self.metrics
            .iter()
            .find(|(_, metric)| metric.name() == name)
            .map(|(id, metric)| (*id, metric))
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<MetricId> {
        let mut ids: Vec<_> = self.metrics.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered metrics
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Whether no metric is registered
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Valid value of a metric in its declared kind
    pub fn value(&self, id: MetricId) -> Result<Option<ReportedValue>> {
        Ok(self.metric(id)?.reported())
    }

    /// Switch history retention for one metric
    pub fn set_retain_history(&self, id: MetricId, retain: bool) -> Result<()> {
        self.metric(id)?.set_retain_history(retain);
        Ok(())
    }

    /// Switch history retention for every metric
    pub fn set_retain_history_all(&self, retain: bool) {
        for metric in self.metrics.values() {
            metric.set_retain_history(retain);
        }
    }

    /// Take the retained samples of one metric
    pub fn drain_history(&self, id: MetricId) -> Result<Vec<Sample>> {
        Ok(self.metric(id)?.drain_history())
    }

    /// Point-in-time view of every metric, by ascending id
    pub fn snapshot(&self) -> Vec<(MetricId, MetricSnapshot)> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.metrics.get(&id).map(|m| (id, m.snapshot())))
            .collect()
    }

    /// Dispatcher-wide counters
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Configuration
    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("metrics", &self.metrics.len())
            .field("unit_topic", &self.unit_topic)
            .field("unit_factor", &self.unit.current_factor())
            .finish()
    }
}
