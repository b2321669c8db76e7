// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! # Examon - metric aggregation for MQTT telemetry
//!
//! Turns the raw `value;timestamp` messages that Examon sensor plugins publish
//! on an MQTT bus into per-metric time series.
//!
//! ## Key Features
//!
//! - **Declarative metrics**: `name;reduction;kind;scale` strings
//! - **Fan-in learning**: the number of sources per metric is discovered from
//!   the first burst of readings, never configured
//! - **Cycle reduction**: average, sum, min or max over one timestamp
//! - **Energy units**: raw RAPL-style counters converted with a factor that
//!   arrives on its own topic
//! - **Retained history**: drain every finalized value since the last poll
//!
//! ## Quick Start
//!
//! ```rust
//! use examon::{Metric, Reading};
//!
//! let metric = Metric::parse("cpu/+/power;sum");
//!
//! // Two sources publish at t=1, then at t=2
//! for (value, timestamp) in [(1.0, 1.0), (2.0, 1.0), (10.0, 2.0), (20.0, 2.0)] {
//!     metric.ingest(Reading::new(value, timestamp));
//! }
//!
//! assert_eq!(metric.sample(), Some(30.0));
//! ```
//!
//! ## Modules
//!
//! - [`descriptor`]: Metric declarations and their parsed configuration
//! - [`payload`]: The `value;timestamp` wire format
//! - [`topic`]: MQTT topic matching and the topic layout
//! - [`cycle`]: Fan-in calibration, phases and reductions
//! - [`state`]: The per-metric aggregation state machine
//! - [`unit`]: Energy unit factor providers
//! - [`history`]: Retained finalized values
//! - [`metric`]: Thread-safe metric handle
//! - [`dispatcher`]: Metric registry and topic routing
//! - [`config`]: Collector configuration

// Modules
pub mod config;
pub mod cycle;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod metric;
pub mod payload;
pub mod state;
pub mod topic;
pub mod unit;

// Re-exports for convenient access
pub use config::CollectorConfig;
pub use cycle::{learn, Calibration, Phase, StallPolicy};
pub use descriptor::{MetricClass, MetricConfig, ReductionStrategy, ReportedKind};
pub use dispatcher::{Delivery, DispatchStats, Dispatcher, MetricId};
pub use error::{ConfigError, DecodeError, ExamonError, Result, TopicError};
pub use history::{History, Sample};
pub use metric::{Metric, MetricSnapshot, ReportedValue};
pub use payload::Reading;
pub use state::{Completion, MetricState, MetricStats};
pub use topic::TopicLayout;
pub use unit::{FixedUnitFactor, SharedUnitFactor, UnitProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
