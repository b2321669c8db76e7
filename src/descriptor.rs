// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Metric declarations
//!
//! A metric is declared as `name[;opt;opt;...]`. The options select how
//! same-timestamp readings are reduced, which numeric kind is reported, and a
//! scale multiplier:
//!
//! | token                      | effect              |
//! |----------------------------|---------------------|
//! | `avg` `sum` `min` `max`    | reduction strategy  |
//! | `int` `double`             | reported kind       |
//! | any finite real literal    | scale multiplier    |
//!
//! Unknown tokens are skipped so that declarations written for newer builds
//! still load.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

/// Base-name prefixes (lower case) that mark a raw energy counter
pub const ENERGY_PREFIXES: &[&str] = &["erg_"];

/// How readings that share one timestamp are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionStrategy {
    /// Arithmetic mean over the fan-in
    #[default]
    Average,
    /// Plain sum
    Sum,
    /// Smallest reading
    Min,
    /// Largest reading
    Max,
}

impl ReductionStrategy {
    /// Option token selecting this strategy
    pub fn token(&self) -> &'static str {
        match self {
            ReductionStrategy::Average => "avg",
            ReductionStrategy::Sum => "sum",
            ReductionStrategy::Min => "min",
            ReductionStrategy::Max => "max",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "avg" => Some(ReductionStrategy::Average),
            "sum" => Some(ReductionStrategy::Sum),
            "min" => Some(ReductionStrategy::Min),
            "max" => Some(ReductionStrategy::Max),
            _ => None,
        }
    }
}

/// Numeric kind handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedKind {
    /// Signed 64-bit integer
    Integer,
    /// 64-bit float
    #[default]
    Double,
}

impl ReportedKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "int" => Some(ReportedKind::Integer),
            "double" => Some(ReportedKind::Double),
            _ => None,
        }
    }
}

/// Physical class of a metric, fixed by its base name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricClass {
    /// Raw energy register; needs a unit factor before values are meaningful
    Energy,
    /// Anything else
    Other,
}

impl MetricClass {
    /// Classify a metric from its full name or topic (last `/` segment is used)
    pub fn classify(name: &str) -> Self {
        let base = base_name(name).to_ascii_lowercase();
        if ENERGY_PREFIXES.iter().any(|prefix| base.starts_with(prefix)) {
            MetricClass::Energy
        } else {
            MetricClass::Other
        }
    }
}

/// Last path segment of a slash-separated name
pub fn base_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Immutable configuration of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Canonical name, option suffix stripped (e.g. `cpu/0/erg_pkg`)
    pub name: String,
    /// Reduction applied to one cycle
    pub reduction: ReductionStrategy,
    /// Numeric kind reported downstream
    pub kind: ReportedKind,
    /// Multiplier applied to every reported value
    pub scale: f64,
    /// Derived from the base name
    pub class: MetricClass,
}

impl MetricConfig {
    /// Create a configuration with default options for `name`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let class = MetricClass::classify(&name);
        Self {
            name,
            reduction: ReductionStrategy::default(),
            kind: ReportedKind::default(),
            scale: 1.0,
            class,
        }
    }

    /// Parse a declaration string such as `cpu/+/erg_pkg;sum;0.001`
    pub fn parse(declaration: &str) -> Self {
        let (name, options) = match declaration.split_once(';') {
            Some((name, options)) => (name, Some(options)),
            None => (declaration, None),
        };

        let mut config = Self::new(name.trim());
        if let Some(options) = options {
            for token in options.split(';').map(str::trim) {
                config.apply_option(token);
            }
        }
        config
    }

    /// Builder-style reduction override
    pub fn with_reduction(mut self, reduction: ReductionStrategy) -> Self {
        self.reduction = reduction;
        self
    }

    /// Builder-style reported kind override
    pub fn with_kind(mut self, kind: ReportedKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder-style scale override
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Base name of the metric (last path segment)
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    /// Whether this metric is gated on a known unit factor
    pub fn is_energy(&self) -> bool {
        self.class == MetricClass::Energy
    }

    /// Convert a raw reduced value to the reported unit
    ///
    /// Energy metrics are multiplied by `unit_factor` when it is known; every
    /// metric is multiplied by its scale.
    pub fn convert(&self, raw: f64, unit_factor: Option<f64>) -> f64 {
        let unit = match (self.class, unit_factor) {
            (MetricClass::Energy, Some(factor)) if factor > 0.0 => factor,
            _ => 1.0,
        };
        raw * unit * self.scale
    }

    fn apply_option(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }
        if let Some(reduction) = ReductionStrategy::from_token(token) {
            self.reduction = reduction;
        } else if let Some(kind) = ReportedKind::from_token(token) {
            self.kind = kind;
        } else if let Some(scale) = token.parse::<f64>().ok().filter(|s| s.is_finite()) {
            self.scale = scale;
        } else {
            debug!("metric {}: ignoring unknown option {:?}", self.name, token);
        }
    }
}

impl fmt::Display for MetricConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ReportedKind::Integer => "int",
            ReportedKind::Double => "double",
        };
        write!(
            f,
            "{};{};{};{}",
            self.name,
            self.reduction.token(),
            kind,
            self.scale
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let config = MetricConfig::parse("cpu/0/temp");
        assert_eq!(config.name, "cpu/0/temp");
        assert_eq!(config.reduction, ReductionStrategy::Average);
        assert_eq!(config.kind, ReportedKind::Double);
        assert_eq!(config.scale, 1.0);
        assert_eq!(config.class, MetricClass::Other);
    }

    #[test]
    fn test_parse_all_options() {
        let config = MetricConfig::parse("cpu/+/erg_pkg;sum;int;0.5");
        assert_eq!(config.name, "cpu/+/erg_pkg");
        assert_eq!(config.reduction, ReductionStrategy::Sum);
        assert_eq!(config.kind, ReportedKind::Integer);
        assert_eq!(config.scale, 0.5);
        assert_eq!(config.class, MetricClass::Energy);
    }

    #[test]
    fn test_parse_last_option_wins() {
        let config = MetricConfig::parse("power;min;max;2;3");
        assert_eq!(config.reduction, ReductionStrategy::Max);
        assert_eq!(config.scale, 3.0);
    }

    #[test]
    fn test_parse_ignores_unknown_tokens() {
        let config = MetricConfig::parse("power;median;;AVG;inf;nan;x1;max");
        assert_eq!(config.name, "power");
        assert_eq!(config.reduction, ReductionStrategy::Max);
        assert_eq!(config.kind, ReportedKind::Double);
        assert_eq!(config.scale, 1.0);
    }

    #[test]
    fn test_parse_trailing_semicolon() {
        let config = MetricConfig::parse("temp;");
        assert_eq!(config.name, "temp");
        assert_eq!(config, MetricConfig::new("temp"));
    }

    #[test]
    fn test_scientific_scale() {
        let config = MetricConfig::parse("erg_dram;1e-6");
        assert_eq!(config.scale, 1e-6);
    }

    #[test]
    fn test_classify() {
        assert_eq!(MetricClass::classify("erg_pkg"), MetricClass::Energy);
        assert_eq!(MetricClass::classify("cpu/3/ERG_cores"), MetricClass::Energy);
        assert_eq!(MetricClass::classify("erg_/x/temp"), MetricClass::Other);
        assert_eq!(MetricClass::classify("cpu/0/energy"), MetricClass::Other);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("a/b/c"), "c");
        assert_eq!(base_name("c"), "c");
        assert_eq!(base_name("a/"), "");
    }

    #[test]
    fn test_convert() {
        let energy = MetricConfig::parse("erg_pkg;0.5");
        assert_eq!(energy.convert(10.0, Some(2.0)), 10.0);
        assert_eq!(energy.convert(10.0, None), 5.0);

        let other = MetricConfig::parse("temp;0.5");
        assert_eq!(other.convert(10.0, Some(2.0)), 5.0);
    }

    #[test]
    fn test_display_reparses() {
        let config = MetricConfig::parse("node/erg_pkg;min;int;0.25");
        let reparsed = MetricConfig::parse(&config.to_string());
        assert_eq!(config, reparsed);
    }
}
