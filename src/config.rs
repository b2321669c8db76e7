// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Configuration types for the collector

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cycle::StallPolicy;
use crate::error::ConfigError;
use crate::topic::TopicLayout;

/// Collector-level configuration
///
/// Every field has a default, so a JSON file only needs the fields it changes:
///
/// ```json
/// { "retain_history": true, "metrics": ["cpu/+/erg_pkg;sum"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Where metrics live on the bus
    pub topics: TopicLayout,

    /// Maximum number of registered metrics
    pub max_metrics: usize,

    /// Retain history for newly registered metrics
    pub retain_history: bool,

    /// Handling of cycles interrupted before all sources reported
    pub stall_policy: StallPolicy,

    /// Take energy unit factors from the unit topic
    pub unit_topic_enabled: bool,

    /// Metric declarations registered at startup
    pub metrics: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            topics: TopicLayout::default(),
            max_metrics: 256,
            retain_history: false,
            stall_policy: StallPolicy::Discard,
            unit_topic_enabled: true,
            metrics: Vec::new(),
        }
    }
}

impl CollectorConfig {
    /// Configuration where metric names are used as topics directly
    pub fn bare() -> Self {
        Self {
            topics: TopicLayout::bare(),
            ..Default::default()
        }
    }

    /// Configuration with a custom metric limit
    pub fn with_max_metrics(max_metrics: usize) -> Self {
        Self {
            max_metrics,
            ..Default::default()
        }
    }

    /// Builder-style: add a metric declaration
    pub fn metric(mut self, declaration: impl Into<String>) -> Self {
        self.metrics.push(declaration.into());
        self
    }

    /// Parse from JSON and validate
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check values that deserialize fine but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_metrics == 0 {
            return Err(ConfigError::Invalid {
                field: "max_metrics",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.metrics.len() > self.max_metrics {
            return Err(ConfigError::Invalid {
                field: "metrics",
                reason: format!(
                    "{} declarations exceed max_metrics {}",
                    self.metrics.len(),
                    self.max_metrics
                ),
            });
        }
        if self.topics.unit_metric.is_empty() {
            return Err(ConfigError::Invalid {
                field: "topics.unit_metric",
                reason: "must not be empty".to_string(),
            });
        }
        self.topics
            .validate()
            .map_err(|e| ConfigError::Invalid {
                field: "topics",
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_collector_config_default() {
        let config = CollectorConfig::default();
        assert_eq!(config.max_metrics, 256);
        assert!(!config.retain_history);
        assert_eq!(config.stall_policy, StallPolicy::Discard);
        assert!(config.unit_topic_enabled);
        assert!(config.metrics.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = CollectorConfig::from_json_str(
            r#"{ "retain_history": true, "stall_policy": "finalize_partial",
                 "metrics": ["cpu/+/erg_pkg;sum"] }"#,
        )
        .unwrap();
        assert!(config.retain_history);
        assert_eq!(config.stall_policy, StallPolicy::FinalizePartial);
        assert_eq!(config.metrics, vec!["cpu/+/erg_pkg;sum".to_string()]);
        assert_eq!(config.topics, TopicLayout::default());
    }

    #[test]
    fn test_from_json_invalid() {
        let err = CollectorConfig::from_json_str(r#"{ "max_metrics": "many" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));

        let err = CollectorConfig::from_json_str(r#"{ "max_metrics": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_metrics",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_bad_layout() {
        let mut config = CollectorConfig::default();
        config.topics.prefix = "org/#/chnl".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "topics",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_too_many_metrics() {
        let config = CollectorConfig::with_max_metrics(1).metric("a").metric("b");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "max_metrics": 8, "metrics": ["temp;max"] }}"#).unwrap();

        let config = CollectorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_metrics, 8);
        assert_eq!(config.metrics.len(), 1);
    }

    #[test]
    fn test_from_missing_file() {
        let err = CollectorConfig::from_file("/nonexistent/examon.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_json_round_trip() {
        let config = CollectorConfig::bare().metric("temp;min");
        let json = config.to_json_string().unwrap();
        assert_eq!(CollectorConfig::from_json_str(&json).unwrap(), config);
    }
}
