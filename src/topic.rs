// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Topic matching and topic layout
//!
//! Topics are `/`-separated levels. Subscription patterns follow MQTT rules:
//!
//! - `+` matches exactly one level, which may be empty
//! - `#` matches the parent level and any number of child levels; it must be
//!   the last level
//! - patterns starting with a wildcard never match topics starting with `$`

use serde::{Deserialize, Serialize};

use crate::error::TopicError;

/// Single-level wildcard
pub const SINGLE_LEVEL: &str = "+";
/// Multi-level wildcard
pub const MULTI_LEVEL: &str = "#";

/// Check that `pattern` is a well-formed subscription
pub fn validate_pattern(pattern: &str) -> Result<(), TopicError> {
    if pattern.is_empty() {
        return Err(TopicError::Empty);
    }

    let mut levels = pattern.split('/').peekable();
    while let Some(level) = levels.next() {
        if level.contains('#') {
            if level != MULTI_LEVEL {
                return Err(TopicError::PartialWildcard(pattern.to_string()));
            }
            if levels.peek().is_some() {
                return Err(TopicError::MisplacedMultiLevel(pattern.to_string()));
            }
        } else if level.contains('+') && level != SINGLE_LEVEL {
            return Err(TopicError::PartialWildcard(pattern.to_string()));
        }
    }
    Ok(())
}

/// Whether `topic` is matched by the subscription `pattern`
///
/// Malformed patterns match nothing.
pub fn matches(pattern: &str, topic: &str) -> bool {
    if topic.is_empty() || validate_pattern(pattern).is_err() {
        return false;
    }
    if topic.starts_with('$') && (pattern.starts_with('+') || pattern.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    for level in pattern.split('/') {
        match level {
            MULTI_LEVEL => return true,
            SINGLE_LEVEL => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            literal => {
                if topic_levels.next() != Some(literal) {
                    return false;
                }
            }
        }
    }
    topic_levels.next().is_none()
}

/// Whether a pattern contains any wildcard
pub fn has_wildcards(pattern: &str) -> bool {
    pattern
        .split('/')
        .any(|level| level == SINGLE_LEVEL || level == MULTI_LEVEL)
}

/// Where metrics live on the bus
///
/// A metric named `cpu/0/erg_pkg` is subscribed at
/// `{prefix}/{data_segment}/cpu/0/erg_pkg`. Energy unit factors are published
/// on the data topic of `unit_metric`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicLayout {
    /// Levels in front of the data segment (may contain wildcards)
    pub prefix: String,
    /// Level separating the prefix from metric names
    pub data_segment: String,
    /// Metric name carrying the energy unit factor
    pub unit_metric: String,
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self {
            prefix: "org/+/cluster/+/node/+/plugin/+/chnl".to_string(),
            data_segment: "data".to_string(),
            unit_metric: "erg_units".to_string(),
        }
    }
}

impl TopicLayout {
    /// Layout restricted to one node
    pub fn for_node(org: &str, cluster: &str, node: &str) -> Self {
        Self {
            prefix: format!("org/{org}/cluster/{cluster}/node/{node}/plugin/+/chnl"),
            ..Default::default()
        }
    }

    /// Layout with no prefix: metric names are the topics
    pub fn bare() -> Self {
        Self {
            prefix: String::new(),
            data_segment: String::new(),
            unit_metric: "erg_units".to_string(),
        }
    }

    /// Subscription topic for a metric name
    pub fn data_topic(&self, name: &str) -> String {
        [self.prefix.as_str(), self.data_segment.as_str(), name]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Subscription topic for energy unit factors
    pub fn unit_topic(&self) -> String {
        self.data_topic(&self.unit_metric)
    }

    /// Validate the patterns this layout produces
    pub fn validate(&self) -> Result<(), TopicError> {
        validate_pattern(&self.unit_topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(matches("a/b/c", "a/b/c"));
        assert!(!matches("a/b/c", "a/b/d"));
        assert!(!matches("a/b", "a/b/c"));
        assert!(!matches("a/b/c", "a/b"));
    }

    #[test]
    fn test_single_level() {
        assert!(matches("a/+/c", "a/b/c"));
        assert!(matches("a/+/c", "a//c"));
        assert!(!matches("a/+/c", "a/b/x/c"));
        assert!(matches("+", "a"));
        assert!(!matches("+", "a/b"));
        assert!(matches("+/+", "/a"));
    }

    #[test]
    fn test_multi_level() {
        assert!(matches("a/#", "a"));
        assert!(matches("a/#", "a/b"));
        assert!(matches("a/#", "a/b/c/d"));
        assert!(!matches("a/#", "b/a"));
        assert!(matches("#", "anything/at/all"));
        assert!(matches("+/b/#", "x/b"));
    }

    #[test]
    fn test_not_a_prefix_or_substring_test() {
        assert!(!matches("cpu/0/erg", "cpu/0/erg_pkg"));
        assert!(!matches("cpu/0", "cpu/0/erg_pkg"));
        assert!(!matches("pu/0/erg_pkg", "cpu/0/erg_pkg"));
    }

    #[test]
    fn test_dollar_topics() {
        assert!(!matches("#", "$SYS/broker"));
        assert!(!matches("+/broker", "$SYS/broker"));
        assert!(matches("$SYS/#", "$SYS/broker"));
    }

    #[test]
    fn test_invalid_patterns_match_nothing() {
        assert!(!matches("a/#/c", "a/b/c"));
        assert!(!matches("a/b+", "a/b+"));
        assert!(!matches("", "a"));
        assert!(!matches("a", ""));
    }

    #[test]
    fn test_validate_pattern() {
        assert_eq!(validate_pattern(""), Err(TopicError::Empty));
        assert!(matches!(
            validate_pattern("a/#/b"),
            Err(TopicError::MisplacedMultiLevel(_))
        ));
        assert!(matches!(
            validate_pattern("a/x#"),
            Err(TopicError::PartialWildcard(_))
        ));
        assert!(validate_pattern("a/+/#").is_ok());
    }

    #[test]
    fn test_has_wildcards() {
        assert!(has_wildcards("a/+/b"));
        assert!(has_wildcards("#"));
        assert!(!has_wildcards("a/b"));
    }

    #[test]
    fn test_layout_data_topic() {
        let layout = TopicLayout::default();
        let topic = layout.data_topic("cpu/0/erg_pkg");
        assert_eq!(
            topic,
            "org/+/cluster/+/node/+/plugin/+/chnl/data/cpu/0/erg_pkg"
        );
        assert!(matches(
            &topic,
            "org/unibo/cluster/galileo/node/r001/plugin/pmu_pub/chnl/data/cpu/0/erg_pkg"
        ));
    }

    #[test]
    fn test_layout_for_node() {
        let layout = TopicLayout::for_node("unibo", "galileo", "r001");
        let topic = layout.unit_topic();
        assert!(matches(
            &topic,
            "org/unibo/cluster/galileo/node/r001/plugin/pmu_pub/chnl/data/erg_units"
        ));
        assert!(!matches(
            &topic,
            "org/unibo/cluster/galileo/node/r002/plugin/pmu_pub/chnl/data/erg_units"
        ));
    }

    #[test]
    fn test_layout_bare() {
        let layout = TopicLayout::bare();
        assert_eq!(layout.data_topic("cpu/+/temp"), "cpu/+/temp");
        assert_eq!(layout.unit_topic(), "erg_units");
    }
}
