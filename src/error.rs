// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Error types for the collector
//!
//! Only registration and configuration problems surface as errors. Noisy
//! telemetry (undecodable payloads, unknown units, unknown option tokens) is
//! absorbed by the engine and never reaches the caller as an `Err`.

use thiserror::Error;

use crate::dispatcher::MetricId;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, ExamonError>;

/// Main error type for collector operations
#[derive(Error, Debug)]
pub enum ExamonError {
    /// Payload decoding error
    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    /// Topic pattern error
    #[error("Topic error: {0}")]
    Topic(#[from] TopicError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A metric with the same canonical name is already registered
    #[error("Metric already registered: {0}")]
    MetricAlreadyRegistered(String),

    /// No metric with this id
    #[error("Metric not found: {0}")]
    MetricNotFound(MetricId),

    /// Maximum number of metrics reached
    #[error("Maximum metrics ({max}) reached")]
    MaxMetricsReached { max: usize },
}

/// Errors while decoding a `value;timestamp` payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload bytes are not UTF-8
    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    /// Wrong number of `;`-separated fields
    #[error("Expected 2 fields, got {found}")]
    FieldCount { found: usize },

    /// Field is not a real number
    #[error("Field {field} is not a number: {text:?}")]
    NotANumber { field: &'static str, text: String },

    /// Field parsed but is NaN or infinite
    #[error("Field {field} is not finite")]
    NonFinite { field: &'static str },
}

/// Errors in a subscription pattern
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopicError {
    /// Empty pattern
    #[error("Topic pattern is empty")]
    Empty,

    /// `#` is not the last level
    #[error("Multi-level wildcard must be the last level in {0:?}")]
    MisplacedMultiLevel(String),

    /// A wildcard shares a level with other characters
    #[error("Wildcard must occupy a whole level in {0:?}")]
    PartialWildcard(String),
}

/// Errors while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON for this schema
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Semantically invalid value
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
