// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! # Examon Replay
//!
//! Feeds captured Examon MQTT traffic through the aggregation engine and
//! prints what every metric ends up reporting.
//!
//! ## Usage
//!
//! ```bash
//! # Capture a node, then replay it
//! mosquitto_sub -v -t 'org/+/cluster/+/node/+/plugin/+/chnl/data/#' > capture.txt
//! examon-replay --capture capture.txt --metric 'cpu/+/erg_pkg;sum' --metric 'temp;max'
//!
//! # Use a collector configuration and export the retained history
//! examon-replay --capture capture.txt --config collector.json --history-csv history.csv
//! ```

mod capture;
mod report;

use std::fs::File;
use std::io::{self, BufWriter};
use std::process::ExitCode;

use clap::Parser;
use examon::{CollectorConfig, ConfigError, Dispatcher, ExamonError, TopicLayout};
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;

use report::Report;

/// Replay captured Examon traffic through the aggregation engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file with one `<topic> <payload>` per line (`-` for stdin)
    #[arg(short, long)]
    capture: String,

    /// Collector configuration (JSON)
    #[arg(long)]
    config: Option<String>,

    /// Metric declaration, e.g. `cpu/+/erg_pkg;sum` (repeatable)
    #[arg(short, long = "metric")]
    metrics: Vec<String>,

    /// Use metric names as topics instead of the Examon topic layout
    #[arg(long)]
    bare: bool,

    /// Energy unit factor to start with
    #[arg(long)]
    unit_factor: Option<f64>,

    /// Retain history and include it in the report
    #[arg(long)]
    history: bool,

    /// Write retained history to a CSV file instead of the report
    #[arg(long)]
    history_csv: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Errors that end a replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] ExamonError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No metrics declared; use --metric or a configuration file")]
    NoMetrics,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so the report on stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Examon replay v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn collector_config(args: &Args) -> Result<CollectorConfig, ReplayError> {
    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_file(path)?,
        None => CollectorConfig::default(),
    };
    if args.bare {
        config.topics = TopicLayout::bare();
    }
    if args.history || args.history_csv.is_some() {
        config.retain_history = true;
    }
    config.metrics.extend(args.metrics.iter().cloned());
    if config.metrics.is_empty() {
        return Err(ReplayError::NoMetrics);
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), ReplayError> {
    let dispatcher = Dispatcher::from_config(collector_config(args)?)?;
    if let Some(factor) = args.unit_factor {
        dispatcher.set_unit_factor(factor);
    }
    for id in dispatcher.ids() {
        let metric = dispatcher.metric(id)?;
        debug!("metric {} subscribes to {}", metric.name(), metric.topic());
    }

    let capture = capture::load(&args.capture)?;
    info!(
        "Capture loaded: {} messages, {} skipped lines",
        capture.messages.len(),
        capture.skipped
    );

    for message in &capture.messages {
        let delivery = dispatcher.dispatch(&message.topic, message.payload.as_bytes());
        if delivery.dropped {
            debug!("line {}: payload dropped", message.line);
        }
    }

    let stats = dispatcher.stats();
    info!(
        "Replayed {} messages: {} routed, {} unmatched, {} dropped",
        stats.events, stats.routed, stats.unmatched, stats.dropped
    );

    let mut report = Report::collect(&dispatcher, capture.messages.len(), capture.skipped);
    if dispatcher.config().retain_history {
        let history = report::drain_all(&dispatcher)?;
        match &args.history_csv {
            Some(path) => {
                let file = File::create(path).map_err(|source| ReplayError::Io {
                    path: path.clone(),
                    source,
                })?;
                let rows = report::write_history_csv(BufWriter::new(file), &history)?;
                info!("Wrote {} history rows to {}", rows, path);
            }
            None => report = report.with_history(history),
        }
    }

    let stdout = io::stdout();
    serde_json::to_writer_pretty(stdout.lock(), &report)?;
    println!();
    Ok(())
}
