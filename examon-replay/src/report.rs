// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Replay report and history export.

use std::collections::BTreeMap;
use std::io::Write;

use examon::{DispatchStats, Dispatcher, MetricSnapshot, Sample};
use serde::Serialize;

use crate::ReplayError;

/// Summary printed after a replay.
#[derive(Debug, Serialize)]
pub struct Report {
    pub version: &'static str,
    pub messages: usize,
    pub skipped_lines: usize,
    pub unit_factor: Option<f64>,
    pub dispatch: DispatchStats,
    pub metrics: Vec<MetricSnapshot>,
    /// Drained samples per metric name, empty when history is off or exported
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<String, Vec<Sample>>,
}

impl Report {
    /// Collect the final state of every metric.
    pub fn collect(dispatcher: &Dispatcher, messages: usize, skipped_lines: usize) -> Self {
        Self {
            version: examon::VERSION,
            messages,
            skipped_lines,
            unit_factor: dispatcher.unit_factor(),
            dispatch: dispatcher.stats(),
            metrics: dispatcher
                .snapshot()
                .into_iter()
                .map(|(_, snapshot)| snapshot)
                .collect(),
            history: BTreeMap::new(),
        }
    }

    /// Attach drained history.
    pub fn with_history(mut self, history: BTreeMap<String, Vec<Sample>>) -> Self {
        self.history = history;
        self
    }
}

/// Drain the history of every metric, keyed by name.
pub fn drain_all(dispatcher: &Dispatcher) -> Result<BTreeMap<String, Vec<Sample>>, ReplayError> {
    let mut history = BTreeMap::new();
    for id in dispatcher.ids() {
        let name = dispatcher.metric(id)?.name().to_string();
        history.insert(name, dispatcher.drain_history(id)?);
    }
    Ok(history)
}

#[derive(Serialize)]
struct HistoryRow<'a> {
    metric: &'a str,
    captured_at: String,
    value: f64,
}

/// Write drained history as CSV rows of `metric,captured_at,value`.
pub fn write_history_csv<W: Write>(
    writer: W,
    history: &BTreeMap<String, Vec<Sample>>,
) -> Result<usize, ReplayError> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut rows = 0;
    for (metric, samples) in history {
        for sample in samples {
            csv.serialize(HistoryRow {
                metric,
                captured_at: sample.captured_at.to_rfc3339(),
                value: sample.value,
            })?;
            rows += 1;
        }
    }
    csv.flush().map_err(|source| ReplayError::Io {
        path: "history csv".to_string(),
        source,
    })?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use examon::CollectorConfig;

    fn replayed() -> Dispatcher {
        let mut dispatcher = Dispatcher::new(CollectorConfig {
            retain_history: true,
            ..CollectorConfig::bare()
        });
        dispatcher.register("temp;max").unwrap();
        for t in 1..=3 {
            dispatcher.dispatch("temp", format!("{};{}", 20 + t, t).as_bytes());
        }
        dispatcher
    }

    #[test]
    fn test_report_collect() {
        let dispatcher = replayed();
        let report = Report::collect(&dispatcher, 3, 0);

        assert_eq!(report.metrics.len(), 1);
        assert_eq!(report.dispatch.events, 3);
        assert!(report.metrics[0].valid);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("history").is_none());
        assert_eq!(json["metrics"][0]["value"], 23.0);
    }

    #[test]
    fn test_drain_all_and_csv() {
        let dispatcher = replayed();
        let history = drain_all(&dispatcher).unwrap();
        assert_eq!(history["temp"].len(), 2);

        let mut out = Vec::new();
        let rows = write_history_csv(&mut out, &history).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("metric,captured_at,value"));
        assert!(lines.next().unwrap().ends_with(",21.0"));
    }
}
