// Examon collector - metric aggregation engine
// Copyright (c) 2025 Examon Collector Developers
//
// Licensed under the BSD-3-Clause license.
// See LICENSE file for details.

//! Capture file parsing.
//!
//! A capture is the text printed by `mosquitto_sub -v`: one message per line,
//! the topic, a single space, then the payload. Blank lines and lines starting
//! with `#` are ignored.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::ReplayError;

/// One captured bus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 1-based line in the capture
    pub line: usize,
    pub topic: String,
    pub payload: String,
}

/// Parsed capture contents.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub messages: Vec<Message>,
    /// Lines that were neither messages nor comments
    pub skipped: usize,
}

/// Split one line into topic and payload.
///
/// Returns `None` for comments, blank lines and lines without a payload.
pub fn parse_line(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() || text.starts_with('#') {
        return None;
    }
    let (topic, payload) = text.split_once(char::is_whitespace)?;
    Some((topic, payload.trim_start()))
}

fn is_ignorable(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.starts_with('#')
}

/// Read a capture from any buffered reader.
pub fn read_capture<R: BufRead>(reader: R) -> io::Result<Capture> {
    let mut capture = Capture::default();
    for (index, text) in reader.lines().enumerate() {
        let text = text?;
        let line = index + 1;
        match parse_line(&text) {
            Some((topic, payload)) => capture.messages.push(Message {
                line,
                topic: topic.to_string(),
                payload: payload.to_string(),
            }),
            None if is_ignorable(&text) => {}
            None => {
                warn!("line {}: no payload, skipped", line);
                capture.skipped += 1;
            }
        }
    }
    Ok(capture)
}

/// Read a capture file, or stdin when `path` is `-`.
pub fn load(path: &str) -> Result<Capture, ReplayError> {
    let io_error = |source| ReplayError::Io {
        path: path.to_string(),
        source,
    };
    if path == "-" {
        return read_capture(io::stdin().lock()).map_err(io_error);
    }
    let file = File::open(Path::new(path)).map_err(io_error)?;
    read_capture(BufReader::new(file)).map_err(io_error)
}
