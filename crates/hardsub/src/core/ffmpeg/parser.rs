//! FFmpeg diagnostic stream parsing
//!
//! FFmpeg reports everything on stderr: banner, stream metadata, warnings and
//! a status line rewritten in place with `\r`. This module turns that stream
//! into lines, classifies them, and derives progress snapshots.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::TimeSec;

// =============================================================================
// Patterns
// =============================================================================

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Duration: (\d{2}:\d{2}:\d{2}\.\d{2})").expect("valid duration regex")
    })
}

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"frame=\s*(\d+)").expect("valid frame regex"))
}

fn fps_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"fps=\s*([\d.]+)").expect("valid fps regex"))
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"time=(\d{2}:\d{2}:\d{2}\.\d{2})").expect("valid time regex"))
}

fn bitrate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bitrate=\s*([\d.]+\w+/s)").expect("valid bitrate regex"))
}

fn speed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"speed=\s*([\d.]+x)").expect("valid speed regex"))
}

fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// =============================================================================
// Log Classification
// =============================================================================

/// Category attached to every log line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Debug,
    Metadata,
}

/// Classify a diagnostic line by keyword. First matching rule wins.
pub fn categorize_log_line(line: &str) -> LogCategory {
    let lower = line.to_lowercase();
    let has = |needle: &str| lower.contains(needle);

    if has("error") || has("failed") || has("invalid") {
        LogCategory::Error
    } else if has("warning") || has("deprecated") || (has("not found") && !has("glyph")) {
        // Missing glyph notices from libass are routine.
        LogCategory::Warning
    } else if has("completed") || has("success") || has("done") {
        LogCategory::Success
    } else if has("stream")
        || has("duration")
        || has("encoder")
        || has("bitrate")
        || has("video:")
        || has("audio:")
    {
        LogCategory::Metadata
    } else if has("libav") || has("configuration:") {
        LogCategory::Debug
    } else {
        LogCategory::Info
    }
}

/// Status lines are reported as progress, never as log lines.
pub fn is_progress_noise(line: &str) -> bool {
    line.contains("size=") || line.contains("frame=")
}

// =============================================================================
// Time
// =============================================================================

/// Parse `HH:MM:SS(.ff)`, `MM:SS` or plain seconds.
pub fn parse_timestamp(value: &str) -> Option<TimeSec> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }

    fn field(v: &str) -> Option<f64> {
        v.parse().ok()
    }

    let parts: Vec<&str> = value.split(':').collect();
    let seconds = match parts.as_slice() {
        [h, m, s] => field(h)? * 3600.0 + field(m)? * 60.0 + field(s)?,
        [m, s] => field(m)? * 60.0 + field(s)?,
        [s] => field(s)?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Extract the input duration from a `Duration: HH:MM:SS.ff` banner line.
///
/// Returns the raw timestamp and its value in seconds.
pub fn parse_duration_line(line: &str) -> Option<(String, TimeSec)> {
    let raw = capture(duration_regex(), line)?;
    let seconds = parse_timestamp(raw)?;
    Some((raw.to_string(), seconds))
}

/// Render a remaining-time estimate.
pub fn format_eta(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "Calculating...".to_string();
    }

    let total = seconds.floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

// =============================================================================
// Progress
// =============================================================================

/// Raw fields of one FFmpeg status line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub frame: u64,
    pub fps: f64,
    /// Media time as printed, e.g. `00:01:02.50`
    pub time: String,
    pub time_sec: TimeSec,
    pub bitrate: String,
    pub speed: String,
}

/// Parse a status line (`frame= ... time= ... speed=`).
///
/// Lines without `frame=` or without a parseable `time=` yield nothing.
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    if !line.contains("frame=") {
        return None;
    }

    let time = capture(time_regex(), line)?;
    let time_sec = parse_timestamp(time)?;

    Some(ProgressSample {
        frame: capture(frame_regex(), line)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        fps: capture(fps_regex(), line)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
        time: time.to_string(),
        time_sec,
        bitrate: capture(bitrate_regex(), line).unwrap_or("N/A").to_string(),
        speed: capture(speed_regex(), line).unwrap_or("N/A").to_string(),
    })
}

/// Progress snapshot of a running burn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnProgress {
    pub frame: u64,
    pub fps: f64,
    pub time: String,
    pub bitrate: String,
    pub speed: String,
    /// 0.0 - 100.0, two decimals; 0 while the duration is unknown
    pub percentage: f64,
    pub eta: Option<String>,
}

/// Per-invocation progress state: the detected duration and the highest
/// percentage reported so far.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    duration: Option<TimeSec>,
    last_percentage: f64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn duration(&self) -> Option<TimeSec> {
        self.duration
    }

    /// Record the input duration from a banner line. Only the first one
    /// counts; returns the raw timestamp when this line set it.
    pub fn observe_duration(&mut self, line: &str) -> Option<(String, TimeSec)> {
        if self.duration.is_some() {
            return None;
        }
        let (raw, seconds) = parse_duration_line(line)?;
        self.duration = Some(seconds);
        Some((raw, seconds))
    }

    /// Turn a status sample into a snapshot. Percentages never go backwards.
    pub fn progress(&mut self, sample: ProgressSample, elapsed: Duration) -> BurnProgress {
        let duration = self.duration.unwrap_or(0.0);

        let mut percentage = if duration > 0.0 {
            round2((sample.time_sec / duration * 100.0).min(100.0))
        } else {
            0.0
        };
        percentage = percentage.max(self.last_percentage);
        self.last_percentage = percentage;

        let eta = if duration > 0.0 && percentage > 0.0 && percentage < 100.0 {
            let elapsed = elapsed.as_secs_f64();
            let estimated_total = elapsed / (percentage / 100.0);
            Some(format_eta(estimated_total - elapsed))
        } else {
            None
        };

        BurnProgress {
            frame: sample.frame,
            fps: sample.fps,
            time: sample.time,
            bitrate: sample.bitrate,
            speed: sample.speed,
            percentage,
            eta,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Line Splitting
// =============================================================================

/// Splits a byte stream into lines on `\n` or `\r`.
///
/// Chunk boundaries can fall anywhere, including inside a UTF-8 sequence, so
/// bytes are buffered until a terminator arrives. Blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush whatever is left once the stream closes.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    fn take_line(&mut self) -> Option<String> {
        let bytes = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&bytes);
        let trimmed = line.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
