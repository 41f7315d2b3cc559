//! Timestamped text segments used for descriptions and commentary.
//!
//! Timestamps are accepted as `HH:MM:SS`, `MM:SS` or `SS` (each optionally
//! with a fractional `.mmm` part) and normalized to `HH:MM:SS`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum supported position in a source video (24 hours).
pub const MAX_TIMESTAMP_SECS: f64 = 86400.0;

/// One segment of text anchored at a position in the source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedText {
    pub timestamp: String,
    pub text: String,
}

impl TimestampedText {
    /// Create a segment with a normalized timestamp.
    pub fn new(timestamp: &str, text: impl Into<String>) -> Result<Self, TimestampError> {
        Ok(Self {
            timestamp: normalize_timestamp(timestamp)?,
            text: text.into(),
        })
    }

    /// Position of the segment in seconds.
    pub fn seconds(&self) -> Result<f64, TimestampError> {
        parse_timestamp(&self.timestamp)
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, MM:SS or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum supported position (24 hours)")]
    TooLarge,
}

fn parse_component(name: &'static str, value: &str) -> Result<f64, TimestampError> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))?;
    if !parsed.is_finite() {
        return Err(TimestampError::InvalidValue(name, value.to_string()));
    }
    if parsed < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(parsed)
}

/// Parse a timestamp string to total seconds.
///
/// ```
/// use ckiller_models::text::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let total = match parts.as_slice() {
        [secs] => parse_component("seconds", secs)?,
        [mins, secs] => parse_component("minutes", mins)? * 60.0 + parse_component("seconds", secs)?,
        [hours, mins, secs] => {
            parse_component("hours", hours)? * 3600.0
                + parse_component("minutes", mins)? * 60.0
                + parse_component("seconds", secs)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_TIMESTAMP_SECS {
        return Err(TimestampError::TooLarge);
    }
    Ok(total)
}

/// Normalize a timestamp to `HH:MM:SS` (fractional seconds are truncated).
pub fn normalize_timestamp(ts: &str) -> Result<String, TimestampError> {
    Ok(format_seconds(parse_timestamp(ts)?))
}

/// Format seconds as `HH:MM:SS`.
pub fn format_seconds(total_secs: f64) -> String {
    let total = total_secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Whether segments are sorted by position.
pub fn is_chronological(segments: &[TimestampedText]) -> bool {
    let mut last = -1.0;
    for segment in segments {
        match segment.seconds() {
            Ok(secs) if secs >= last => last = secs,
            _ => return false,
        }
    }
    true
}

/// Join segment texts into one narration script.
pub fn join_text(segments: &[TimestampedText]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
