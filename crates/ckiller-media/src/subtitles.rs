//! SRT subtitle writing.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// One subtitle cue on the output timeline, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Shift by `offset` seconds.
    pub fn shifted(&self, offset: f64) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            text: self.text.clone(),
        }
    }
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
pub fn format_srt_time(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60,
        ms
    )
}

/// Render cues as an SRT document. Empty cues are dropped and cues are
/// numbered in start order.
pub fn to_srt(cues: &[SubtitleCue]) -> String {
    let mut sorted: Vec<&SubtitleCue> = cues
        .iter()
        .filter(|c| !c.text.trim().is_empty() && c.end > c.start)
        .collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut out = String::new();
    for (index, cue) in sorted.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            index + 1,
            format_srt_time(cue.start),
            format_srt_time(cue.end),
            cue.text.trim()
        );
    }
    out
}

pub async fn write_srt(path: impl AsRef<Path>, cues: &[SubtitleCue]) -> MediaResult<()> {
    tokio::fs::write(path, to_srt(cues)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_srt_time() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3661.25), "01:01:01,250");
        assert_eq!(format_srt_time(-1.0), "00:00:00,000");
    }

    #[test]
    fn test_to_srt_orders_and_skips_empty() {
        let cues = vec![
            SubtitleCue::new(4.0, 6.5, "second"),
            SubtitleCue::new(1.0, 2.0, "  "),
            SubtitleCue::new(0.5, 3.0, " first "),
        ];
        assert_eq!(
            to_srt(&cues),
            "1\n00:00:00,500 --> 00:00:03,000\nfirst\n\n2\n00:00:04,000 --> 00:00:06,500\nsecond\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_srt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.srt");
        write_srt(&path, &[SubtitleCue::new(0.0, 1.0, "hi").shifted(2.0)])
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("00:00:02,000 --> 00:00:03,000"));
    }
}
