//! Progress parsing for FFmpeg and yt-dlp output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total output duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).clamp(0.0, 100.0)
    }
}

/// Parse one line of `-progress pipe:2` output into `current`.
///
/// Returns a snapshot when a `progress=` line closes a block.
pub fn parse_ffmpeg_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            // Both keys carry microseconds in current FFmpeg releases
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.trim().strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

static DOWNLOAD_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").unwrap());

/// Parse a yt-dlp `--newline` progress line such as `[download]  42.3% of 10.00MiB`.
pub fn parse_download_progress_line(line: &str) -> Option<f64> {
    let caps = DOWNLOAD_PERCENT.captures(line.trim_start())?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };
        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(2500) - 100.0).abs() < 0.01);
        assert_eq!(progress.percentage(0), 0.0);
    }

    #[test]
    fn test_ffmpeg_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_ffmpeg_progress_line("out_time_us=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);

        parse_ffmpeg_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);
        parse_ffmpeg_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let block = parse_ffmpeg_progress_line("progress=continue", &mut progress).unwrap();
        assert!(!block.is_complete);
        let block = parse_ffmpeg_progress_line("progress=end", &mut progress).unwrap();
        assert!(block.is_complete);
        assert_eq!(block.percentage(60_000), 100.0);
    }

    #[test]
    fn test_download_progress_parsing() {
        assert_eq!(
            parse_download_progress_line("[download]  42.3% of   10.00MiB at  1.00MiB/s ETA 00:05"),
            Some(42.3)
        );
        assert_eq!(parse_download_progress_line("[download] 100% of 10.00MiB"), Some(100.0));
        assert_eq!(
            parse_download_progress_line("[download] Destination: /tmp/source.mp4"),
            None
        );
        assert_eq!(parse_download_progress_line("[youtube] abc: Downloading webpage"), None);
    }
}
