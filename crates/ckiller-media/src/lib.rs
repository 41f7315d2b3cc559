//! yt-dlp and FFmpeg CLI wrappers.
//!
//! This crate provides:
//! - Video download with percentage progress
//! - Type-safe FFmpeg command building and `-progress pipe:2` parsing
//! - FFprobe media inspection
//! - Scaling, narration mixing and subtitle burn-in
//! - SRT subtitle writing

pub mod command;
pub mod compose;
pub mod download;
pub mod error;
pub mod probe;
pub mod progress;
pub mod subtitles;

pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner};
pub use compose::{compose_video, scale_to_aspect, BurnSubtitles, ComposeSettings, NarrationClip};
pub use download::download_video;
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use subtitles::{to_srt, write_srt, SubtitleCue};
