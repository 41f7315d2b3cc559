//! Per-stage generation options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejection reason for invalid options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },

    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{field} is too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
}

/// Maximum length of free-form instructions passed along with a request.
pub const MAX_INSTRUCTIONS_LENGTH: usize = 2000;

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), OptionsError> {
    if !(min..=max).contains(&value) {
        return Err(OptionsError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(())
}

fn check_language(language: &str) -> Result<(), OptionsError> {
    if language.trim().is_empty() {
        return Err(OptionsError::Empty("language"));
    }
    Ok(())
}

fn check_instructions(instructions: Option<&str>) -> Result<(), OptionsError> {
    match instructions {
        Some(text) if text.chars().count() > MAX_INSTRUCTIONS_LENGTH => Err(OptionsError::TooLong {
            field: "instructions",
            max: MAX_INSTRUCTIONS_LENGTH,
        }),
        _ => Ok(()),
    }
}

/// Options for the description job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescriptionOptions {
    pub language: String,
    pub max_segments: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for DescriptionOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            max_segments: 20,
            instructions: None,
        }
    }
}

impl DescriptionOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        check_language(&self.language)?;
        check_range("maxSegments", self.max_segments as f64, 1.0, 200.0)?;
        check_instructions(self.instructions.as_deref())
    }
}

/// Commentary tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Humorous,
    Dramatic,
    Informative,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Neutral => "neutral",
            Tone::Humorous => "humorous",
            Tone::Dramatic => "dramatic",
            Tone::Informative => "informative",
        }
    }
}

/// Options for commentary generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentaryOptions {
    pub language: String,
    pub tone: Tone,
    pub max_words_per_segment: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for CommentaryOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            tone: Tone::Neutral,
            max_words_per_segment: 40,
            instructions: None,
        }
    }
}

impl CommentaryOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        check_language(&self.language)?;
        check_range("maxWordsPerSegment", self.max_words_per_segment as f64, 1.0, 500.0)?;
        check_instructions(self.instructions.as_deref())
    }
}

/// Narration voice offered by the speech provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
        }
    }
}

/// Output aspect ratio, serialized as `"W:H"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Vertical short-form video (9:16)
    pub const PORTRAIT: AspectRatio = AspectRatio::new(9, 16);
    pub const SQUARE: AspectRatio = AspectRatio::new(1, 1);
    pub const LANDSCAPE: AspectRatio = AspectRatio::new(16, 9);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_f64(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Output frame size for a given output height, rounded to even pixels.
    pub fn frame_size(&self, height: u32) -> (u32, u32) {
        let width = (height as f64 * self.as_f64()).round() as u32;
        (width & !1, height & !1)
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum AspectRatioParseError {
    #[error("Invalid aspect ratio format: {0}, expected 'W:H'")]
    InvalidFormat(String),
    #[error("Invalid number in aspect ratio: {0}")]
    InvalidNumber(String),
    #[error("Aspect ratio cannot have zero values")]
    ZeroValue,
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError::InvalidFormat(s.to_string()))?;

        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(width.to_string()))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError::InvalidNumber(height.to_string()))?;

        if width == 0 || height == 0 {
            return Err(AspectRatioParseError::ZeroValue);
        }
        Ok(AspectRatio { width, height })
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = AspectRatioParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(value: AspectRatio) -> Self {
        value.to_string()
    }
}

/// Options for the video job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoOptions {
    pub subtitles_enabled: bool,
    pub voice: Voice,
    pub aspect_ratio: AspectRatio,
    pub playback_speed: f64,
    /// Volume of the source audio under narration
    pub original_volume: f64,
    pub narration_volume: f64,
    pub subtitle_font_size: u32,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            subtitles_enabled: true,
            voice: Voice::default(),
            aspect_ratio: AspectRatio::default(),
            playback_speed: 1.0,
            original_volume: 0.2,
            narration_volume: 1.0,
            subtitle_font_size: 24,
        }
    }
}

impl VideoOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        check_range("playbackSpeed", self.playback_speed, 0.5, 2.0)?;
        check_range("originalVolume", self.original_volume, 0.0, 1.0)?;
        check_range("narrationVolume", self.narration_volume, 0.0, 2.0)?;
        check_range("subtitleFontSize", self.subtitle_font_size as f64, 8.0, 96.0)
    }
}

/// All option groups of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectOptions {
    pub description: DescriptionOptions,
    pub commentary: CommentaryOptions,
    pub video: VideoOptions,
}

impl ProjectOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        self.description.validate()?;
        self.commentary.validate()?;
        self.video.validate()
    }
}
