//! Video scaling and narration composition.

use std::path::{Path, PathBuf};

use ckiller_models::AspectRatio;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_media;

/// Output height for portrait frames; other shapes use 1080 on the short side.
const PORTRAIT_HEIGHT: u32 = 1920;
const SHORT_SIDE: u32 = 1080;

/// Output frame size for an aspect ratio.
pub fn output_frame(aspect: AspectRatio) -> (u32, u32) {
    if aspect.height > aspect.width {
        aspect.frame_size(PORTRAIT_HEIGHT)
    } else {
        let width = (SHORT_SIDE as f64 * aspect.as_f64()).round() as u32;
        (width & !1, SHORT_SIDE)
    }
}

/// Scale and center-crop `input` to fill the aspect ratio.
pub async fn scale_to_aspect(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    aspect: AspectRatio,
) -> MediaResult<()> {
    let (width, height) = output_frame(aspect);
    info!("Scaling video to {}x{} ({})", width, height, aspect);

    let cmd = FfmpegCommand::new(input, output)
        .video_filter(format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
            w = width,
            h = height
        ))
        .video_codec("libx264")
        .preset("veryfast")
        .crf(20)
        .audio_codec("copy");

    runner.run(&cmd).await
}

/// A narration clip placed on the source timeline.
#[derive(Debug, Clone)]
pub struct NarrationClip {
    pub path: PathBuf,
    /// Position in the source video, before playback speed is applied
    pub start_secs: f64,
}

/// Subtitle burn-in settings.
#[derive(Debug, Clone)]
pub struct BurnSubtitles {
    pub path: PathBuf,
    pub font_size: u32,
}

/// Mixing settings for [`compose_video`].
#[derive(Debug, Clone)]
pub struct ComposeSettings {
    pub playback_speed: f64,
    /// Source audio level under narration
    pub original_volume: f64,
    pub narration_volume: f64,
    pub subtitles: Option<BurnSubtitles>,
}

fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace(',', "\\,")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

/// Build the FFmpeg command mixing narration into the scaled video.
///
/// Narration clips are delayed to their timestamps on the sped-up timeline;
/// source audio is kept at `original_volume` when present.
pub fn build_compose_command(
    video: &Path,
    video_has_audio: bool,
    clips: &[NarrationClip],
    settings: &ComposeSettings,
    output: &Path,
) -> MediaResult<FfmpegCommand> {
    if clips.is_empty() && !video_has_audio {
        return Err(MediaError::InvalidVideo(
            "nothing to mix: no narration and no source audio".to_string(),
        ));
    }

    let speed = settings.playback_speed;
    let mut cmd = FfmpegCommand::new(video, output);
    for clip in clips {
        cmd = cmd.add_input(&clip.path);
    }

    let mut graph = Vec::new();

    let mut video_chain = format!("[0:v]setpts=PTS/{speed}");
    if let Some(subs) = &settings.subtitles {
        video_chain.push_str(&format!(
            ",subtitles=filename={}:force_style='FontSize={}'",
            escape_filter_path(&subs.path),
            subs.font_size
        ));
    }
    video_chain.push_str("[vout]");
    graph.push(video_chain);

    let mut mix_inputs = Vec::new();
    if video_has_audio {
        graph.push(format!(
            "[0:a]atempo={speed},volume={}[orig]",
            settings.original_volume
        ));
        mix_inputs.push("[orig]".to_string());
    }

    for (index, clip) in clips.iter().enumerate() {
        let delay_ms = ((clip.start_secs / speed) * 1000.0).round().max(0.0) as u64;
        graph.push(format!(
            "[{}:a]adelay={delay_ms}:all=1,volume={}[n{index}]",
            index + 1,
            settings.narration_volume
        ));
        mix_inputs.push(format!("[n{index}]"));
    }

    // The source audio bounds the mix when present; otherwise pad narration
    // and let the video stream decide the length.
    let duration = if video_has_audio { "first" } else { "longest" };
    let tail = if video_has_audio { "" } else { ",apad" };
    graph.push(format!(
        "{}amix=inputs={}:duration={duration}:dropout_transition=0:normalize=0{tail}[aout]",
        mix_inputs.concat(),
        mix_inputs.len()
    ));

    cmd = cmd
        .filter_complex(graph.join(";"))
        .map("[vout]")
        .map("[aout]")
        .video_codec("libx264")
        .preset("veryfast")
        .crf(23)
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-movflags", "+faststart"]);

    if !video_has_audio {
        cmd = cmd.output_arg("-shortest");
    }
    Ok(cmd)
}

/// Compose the final video, reporting whole percentages of the output length.
pub async fn compose_video<F>(
    runner: &FfmpegRunner,
    video: &Path,
    clips: &[NarrationClip],
    settings: &ComposeSettings,
    output: &Path,
    on_progress: F,
) -> MediaResult<()>
where
    F: Fn(u8) + Send + 'static,
{
    let info = probe_media(video).await?;
    let total_ms = (info.duration_ms() as f64 / settings.playback_speed) as i64;
    let cmd = build_compose_command(video, info.has_audio, clips, settings, output)?;

    info!(
        "Composing {} narration clips over {:.1}s of video",
        clips.len(),
        info.duration
    );

    runner
        .run_with_progress(&cmd, move |progress| {
            on_progress(progress.percentage(total_ms).floor() as u8);
        })
        .await
}
