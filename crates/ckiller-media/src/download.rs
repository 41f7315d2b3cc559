//! Video download using yt-dlp.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::progress::parse_download_progress_line;

const STDERR_TAIL_LINES: usize = 10;

/// Download a video from `url` to `output_path`, reporting whole percentages.
///
/// Percentages are reported as yt-dlp prints them; with separate video and
/// audio streams the value restarts from zero for the second stream.
pub async fn download_video<F>(url: &str, output_path: impl AsRef<Path>, on_progress: F) -> MediaResult<()>
where
    F: Fn(u8) + Send + 'static,
{
    let output_path = output_path.as_ref();
    check_ytdlp()?;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("Downloading video from {} to {}", url, output_path.display());

    let mut child = Command::new("yt-dlp")
        .args([
            "--newline",
            "--no-playlist",
            "--no-part",
            "-f",
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            "--merge-output-format",
            "mp4",
            "-o",
        ])
        .arg(output_path)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::internal("yt-dlp stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::internal("yt-dlp stderr not captured"))?;

    let stdout_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut last = None;
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(percent) = parse_download_progress_line(&line) {
                let percent = percent.floor() as u8;
                if last != Some(percent) {
                    last = Some(percent);
                    on_progress(percent);
                }
            } else {
                debug!("yt-dlp: {}", line);
            }
        }
    });

    let stderr_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail
    });

    let status = child.wait().await?;
    let _ = stdout_handle.await;
    let stderr_tail = stderr_handle.await.unwrap_or_default();

    if !status.success() {
        let message = stderr_tail
            .iter()
            .rev()
            .find(|l| l.contains("ERROR"))
            .or_else(|| stderr_tail.back())
            .cloned()
            .unwrap_or_else(|| format!("yt-dlp exited with status {:?}", status.code()));
        return Err(MediaError::download_failed(message));
    }

    if !output_path.exists() {
        return Err(MediaError::download_failed(format!(
            "yt-dlp reported success but {} is missing",
            output_path.display()
        )));
    }

    info!("Downloaded video to {}", output_path.display());
    Ok(())
}
