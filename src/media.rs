//! Audio extraction from uploaded video files.
//!
//! Uses ffmpeg to pull the audio track out of a video as a mono 16kHz MP3,
//! the format the transcription service expects.

use crate::error::{MerkeError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Extracts the audio track of a video to an MP3 next to the source file.
///
/// Produces mono 16kHz audio at a fixed 192k bitrate. The call is bounded
/// by `timeout`; an elapsed timeout kills the encoder and is fatal for the
/// processing run.
pub async fn extract_audio(video_path: &Path, timeout: Duration) -> Result<PathBuf> {
    extract_with("ffmpeg", video_path, timeout).await
}

/// Output path for the extracted audio. The `.audio.mp3` suffix keeps it
/// distinct from the source even when the upload is itself an MP3.
fn audio_output_path(video_path: &Path) -> PathBuf {
    video_path.with_extension("audio.mp3")
}

#[instrument(skip_all, fields(video = %video_path.display()))]
async fn extract_with(program: &str, video_path: &Path, timeout: Duration) -> Result<PathBuf> {
    let audio_path = audio_output_path(video_path);

    debug!("Extracting audio to {:?}", audio_path);

    // kill_on_drop so an elapsed timeout terminates the encoder instead of
    // leaving it running (and rewriting the output) in the background.
    let child = Command::new(program)
        .arg("-y")
        .arg("-i").arg(video_path)
        .arg("-vn")
        .arg("-acodec").arg("mp3")
        .arg("-ab").arg("192k")
        .arg("-ar").arg("16000")
        .arg("-ac").arg("1")
        .arg("-loglevel").arg("error")
        .arg(&audio_path)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let result = match tokio::time::timeout(timeout, child).await {
        Ok(r) => r,
        Err(_) => {
            let _ = std::fs::remove_file(&audio_path);
            return Err(MerkeError::ToolFailed(format!(
                "ffmpeg timed out after {}s",
                timeout.as_secs()
            )));
        }
    };

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MerkeError::ToolNotFound(program.to_string()));
        }
        Err(e) => {
            return Err(MerkeError::AudioExtraction(format!(
                "ffmpeg execution failed: {e}"
            )));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MerkeError::AudioExtraction(format!(
            "ffmpeg failed: {stderr}"
        )));
    }

    info!("Audio extracted to {:?}", audio_path);
    Ok(audio_path)
}

/// Removes an extracted audio file, logging rather than failing on error.
pub fn cleanup_audio(audio_path: &Path) {
    if audio_path.exists() {
        if let Err(e) = std::fs::remove_file(audio_path) {
            tracing::warn!("Failed to clean up audio file {:?}: {}", audio_path, e);
        }
    }
}

/// Check whether ffmpeg is available on the PATH.
pub async fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_output_path_distinct_from_mp3_input() {
        assert_eq!(
            audio_output_path(Path::new("/tmp/talk.mp4")),
            PathBuf::from("/tmp/talk.audio.mp3")
        );
        // An MP3 upload must not have ffmpeg read and write the same file.
        assert_eq!(
            audio_output_path(Path::new("/tmp/song.mp3")),
            PathBuf::from("/tmp/song.audio.mp3")
        );
    }

    #[tokio::test]
    async fn test_missing_input_reports_extraction_error() {
        if !ffmpeg_available().await {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist.mp4");
        let err = extract_audio(&missing, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, MerkeError::AudioExtraction(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_slow_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("tool.pid");
        let script = dir.path().join("slow-tool.sh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let video = dir.path().join("input.mp4");
        std::fs::write(&video, b"fake").unwrap();

        let started = std::time::Instant::now();
        let err = extract_with(
            script.to_str().unwrap(),
            &video,
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MerkeError::ToolFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(10));

        // The child must not outlive the timeout: its pid should be gone
        // (or at worst an unreaped zombie) shortly after the error returns.
        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut terminated = false;
        for _ in 0..30 {
            match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => {
                    terminated = true;
                    break;
                }
                Ok(stat) if stat.contains(") Z ") => {
                    terminated = true;
                    break;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        assert!(terminated, "extraction tool survived the timeout");
    }
}
