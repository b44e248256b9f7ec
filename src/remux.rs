use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::MediaError;
use crate::session::Session;

/// Stage 1: copy the video stream into a new container, dropping audio.
/// No re-encoding.
fn strip_audio_args(video: &Path, silent: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push("-y".into());
    args.push("-i".into());
    args.push(video.into());
    args.push("-c:v".into());
    args.push("copy".into());
    args.push("-an".into());
    args.push(silent.into());
    args
}

/// Stage 2: mux the dubbed audio onto the silent video. Video is stream
/// copied, audio re-encoded to AAC, output truncated to the shorter stream.
fn combine_args(silent: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push("-y".into());
    args.push("-i".into());
    args.push(silent.into());
    args.push("-i".into());
    args.push(audio.into());
    args.push("-map".into());
    args.push("0:v:0".into());
    args.push("-map".into());
    args.push("1:a:0".into());
    args.push("-c:v".into());
    args.push("copy".into());
    args.push("-c:a".into());
    args.push("aac".into());
    args.push("-shortest".into());
    args.push(output.into());
    args
}

fn run_ffmpeg(stage: &'static str, args: &[OsString]) -> Result<(), MediaError> {
    debug!("ffmpeg {}: {:?}", stage, args);

    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .map_err(MediaError::Spawn)?;

    if !output.status.success() {
        return Err(MediaError::CommandFailed {
            stage,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}

/// Replace the original video's audio track with the dubbed one.
///
/// Two-stage remux: first a silent copy of the video stream, then the
/// dubbed track muxed in. The intermediate silent file is removed on
/// success; if a stage fails it may be left behind.
pub fn remux_dubbed_video(
    video: &Path,
    dubbed_audio: &Path,
    session: &Session,
) -> Result<PathBuf, MediaError> {
    let silent = session.silent_video_path();
    let output = session.final_video_path();

    run_ffmpeg("strip audio", &strip_audio_args(video, &silent))?;
    run_ffmpeg("mux dubbed audio", &combine_args(&silent, dubbed_audio, &output))?;

    std::fs::remove_file(&silent)?;

    info!("Final dubbed video written to {}", output.display());
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_strs(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_strip_audio_args() {
        let args = strip_audio_args(Path::new("in.mp4"), Path::new("silent.mp4"));
        assert_eq!(
            as_strs(&args),
            vec!["-y", "-i", "in.mp4", "-c:v", "copy", "-an", "silent.mp4"]
        );
    }

    #[test]
    fn test_combine_args() {
        let args = combine_args(
            Path::new("silent.mp4"),
            Path::new("dub.mp3"),
            Path::new("final.mp4"),
        );
        assert_eq!(
            as_strs(&args),
            vec![
                "-y", "-i", "silent.mp4", "-i", "dub.mp3", "-map", "0:v:0", "-map", "1:a:0",
                "-c:v", "copy", "-c:a", "aac", "-shortest", "final.mp4"
            ]
        );
    }
}
