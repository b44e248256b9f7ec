use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use tracing::debug;

use crate::error::MediaError;

extern crate ffmpeg_next as ffmpeg;

/// Sample rate the Whisper models expect
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Known video file extensions accepted as uploads
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpeg", "mpg", "3gp",
];

/// Check if the file is a video file based on extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A handle to the extracted audio track in the system temp directory.
/// The file is removed when this struct is dropped; the extracted audio is
/// only needed until transcription has consumed it.
pub struct ExtractedAudio {
    path: PathBuf,
    duration_secs: f64,
}

impl ExtractedAudio {
    /// Path to the extracted WAV file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Duration of the audio in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }
}

impl Drop for ExtractedAudio {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Remove temp WAV files left behind by processes that were killed before
/// their `ExtractedAudio` handle could drop. Called once at startup.
pub fn cleanup_orphaned_temp_files() {
    let temp_dir = std::env::temp_dir();
    let current_pid = std::process::id();

    let Ok(entries) = std::fs::read_dir(&temp_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(pid_str) = name.strip_prefix("dubber_").and_then(|s| s.strip_suffix(".wav"))
        else {
            continue;
        };
        let Ok(pid) = pid_str.parse::<u32>() else {
            continue;
        };

        if pid != current_pid && !is_process_running(pid) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Check if a process with the given PID is still running
fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 checks existence without delivering anything
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        // Without a cheap liveness probe, assume the owner is alive
        let _ = pid;
        true
    }
}

/// Extract the audio track of a video file to a temporary WAV at 16kHz mono,
/// the format the Whisper models require.
///
/// The returned `ExtractedAudio` handle removes the temp file when dropped.
/// Uses ffmpeg-next for decoding (links against system FFmpeg libraries).
/// If a progress bar is provided, it is advanced by stream position.
pub fn extract_audio(input: &Path, progress: Option<&ProgressBar>) -> Result<ExtractedAudio, MediaError> {
    let temp_wav = std::env::temp_dir().join(format!("dubber_{}.wav", std::process::id()));

    // Safe to call multiple times
    ffmpeg::init()?;

    let mut ictx = ffmpeg::format::input(input)?;

    // Duration in microseconds, for progress tracking
    let duration_us = ictx.duration();
    if let Some(pb) = progress {
        if duration_us > 0 {
            pb.set_length(duration_us as u64);
        }
    }

    let audio_stream_index = ictx
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or_else(|| MediaError::NoAudioStream(input.display().to_string()))?
        .index();

    let audio_stream = ictx
        .stream(audio_stream_index)
        .ok_or_else(|| MediaError::NoAudioStream(input.display().to_string()))?;
    let time_base = audio_stream.time_base();
    let audio_params = audio_stream.parameters();

    let decoder_context = ffmpeg::codec::context::Context::from_parameters(audio_params)?;
    let mut decoder = decoder_context.decoder().audio()?;

    // Convert whatever the source carries to 16kHz mono s16
    let mut resampler = ffmpeg::software::resampling::context::Context::get(
        decoder.format(),
        decoder.channel_layout(),
        decoder.rate(),
        ffmpeg::format::Sample::I16(ffmpeg::format::sample::Type::Packed),
        ffmpeg::ChannelLayout::MONO,
        WHISPER_SAMPLE_RATE,
    )?;

    let mut all_samples: Vec<i16> = Vec::new();

    for (stream, packet) in ictx.packets() {
        if stream.index() != audio_stream_index {
            continue;
        }

        if let (Some(pb), Some(pts)) = (progress, packet.pts()) {
            let time_us =
                pts * 1_000_000 * time_base.numerator() as i64 / time_base.denominator() as i64;
            if time_us > 0 {
                pb.set_position(time_us as u64);
            }
        }

        decoder.send_packet(&packet).ok();

        let mut decoded_frame = ffmpeg::frame::Audio::empty();
        while decoder.receive_frame(&mut decoded_frame).is_ok() {
            let mut resampled_frame = ffmpeg::frame::Audio::empty();
            resampler.run(&decoded_frame, &mut resampled_frame)?;

            if resampled_frame.samples() > 0 {
                let data = resampled_frame.data(0);
                let samples: &[i16] = bytemuck::cast_slice(data);
                all_samples.extend_from_slice(&samples[..resampled_frame.samples()]);
            }
        }
    }

    // Flush the decoder
    decoder.send_eof().ok();
    let mut decoded_frame = ffmpeg::frame::Audio::empty();
    while decoder.receive_frame(&mut decoded_frame).is_ok() {
        let mut resampled_frame = ffmpeg::frame::Audio::empty();
        if resampler.run(&decoded_frame, &mut resampled_frame).is_ok()
            && resampled_frame.samples() > 0
        {
            let data = resampled_frame.data(0);
            let samples: &[i16] = bytemuck::cast_slice(data);
            all_samples.extend_from_slice(&samples[..resampled_frame.samples()]);
        }
    }

    // Flush the resampler
    loop {
        let mut resampled_frame = ffmpeg::frame::Audio::empty();
        match resampler.flush(&mut resampled_frame) {
            Ok(_) if resampled_frame.samples() > 0 => {
                let data = resampled_frame.data(0);
                let samples: &[i16] = bytemuck::cast_slice(data);
                all_samples.extend_from_slice(&samples[..resampled_frame.samples()]);
            }
            _ => break,
        }
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: WHISPER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&temp_wav, spec)?;
    for sample in &all_samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;

    let duration_secs = all_samples.len() as f64 / WHISPER_SAMPLE_RATE as f64;
    debug!(
        "Extracted {} samples ({:.2}s) to {}",
        all_samples.len(),
        duration_secs,
        temp_wav.display()
    );

    Ok(ExtractedAudio {
        path: temp_wav,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("clip.mp4")));
        assert!(is_video_file(Path::new("clip.MKV")));
        assert!(!is_video_file(Path::new("clip.mp3")));
        assert!(!is_video_file(Path::new("clip")));
    }

    #[test]
    fn test_ffmpeg_init() {
        assert!(ffmpeg::init().is_ok(), "FFmpeg should initialize successfully");
    }
}
