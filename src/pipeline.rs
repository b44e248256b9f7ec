use std::ffi::OsStr;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::audio::{extract_audio, is_video_file};
use crate::config::Config;
use crate::error::{DubError, SynthesisError, UploadError};
use crate::remux::remux_dubbed_video;
use crate::session::{DubbingResult, Session};
use crate::synthesis::SpeechSynthesizer;
use crate::transcript::{format_segments, save_transcript};
use crate::translate::{translate_segments, Translator};
use crate::whisper::Transcriber;

/// Run one dubbing session end to end.
///
/// The progression is strictly linear: uploaded, audio-extracted,
/// transcribed, translated, transcripts-saved, synthesized, remuxed. The
/// first failing step is terminal; no step is retried or re-entered.
/// Every artifact lands in `config.upload_dir` under the session id.
pub async fn run(config: &Config) -> Result<DubbingResult, DubError> {
    let input = config.input.as_path();
    if !input.exists() {
        return Err(UploadError::Missing(input.display().to_string()).into());
    }
    if !is_video_file(input) {
        return Err(UploadError::NotVideo(input.display().to_string()).into());
    }

    std::fs::create_dir_all(&config.upload_dir).map_err(UploadError::Store)?;

    let session = Session::new(&config.upload_dir);
    info!("Session {} started for {}", session.id(), input.display());

    // Keep the raw video under the session's name
    let extension = input
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("mp4");
    let raw_video = session.raw_video_path(extension);
    std::fs::copy(input, &raw_video).map_err(UploadError::Store)?;

    let progress = create_progress_bar("Extracting audio");
    let extracted = extract_audio(&raw_video, Some(&progress))?;
    finish_progress(&progress);
    info!("Audio extracted ({:.2} seconds)", extracted.duration_secs());

    let device = config.device.to_candle_device();
    let mut transcriber = Transcriber::load(
        config.model,
        Some(config.cache_dir()),
        device,
        config.source_language.clone(),
    )?;

    let progress = create_progress_bar("Transcribing");
    let segments = transcriber.transcribe(extracted.path(), Some(&progress))?;
    finish_progress(&progress);
    info!("Transcribed {} segments", segments.len());

    // The temp audio has served its purpose; its file is removed here
    drop(extracted);

    let original = format_segments(&segments);

    // Aborts on all-failure before any transcript is written
    let translator = Translator::from_config(config)?;
    let translated = translate_segments(&translator, &segments, &config.lang).await?;

    let original_transcript = session.original_transcript_path();
    let translated_transcript = session.translated_transcript_path();
    save_transcript(&original_transcript, &original).map_err(DubError::Transcript)?;
    save_transcript(&translated_transcript, &translated).map_err(DubError::Transcript)?;
    info!(
        "Transcripts saved to {} and {}",
        original_transcript.display(),
        translated_transcript.display()
    );

    // Per-segment timing is intentionally lost here: the dub is one
    // continuous utterance, not re-split to the original boundaries
    let full_text = translated
        .iter()
        .map(|seg| seg.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let api_key = config
        .elevenlabs_api_key
        .as_deref()
        .ok_or(SynthesisError::Credentials)?;
    let voice_id = config
        .voice_id
        .as_deref()
        .ok_or(SynthesisError::Credentials)?;
    let synthesizer = SpeechSynthesizer::new(api_key, voice_id)?;
    let dubbed_audio = synthesizer
        .synthesize(&full_text, &config.lang, &session)
        .await?;

    let final_video = remux_dubbed_video(&raw_video, &dubbed_audio, &session)?;

    info!("Session {} done", session.id());

    Ok(DubbingResult {
        original_video_file: raw_video,
        dubbed_audio_file: dubbed_audio,
        final_dubbed_video_file: final_video,
        original_transcript_file: original_transcript,
        translated_transcript_file: translated_transcript,
        language: config.lang.clone(),
    })
}

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:43}] {percent}%")
            .unwrap()
            .progress_chars("█░"),
    );
    pb.set_message(message.to_string());
    pb
}

// Fill the bar completely before finishing
fn finish_progress(pb: &ProgressBar) {
    if let Some(len) = pb.length() {
        pb.set_position(len);
    }
    pb.finish();
}
