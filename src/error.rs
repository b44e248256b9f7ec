use thiserror::Error;

/// Problems with the input video before the pipeline starts.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("input file does not exist: {0}")]
    Missing(String),

    #[error("not a recognized video file: {0}")]
    NotVideo(String),

    #[error("failed to store uploaded video: {0}")]
    Store(#[source] std::io::Error),
}

/// Audio extraction and remuxing failures.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("no audio stream found in {0}")]
    NoAudioStream(String),

    #[error("failed to write audio samples: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg {stage} failed ({status}): {stderr}")]
    CommandFailed {
        stage: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech-recognition model failures.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("failed to fetch model files: {0}")]
    Fetch(#[from] hf_hub::api::sync::ApiError),

    #[error("model error: {0}")]
    Model(#[from] candle_core::Error),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("unsupported number of mel bins: {0}")]
    UnsupportedMelBins(usize),

    #[error("invalid model config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read audio: {0}")]
    Audio(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Translation failures. Per-segment request failures are swallowed into
/// the sentinel text and never surface here; only an all-sentinel batch is
/// promoted to `AllSegmentsFailed`.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("failed to build translation client: {0}")]
    Backend(String),

    #[error("translation request failed: {0}")]
    Request(String),

    #[error("every segment failed to translate")]
    AllSegmentsFailed,
}

/// Text-to-speech failures.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("ELEVENLABS_API_KEY and VOICE_ID are required for synthesis")]
    Credentials,

    #[error("text-to-speech API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to write dubbed audio: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything that can end a dubbing session early.
#[derive(Debug, Error)]
pub enum DubError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("failed to write transcript: {0}")]
    Transcript(#[source] std::io::Error),
}
