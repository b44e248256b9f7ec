pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod remux;
pub mod session;
pub mod synthesis;
pub mod transcript;
pub mod translate;
pub mod whisper;

pub use audio::{cleanup_orphaned_temp_files, extract_audio, is_video_file, ExtractedAudio};
pub use config::Config;
pub use error::{
    DubError, MediaError, SynthesisError, TranscriptionError, TranslationError, UploadError,
};
pub use session::{DubbingResult, Session};
pub use synthesis::SpeechSynthesizer;
pub use transcript::{
    format_segments, format_timestamp, read_transcript, save_transcript, FormattedSegment,
    Segment, TranscriptWriter,
};
pub use translate::{translate_segments, HttpTranslator, LlmTranslator, Translate, Translator};
pub use whisper::Transcriber;
