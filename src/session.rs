use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

/// One dubbing request. The identifier scopes every artifact path, so
/// concurrent sessions sharing an upload directory never collide.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    upload_dir: PathBuf,
}

impl Session {
    /// Mint a session with a fresh unique identifier
    pub fn new(upload_dir: &Path) -> Self {
        Self::with_id(upload_dir, Uuid::new_v4().to_string())
    }

    /// Construct a session with a known identifier
    pub fn with_id(upload_dir: &Path, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            upload_dir: upload_dir.to_path_buf(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where the raw uploaded video is kept, preserving its extension
    pub fn raw_video_path(&self, extension: &str) -> PathBuf {
        self.upload_dir
            .join(format!("original_{}.{}", self.id, extension))
    }

    /// The synthesized speech track
    pub fn dubbed_audio_path(&self) -> PathBuf {
        self.upload_dir.join(format!("audio_{}.mp3", self.id))
    }

    /// Intermediate video with the audio track stripped; deleted after a
    /// successful remux
    pub fn silent_video_path(&self) -> PathBuf {
        self.upload_dir.join(format!("temp_video_{}.mp4", self.id))
    }

    /// The final dubbed video
    pub fn final_video_path(&self) -> PathBuf {
        self.upload_dir.join(format!("final_vid_{}.mp4", self.id))
    }

    pub fn original_transcript_path(&self) -> PathBuf {
        self.upload_dir.join(format!("original_{}.txt", self.id))
    }

    pub fn translated_transcript_path(&self) -> PathBuf {
        self.upload_dir.join(format!("translated_{}.txt", self.id))
    }
}

/// Everything a completed session produced
#[derive(Debug, Clone, Serialize)]
pub struct DubbingResult {
    pub original_video_file: PathBuf,
    pub dubbed_audio_file: PathBuf,
    pub final_dubbed_video_file: PathBuf,
    pub original_transcript_file: PathBuf,
    pub translated_transcript_file: PathBuf,
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths_embed_session_id() {
        let session = Session::with_id(Path::new("uploads"), "abc123");

        let paths = [
            session.raw_video_path("mp4"),
            session.dubbed_audio_path(),
            session.silent_video_path(),
            session.final_video_path(),
            session.original_transcript_path(),
            session.translated_transcript_path(),
        ];

        for path in &paths {
            assert!(
                path.to_string_lossy().contains("abc123"),
                "path {} does not embed the session id",
                path.display()
            );
            assert!(path.starts_with("uploads"));
        }
    }

    #[test]
    fn test_distinct_sessions_never_share_paths() {
        let a = Session::new(Path::new("uploads"));
        let b = Session::new(Path::new("uploads"));

        assert_ne!(a.id(), b.id());
        assert_ne!(a.final_video_path(), b.final_video_path());
        assert_ne!(a.dubbed_audio_path(), b.dubbed_audio_path());
    }

    #[test]
    fn test_raw_video_keeps_extension() {
        let session = Session::with_id(Path::new("uploads"), "s1");
        assert!(session
            .raw_video_path("mkv")
            .to_string_lossy()
            .ends_with("original_s1.mkv"));
    }

    #[test]
    fn test_result_serializes_with_response_keys() {
        let result = DubbingResult {
            original_video_file: PathBuf::from("uploads/original_s1.mp4"),
            dubbed_audio_file: PathBuf::from("uploads/audio_s1.mp3"),
            final_dubbed_video_file: PathBuf::from("uploads/final_vid_s1.mp4"),
            original_transcript_file: PathBuf::from("uploads/original_s1.txt"),
            translated_transcript_file: PathBuf::from("uploads/translated_s1.txt"),
            language: "es".to_string(),
        };

        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 6);
        for key in [
            "original_video_file",
            "dubbed_audio_file",
            "final_dubbed_video_file",
            "original_transcript_file",
            "translated_transcript_file",
        ] {
            assert!(object[key].is_string(), "missing key {}", key);
        }
        assert_eq!(object["language"], "es");
    }
}
