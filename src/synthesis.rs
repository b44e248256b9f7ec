use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::error::SynthesisError;
use crate::session::Session;

const API_BASE: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Language the monolingual voice model covers
const DEFAULT_LANGUAGE: &str = "en";
const MODEL_MONOLINGUAL: &str = "eleven_monolingual_v1";
const MODEL_MULTILINGUAL: &str = "eleven_multilingual_v1";

fn model_for_language(language: &str) -> &'static str {
    if language == DEFAULT_LANGUAGE {
        MODEL_MONOLINGUAL
    } else {
        MODEL_MULTILINGUAL
    }
}

/// Request body for the text-to-speech endpoint
#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// Voice rendering parameters. Fixed for every session; not request-tunable.
#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// Client for the ElevenLabs text-to-speech API
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
}

impl SpeechSynthesizer {
    pub fn new(
        api_key: impl Into<String>,
        voice_id: impl Into<String>,
    ) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            voice_id: voice_id.into(),
        })
    }

    /// Render `text` as speech in the configured voice and write the MP3
    /// for this session. One network call; the whole text is synthesized
    /// as a single utterance.
    pub async fn synthesize(
        &self,
        text: &str,
        language: &str,
        session: &Session,
    ) -> Result<PathBuf, SynthesisError> {
        let output_path = session.dubbed_audio_path();
        let url = format!("{}/{}", API_BASE, self.voice_id);

        let body = SynthesisRequest {
            text,
            model_id: model_for_language(language),
            voice_settings: VoiceSettings::default(),
        };

        info!(
            "Synthesizing {} characters of {} speech...",
            text.len(),
            language
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api { status, body });
        }

        let audio = response.bytes().await?;
        std::fs::write(&output_path, &audio)?;

        info!("Dubbed audio written to {}", output_path.display());
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_selection_by_language() {
        assert_eq!(model_for_language("en"), MODEL_MONOLINGUAL);
        assert_eq!(model_for_language("es"), MODEL_MULTILINGUAL);
        assert_eq!(model_for_language("ja"), MODEL_MULTILINGUAL);
    }

    #[test]
    fn test_request_serialization() {
        let body = SynthesisRequest {
            text: "hola mundo",
            model_id: model_for_language("es"),
            voice_settings: VoiceSettings::default(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "hola mundo");
        assert_eq!(json["model_id"], "eleven_multilingual_v1");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
    }
}
