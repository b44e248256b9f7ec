use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config as WhisperConfig};
use hf_hub::api::sync::{Api, ApiBuilder};
use hound::WavReader;
use indicatif::ProgressBar;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::WhisperModelSize;
use crate::error::TranscriptionError;
use crate::transcript::Segment;

const SAMPLE_RATE: usize = 16000;
const N_FRAMES: usize = 3000; // Frames per 30-second window
const HOP_LENGTH: usize = 160;
const N_FFT: usize = 400;

// Whisper timestamp token range
const TIMESTAMP_BEGIN: u32 = 50364; // <|0.00|>
const TIMESTAMP_END: u32 = 51864; // <|30.00|>

/// Convert a timestamp token to seconds
fn timestamp_token_to_seconds(token: u32) -> f64 {
    (token - TIMESTAMP_BEGIN) as f64 * 0.02
}

/// Check if a token is a timestamp token
fn is_timestamp_token(token: u32) -> bool {
    (TIMESTAMP_BEGIN..=TIMESTAMP_END).contains(&token)
}

/// Slaney-style mel scale: linear below 1kHz, logarithmic above
fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    if hz < min_log_hz {
        hz / f_sp
    } else {
        min_log_hz / f_sp + (hz / min_log_hz).ln() / (6.4f64.ln() / 27.0)
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_mel = 1000.0 / f_sp;
    if mel < min_log_mel {
        mel * f_sp
    } else {
        1000.0 * ((6.4f64.ln() / 27.0) * (mel - min_log_mel)).exp()
    }
}

/// Build the mel filterbank the Whisper feature extractor expects:
/// `n_mels` triangular filters over `N_FFT / 2 + 1` FFT bins, slaney
/// normalized, row-major.
fn mel_filterbank(n_mels: usize) -> Vec<f32> {
    let n_freqs = N_FFT / 2 + 1;
    let f_max = SAMPLE_RATE as f64 / 2.0;
    let max_mel = hz_to_mel(f_max);

    // Band edges: n_mels + 2 points evenly spaced on the mel scale
    let band_edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|i| f_max * i as f64 / (n_freqs - 1) as f64)
        .collect();

    let mut filters = vec![0f32; n_mels * n_freqs];
    for mel in 0..n_mels {
        let (lower, center, upper) = (band_edges[mel], band_edges[mel + 1], band_edges[mel + 2]);
        // Slaney normalization: constant energy per band
        let norm = 2.0 / (upper - lower);
        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            filters[mel * n_freqs + bin] = (weight * norm) as f32;
        }
    }

    filters
}

/// A decoded span with timestamps extracted from tokens
#[derive(Debug, Clone)]
struct DecodedSpan {
    start: f64,
    end: f64,
    tokens: Vec<u32>,
}

/// Check if text appears to be hallucinated garbage. Whisper sometimes
/// hallucinates on silence or music, producing repetitive nonsense.
fn looks_hallucinated(text: &str) -> bool {
    if text.chars().count() < 2 {
        return true;
    }

    let sentences: Vec<&str> = text
        .split(['.', '!', '?', '。', '！', '？'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.len() >= 3 {
        let mut seen = std::collections::HashMap::new();
        for sentence in &sentences {
            *seen.entry(*sentence).or_insert(0) += 1;
        }
        // The same sentence three or more times is a hallucination pattern
        if seen.values().any(|&count| count >= 3) {
            return true;
        }
    }

    false
}

/// Whisper model wrapper producing timed segments from an audio file.
///
/// Model size, device, cache location, and source language are fixed at
/// construction; they are process configuration, not per-session inputs.
pub struct Transcriber {
    model: m::model::Whisper,
    tokenizer: Tokenizer,
    config: WhisperConfig,
    device: Device,
    mel_filters: Vec<f32>,
    language: Option<String>,
}

impl Transcriber {
    /// Download (if needed) and load a Whisper model
    pub fn load(
        model_size: WhisperModelSize,
        cache_dir: Option<PathBuf>,
        device: Device,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        info!("Loading Whisper {} model...", model_size);

        let api = match cache_dir {
            Some(dir) => ApiBuilder::new().with_cache_dir(dir).build()?,
            None => Api::new()?,
        };
        let api_repo = api.model(model_size.repo_id().to_string());

        info!("Downloading model files (this may take a while on first run)...");
        let config_path = api_repo.get("config.json")?;
        let tokenizer_path = api_repo.get("tokenizer.json")?;
        let weights_path = api_repo.get("model.safetensors")?;

        debug!("Config: {}", config_path.display());
        debug!("Tokenizer: {}", tokenizer_path.display());
        debug!("Weights: {}", weights_path.display());

        let config: WhisperConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| TranscriptionError::Tokenizer(e.to_string()))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], candle_core::DType::F32, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let mel_filters = match config.num_mel_bins {
            n @ (80 | 128) => mel_filterbank(n),
            n => return Err(TranscriptionError::UnsupportedMelBins(n)),
        };

        info!("Model loaded successfully (device: {:?})", device);

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            mel_filters,
            language,
        })
    }

    /// Load PCM samples from a WAV file as f32 normalized to [-1, 1]
    fn read_samples(audio_path: &Path) -> Result<Vec<f32>, TranscriptionError> {
        let reader = WavReader::open(audio_path)?;
        let spec = reader.spec();

        debug!(
            "WAV file: {} Hz, {} channels, {} bits",
            spec.sample_rate, spec.channels, spec.bits_per_sample
        );

        let max_value = (1i32 << (spec.bits_per_sample - 1)) as f32;
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i32>()
                .filter_map(Result::ok)
                .map(|s| s as f32 / max_value)
                .collect(),
            hound::SampleFormat::Float => {
                reader.into_samples::<f32>().filter_map(Result::ok).collect()
            }
        };

        Ok(samples)
    }

    /// Transcribe an audio file into ordered, timed segments.
    ///
    /// This is the expensive, blocking step of the pipeline: the whole file
    /// is decoded window by window on the configured device.
    pub fn transcribe(
        &mut self,
        audio_path: &Path,
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<Segment>, TranscriptionError> {
        let samples = Self::read_samples(audio_path)?;
        let duration_secs = samples.len() as f64 / SAMPLE_RATE as f64;
        info!(
            "Loaded {:.2} seconds of audio ({} samples)",
            duration_secs,
            samples.len()
        );

        // Mel spectrogram over the entire file
        let mel = audio::pcm_to_mel(&self.config, &samples, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let content_frames = mel.len() / n_mels;
        let mel = Tensor::from_vec(mel, (1, n_mels, content_frames), &self.device)?;

        if let Some(pb) = progress {
            pb.set_length(content_frames as u64);
        }

        let mut segments = Vec::new();
        let mut seek = 0;

        while seek < content_frames {
            let window_size = usize::min(content_frames - seek, N_FRAMES);
            let time_offset = (seek * HOP_LENGTH) as f64 / SAMPLE_RATE as f64;

            debug!(
                "Decoding window at frame {}/{} (offset: {:.2}s)",
                seek, content_frames, time_offset
            );

            let mel_window = mel.narrow(2, seek, window_size)?;
            // Pad the final window to the full 30 seconds
            let mel_window = if window_size < N_FRAMES {
                let padding = Tensor::zeros(
                    (1, n_mels, N_FRAMES - window_size),
                    candle_core::DType::F32,
                    &self.device,
                )?;
                Tensor::cat(&[&mel_window, &padding], 2)?
            } else {
                mel_window
            };

            self.model.reset_kv_cache();
            let audio_features = self.model.encoder.forward(&mel_window, true)?;

            let (spans, last_timestamp) = self.decode_window(&audio_features)?;

            for span in spans {
                let text = self.decode_tokens(&span.tokens)?;
                let text = text.trim();

                // Skip blank audio markers and hallucinated output
                if text.is_empty() || text == "[BLANK_AUDIO]" || looks_hallucinated(text) {
                    continue;
                }

                let segment =
                    Segment::new(time_offset + span.start, time_offset + span.end, text);
                debug!(
                    "Segment: {:.2}-{:.2}: {}",
                    segment.start, segment.end, segment.text
                );
                segments.push(segment);
            }

            // Advance by the model's last timestamp when it produced one,
            // otherwise by the whole window
            let advance = if last_timestamp > 0.0 {
                ((last_timestamp * SAMPLE_RATE as f64 / HOP_LENGTH as f64) as usize).max(1)
            } else {
                window_size
            };
            seek += advance;

            if let Some(pb) = progress {
                pb.set_position(seek.min(content_frames) as u64);
            }
        }

        info!("Transcription complete: {} segments", segments.len());
        Ok(segments)
    }

    /// Decode one 30-second window, returning timed spans and the last
    /// timestamp seen (used to advance the seek position).
    fn decode_window(
        &mut self,
        audio_features: &Tensor,
    ) -> Result<(Vec<DecodedSpan>, f64), TranscriptionError> {
        let sot_token = self.token_id("<|startoftranscript|>")?;
        let transcribe_token = self.token_id("<|transcribe|>")?;
        let eot_token = self.token_id("<|endoftext|>")?;

        let language_token = match &self.language {
            Some(lang) => self
                .token_id(&format!("<|{}|>", lang))
                .or_else(|_| self.token_id("<|en|>"))?,
            None => self.detect_language(audio_features)?,
        };

        // Seeding with <|0.00|> forces the model into timestamp mode
        let mut tokens = vec![sot_token, language_token, transcribe_token, TIMESTAMP_BEGIN];

        let sample_len = self.config.max_target_positions / 2;
        let mut all_tokens = vec![TIMESTAMP_BEGIN];
        let mut last_timestamp = 0.0_f64;

        for i in 0..sample_len {
            let tokens_tensor = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;

            // The KV cache is flushed only on the first iteration
            let ys = self
                .model
                .decoder
                .forward(&tokens_tensor, audio_features, i == 0)?;

            let (_, seq_len, _) = ys.dims3()?;
            let ys_last = ys.narrow(1, seq_len - 1, 1)?;
            let logits = self.model.decoder.final_linear(&ys_last)?;
            let logits = logits.squeeze(0)?.squeeze(0)?;

            // Greedy decode
            let next_token = logits.argmax(0)?.to_scalar::<u32>()?;

            if next_token == eot_token {
                break;
            }

            if is_timestamp_token(next_token) {
                last_timestamp = timestamp_token_to_seconds(next_token);
            }

            all_tokens.push(next_token);
            tokens.push(next_token);

            // Bail out of degenerate repetition (same token four times running)
            if all_tokens.len() >= 4 {
                let len = all_tokens.len();
                if all_tokens[len - 1] == all_tokens[len - 2]
                    && all_tokens[len - 2] == all_tokens[len - 3]
                    && all_tokens[len - 3] == all_tokens[len - 4]
                {
                    while all_tokens.len() > 1
                        && all_tokens[all_tokens.len() - 1] == all_tokens[all_tokens.len() - 2]
                    {
                        all_tokens.pop();
                    }
                    break;
                }
            }
        }

        let spans = collect_spans(&all_tokens);
        if let Some(last_span) = spans.last() {
            last_timestamp = last_timestamp.max(last_span.end);
        }

        Ok((spans, last_timestamp))
    }

    /// Auto-detect the spoken language, returning its token id
    fn detect_language(&mut self, audio_features: &Tensor) -> Result<u32, TranscriptionError> {
        let sot_token = self.token_id("<|startoftranscript|>")?;

        let tokens = Tensor::new(&[sot_token], &self.device)?.unsqueeze(0)?;
        let ys = self.model.decoder.forward(&tokens, audio_features, true)?;

        let (_, seq_len, _) = ys.dims3()?;
        let ys_last = ys.narrow(1, seq_len - 1, 1)?;
        let logits = self.model.decoder.final_linear(&ys_last)?;
        let logits = logits.squeeze(0)?.squeeze(0)?;

        // Language tokens occupy 50259..=50358 (99 languages)
        let lang_token_start = 50259u32;
        let lang_token_end = 50358u32;

        let logits_vec: Vec<f32> = logits.to_vec1()?;
        let mut best_lang_token = self.token_id("<|en|>")?;
        let mut best_logit = f32::NEG_INFINITY;

        for token_id in lang_token_start..=lang_token_end {
            if let Some(&logit) = logits_vec.get(token_id as usize) {
                if logit > best_logit {
                    best_logit = logit;
                    best_lang_token = token_id;
                }
            }
        }

        if let Some(lang_str) = self.tokenizer.id_to_token(best_lang_token) {
            debug!("Detected language: {}", lang_str);
        }

        self.model.reset_kv_cache();
        Ok(best_lang_token)
    }

    fn token_id(&self, token: &str) -> Result<u32, TranscriptionError> {
        self.tokenizer
            .token_to_id(token)
            .ok_or_else(|| TranscriptionError::Tokenizer(format!("token not found: {}", token)))
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String, TranscriptionError> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| TranscriptionError::Tokenizer(e.to_string()))
    }
}

/// Group a decoded token stream into timed spans.
/// Format: <|start|> text tokens... <|end|> <|start|> text...
fn collect_spans(tokens: &[u32]) -> Vec<DecodedSpan> {
    let mut spans = Vec::new();
    let mut current_start: Option<f64> = None;
    let mut current_tokens = Vec::new();

    for &token in tokens {
        if is_timestamp_token(token) {
            let time = timestamp_token_to_seconds(token);

            match current_start {
                None => current_start = Some(time),
                Some(start) => {
                    if !current_tokens.is_empty() {
                        spans.push(DecodedSpan {
                            start,
                            end: time,
                            tokens: current_tokens.clone(),
                        });
                    }
                    current_tokens.clear();
                    // An end timestamp also starts the next span
                    current_start = Some(time);
                }
            }
        } else if current_start.is_some() && token < 50257 {
            // Text token, not a special token
            current_tokens.push(token);
        }
    }

    // Tokens trailing without an end timestamp get a nominal duration
    if !current_tokens.is_empty() {
        if let Some(start) = current_start {
            spans.push(DecodedSpan {
                start,
                end: (start + 5.0).min(30.0),
                tokens: current_tokens,
            });
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_token_conversion() {
        assert_eq!(timestamp_token_to_seconds(TIMESTAMP_BEGIN), 0.0);
        assert!((timestamp_token_to_seconds(TIMESTAMP_BEGIN + 50) - 1.0).abs() < 1e-9);
        assert!(is_timestamp_token(TIMESTAMP_BEGIN));
        assert!(is_timestamp_token(TIMESTAMP_END));
        assert!(!is_timestamp_token(TIMESTAMP_BEGIN - 1));
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0, 500.0, 1000.0, 4000.0, 8000.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "roundtrip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_mel_filterbank_shape() {
        let n_freqs = N_FFT / 2 + 1;
        for n_mels in [80, 128] {
            let filters = mel_filterbank(n_mels);
            assert_eq!(filters.len(), n_mels * n_freqs);
            // Every filter has some mass and no negative weights
            for mel in 0..n_mels {
                let row = &filters[mel * n_freqs..(mel + 1) * n_freqs];
                assert!(row.iter().all(|&w| w >= 0.0));
                assert!(row.iter().any(|&w| w > 0.0), "empty filter {}", mel);
            }
        }
    }

    #[test]
    fn test_collect_spans_pairs_timestamps() {
        // <|0.00|> hello <|1.00|> world <|2.00|>
        let tokens = vec![
            TIMESTAMP_BEGIN,
            100,
            101,
            TIMESTAMP_BEGIN + 50,
            102,
            TIMESTAMP_BEGIN + 100,
        ];
        let spans = collect_spans(&tokens);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].tokens, vec![100, 101]);
        assert!((spans[0].start - 0.0).abs() < 1e-9);
        assert!((spans[0].end - 1.0).abs() < 1e-9);
        assert_eq!(spans[1].tokens, vec![102]);
        assert!((spans[1].end - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_collect_spans_trailing_tokens_get_nominal_end() {
        let tokens = vec![TIMESTAMP_BEGIN + 100, 200, 201];
        let spans = collect_spans(&tokens);
        assert_eq!(spans.len(), 1);
        assert!((spans[0].start - 2.0).abs() < 1e-9);
        assert!((spans[0].end - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_looks_hallucinated() {
        assert!(looks_hallucinated(""));
        assert!(looks_hallucinated("a"));
        assert!(looks_hallucinated("Same thing. Same thing. Same thing."));
        assert!(!looks_hallucinated("A perfectly ordinary sentence."));
        assert!(!looks_hallucinated("One. Two. Three."));
    }
}
