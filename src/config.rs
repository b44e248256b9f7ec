use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WhisperModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModelSize {
    pub fn repo_id(&self) -> &'static str {
        match self {
            Self::Tiny => "openai/whisper-tiny",
            Self::Base => "openai/whisper-base",
            Self::Small => "openai/whisper-small",
            Self::Medium => "openai/whisper-medium",
            Self::Large => "openai/whisper-large-v3",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for WhisperModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Device {
    #[default]
    /// Automatically select the best available device (Metal > CUDA > CPU)
    Auto,
    /// Use CPU for inference
    Cpu,
    #[cfg(feature = "cuda")]
    /// Use CUDA GPU for inference
    Cuda,
    #[cfg(feature = "metal")]
    /// Use Metal GPU for inference (Apple Silicon)
    Metal,
}

impl Device {
    /// Resolve to a candle device. A requested accelerator that is not
    /// available falls back to CPU rather than failing the session.
    pub fn to_candle_device(&self) -> candle_core::Device {
        match self {
            Self::Auto => Self::auto_select_device(),
            Self::Cpu => candle_core::Device::Cpu,
            #[cfg(feature = "cuda")]
            Self::Cuda => match candle_core::Device::new_cuda(0) {
                Ok(device) => {
                    tracing::info!("Using CUDA GPU acceleration");
                    device
                }
                Err(e) => {
                    tracing::warn!("CUDA not available ({}), falling back to CPU", e);
                    candle_core::Device::Cpu
                }
            },
            #[cfg(feature = "metal")]
            Self::Metal => match candle_core::Device::new_metal(0) {
                Ok(device) => {
                    tracing::info!("Using Metal GPU acceleration");
                    device
                }
                Err(e) => {
                    tracing::warn!("Metal not available ({}), falling back to CPU", e);
                    candle_core::Device::Cpu
                }
            },
        }
    }

    fn auto_select_device() -> candle_core::Device {
        #[cfg(feature = "metal")]
        {
            if let Ok(device) = candle_core::Device::new_metal(0) {
                tracing::info!("Using Metal GPU acceleration");
                return device;
            }
            tracing::debug!("Metal not available, trying next option");
        }

        #[cfg(feature = "cuda")]
        {
            if let Ok(device) = candle_core::Device::new_cuda(0) {
                tracing::info!("Using CUDA GPU acceleration");
                return device;
            }
            tracing::debug!("CUDA not available, trying next option");
        }

        tracing::info!("Using CPU for inference");
        candle_core::Device::Cpu
    }
}

/// Which translation strategy to use for segment texts
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum TranslatorKind {
    #[default]
    /// Per-segment LLM translation with a conversational style instruction
    Llm,
    /// Per-segment calls to a LibreTranslate-compatible HTTP service
    Http,
}

/// LLM provider for the llm translation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LlmProvider {
    #[default]
    /// OpenAI API (default)
    Openai,
    /// Anthropic Claude API
    Anthropic,
    /// Google Gemini API
    Google,
    /// Local Ollama server
    Ollama,
    /// DeepSeek API
    Deepseek,
}

#[derive(Parser, Debug)]
#[command(name = "dubber")]
#[command(
    version,
    about = "Dub a video into another language: transcribe, translate, synthesize, remux"
)]
pub struct Config {
    /// Input video file path
    #[arg(value_name = "VIDEO")]
    pub input: PathBuf,

    /// Target language code for the dub (e.g. 'en', 'es', 'ja')
    #[arg(short, long, value_name = "LANG")]
    pub lang: String,

    /// Directory that receives per-session artifacts
    #[arg(long, value_name = "DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Whisper model size to use
    #[arg(short, long, value_enum, default_value = "base")]
    pub model: WhisperModelSize,

    /// Spoken language of the source audio (e.g. 'en', 'zh'). Auto-detect if not specified
    #[arg(long)]
    pub source_language: Option<String>,

    /// Translation backend
    #[arg(long, value_enum, default_value = "llm", env = "DUBBER_TRANSLATOR")]
    pub translator: TranslatorKind,

    /// LLM provider for translation
    #[arg(long, value_enum, default_value = "openai", env = "DUBBER_LLM_PROVIDER")]
    pub llm_provider: LlmProvider,

    /// LLM API base URL (optional, for custom endpoints like Azure OpenAI)
    #[arg(long, env = "DUBBER_LLM_URL")]
    pub llm_url: Option<String>,

    /// LLM API key for translation
    #[arg(long, env = "DUBBER_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// LLM model name for translation
    #[arg(long, env = "DUBBER_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// Endpoint for the http translation backend
    #[arg(
        long,
        env = "DUBBER_TRANSLATE_URL",
        default_value = "https://libretranslate.com/translate"
    )]
    pub translate_url: String,

    /// API key for the http translation service, if it requires one
    #[arg(long, env = "DUBBER_TRANSLATE_API_KEY", hide_env_values = true)]
    pub translate_api_key: Option<String>,

    /// ElevenLabs API key for speech synthesis
    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: Option<String>,

    /// ElevenLabs voice identifier for the dubbed track
    #[arg(long, env = "VOICE_ID")]
    pub voice_id: Option<String>,

    /// Model cache directory
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Device to use for inference (auto selects best available: Metal > CUDA > CPU)
    #[arg(long, value_enum, default_value = "auto")]
    pub device: Device,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dubber")
                .join("models")
        })
    }
}
