use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for the WebRTC offer relay to the avatar service.
#[derive(Clone, Debug, PartialEq)]
pub struct AvatarConfig {
    pub api_key: Option<String>,
    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
    pub base_url: String,
    pub offer_endpoint: Option<String>,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub default_agent: String,
    pub prompts_path: PathBuf,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_instructions: String,
    pub audio_chunk_size: usize,
    pub max_utterance_bytes: usize,
    pub max_handoffs: usize,
    pub avatar: AvatarConfig,
    pub log_level: Level,
}

const DEFAULT_TTS_INSTRUCTIONS: &str = "Speak clearly in a friendly, professional tone. \
Pronounce numbers and currency amounts carefully.";

/// Two minutes of 24 kHz mono PCM16.
const DEFAULT_MAX_UTTERANCE_BYTES: usize = 5_760_000;

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn positive_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => Err(ConfigError::InvalidValue(
                name.to_string(),
                "must be greater than zero".to_string(),
            )),
            Ok(value) => Ok(value),
            Err(e) => Err(ConfigError::InvalidValue(name.to_string(), e.to_string())),
        },
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let avatar = AvatarConfig {
            api_key: std::env::var("AVATAR_API_KEY").ok(),
            avatar_id: std::env::var("AVATAR_AVATAR_ID").ok(),
            voice_id: std::env::var("AVATAR_VOICE_ID").ok(),
            base_url: var_or("AVATAR_BASE_URL", "https://api.simli.com/v1"),
            offer_endpoint: std::env::var("AVATAR_OFFER_ENDPOINT").ok(),
        };

        Ok(Self {
            bind_address,
            openai_api_key,
            openai_base_url: var_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            chat_model: var_or("CHAT_MODEL", "gpt-4o"),
            default_agent: var_or("DEFAULT_AGENT", "assistant"),
            prompts_path: PathBuf::from(var_or("PROMPTS_PATH", "./prompts")),
            stt_model: var_or("STT_MODEL", "gpt-4o-transcribe"),
            tts_model: var_or("TTS_MODEL", "gpt-4o-mini-tts"),
            tts_voice: var_or("TTS_VOICE", "ash"),
            tts_instructions: var_or("TTS_INSTRUCTIONS", DEFAULT_TTS_INSTRUCTIONS),
            audio_chunk_size: positive_usize("AUDIO_CHUNK_SIZE", 512)?,
            max_utterance_bytes: positive_usize(
                "MAX_UTTERANCE_BYTES",
                DEFAULT_MAX_UTTERANCE_BYTES,
            )?,
            max_handoffs: positive_usize("MAX_HANDOFFS", 4)?,
            avatar,
            log_level,
        })
    }
}
