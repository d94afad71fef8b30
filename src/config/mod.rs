//! Configuration management for the voice tutor

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use crate::controller::ControllerSettings;
use crate::{Error, Result};

use file::TutorConfigFile;

/// Default tutoring service URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Voice tutor configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Signed-in learner, when known up front
    pub user_email: Option<String>,

    /// Tutoring service connection
    pub backend: BackendConfig,

    /// Session controller behavior
    pub session: SessionConfig,

    /// Speech engines
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Tutoring service connection
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the tutoring service
    pub url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

/// Session controller behavior
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Speak tutor replies aloud
    pub voice_output: bool,

    /// Minimum perceived latency of session checks and starts
    pub min_latency: Duration,

    /// Grace period between speech cancellation attempts
    pub stop_grace: Duration,

    /// Consecutive failures tolerated before suggesting the session end
    pub error_threshold: u32,
}

impl SessionConfig {
    /// Controller settings derived from this configuration
    #[must_use]
    pub const fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            min_latency: self.min_latency,
            stop_grace: self.stop_grace,
            error_threshold: self.error_threshold,
            voice_output: self.voice_output,
        }
    }
}

/// Hosted STT backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    Whisper,
    Deepgram,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }
}

/// Hosted TTS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Speech engine configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0, `OpenAI` only)
    pub tts_speed: f32,
}

/// API keys for hosted speech services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration with priority env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_sources(fc: TutorConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let parse_bool = |v: String| v == "1" || v.eq_ignore_ascii_case("true");

        let backend = BackendConfig {
            url: env("TUTOR_BACKEND_URL")
                .or(fc.backend.url)
                .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string()),
            timeout: Duration::from_secs(
                env("TUTOR_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .or(fc.backend.timeout_secs)
                    .unwrap_or(30),
            ),
        };

        let defaults = ControllerSettings::default();
        let session = SessionConfig {
            voice_output: env("TUTOR_VOICE_OUTPUT")
                .map(parse_bool)
                .or(fc.session.voice_output)
                .unwrap_or(defaults.voice_output),
            min_latency: env("TUTOR_MIN_LATENCY_MS")
                .and_then(|s| s.parse().ok())
                .or(fc.session.min_latency_ms)
                .map_or(defaults.min_latency, Duration::from_millis),
            stop_grace: fc
                .session
                .stop_grace_ms
                .map_or(defaults.stop_grace, Duration::from_millis),
            error_threshold: fc
                .session
                .error_threshold
                .unwrap_or(defaults.error_threshold),
        };

        let voice = VoiceConfig {
            stt_provider: env("TUTOR_STT_PROVIDER")
                .or(fc.voice.stt_provider)
                .map_or(Ok(SttProvider::Whisper), |s| s.parse())?,
            stt_model: env("TUTOR_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_provider: env("TUTOR_TTS_PROVIDER")
                .or(fc.voice.tts_provider)
                .map_or(Ok(TtsProvider::OpenAi), |s| s.parse())?,
            tts_model: env("TUTOR_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: env("TUTOR_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "alloy".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        Ok(Self {
            user_email: env("TUTOR_USER_EMAIL").or(fc.user_email),
            backend,
            session,
            voice,
            api_keys,
        })
    }
}
