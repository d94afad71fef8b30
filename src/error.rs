//! Error types for the voice tutor

use thiserror::Error;

/// Result type alias for voice tutor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice tutor
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Input rejected before any work was done
    #[error("invalid input: {0}")]
    Validation(String),

    /// No user identity is known yet
    #[error("sign in to start a tutoring session")]
    NotAuthenticated,

    /// Operation requires an active session
    #[error("no active session")]
    NoActiveSession,

    /// A session is already active for this user
    #[error("a session is already active: {0}")]
    SessionAlreadyActive(String),

    /// Tutoring backend could not be reached
    #[error("tutoring service unavailable: {0}")]
    BackendUnavailable(String),

    /// Tutoring backend answered with a logical failure
    #[error("{0}")]
    Backend(String),

    /// Request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Microphone access was denied or no device is available
    #[error("microphone access denied: {0}")]
    MicrophonePermission(String),

    /// Speech capability missing from this environment
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Speech recognition failed
    #[error("speech recognition error: {0}")]
    Recognition(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the backend could not be reached at all
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::BackendUnavailable(_) | Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Short description suitable for a chat notice
    #[must_use]
    pub fn user_summary(&self) -> String {
        match self {
            Self::Timeout(_) => "the request timed out".to_string(),
            Self::Http(e) if e.is_timeout() => "the request timed out".to_string(),
            Self::Http(e) if e.is_connect() => "the tutoring service is unreachable".to_string(),
            Self::BackendUnavailable(_) => "the tutoring service is unreachable".to_string(),
            other => other.to_string(),
        }
    }
}
