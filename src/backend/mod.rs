//! Remote tutoring service
//!
//! The controller talks to the tutoring service only through [`TutorBackend`].
//! [`HttpBackend`] is the JSON-over-HTTP implementation used in production.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpBackend;

use crate::Result;
use crate::model::Mode;

/// Generic message used when the service fails without saying why
pub const GENERIC_FAILURE: &str = "The tutoring service could not complete the request";

/// Operations the tutoring service exposes to the controller
#[async_trait]
pub trait TutorBackend: Send + Sync {
    /// Check that the service is reachable
    async fn health(&self) -> Result<HealthResponse>;

    /// Look up the user's active session, if any
    async fn active_session(&self, user_email: &str) -> Result<ActiveSessionResponse>;

    /// Fetch the chat history of a session
    async fn history(&self, user_email: &str, session_id: &str) -> Result<HistoryResponse>;

    /// Start (or resume) a session
    async fn start_session(&self, request: &StartSessionRequest) -> Result<StartSessionResponse>;

    /// End a session
    async fn end_session(&self, request: &EndSessionRequest) -> Result<EndSessionResponse>;

    /// Send a learner message and receive the tutor's reply
    async fn send_message(&self, request: &SendMessageRequest) -> Result<SendMessageResponse>;

    /// Rewrite text so it reads well aloud
    async fn optimize_speech(&self, request: &OptimizeSpeechRequest)
    -> Result<OptimizeSpeechResponse>;

    /// Record a voice output toggle
    async fn voice_toggle(&self, request: &VoiceToggleRequest) -> Result<VoiceToggleResponse>;
}

/// Health check response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub success: bool,
}

/// Active session lookup response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveSessionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub has_active_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_data: Option<SessionData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Server-held session description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: String,
    pub mode: Mode,
    pub subject: String,
}

/// Chat history response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One persisted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub content: String,
    #[serde(default)]
    pub is_ai: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Start session request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub mode: Mode,
    pub subject: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "isVoiceInput")]
    pub is_voice_input: bool,
}

/// Start session response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub is_resumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// End session request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndSessionRequest {
    pub session_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "isVoiceInput")]
    pub is_voice_input: bool,
}

/// End session response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndSessionResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Learner message sent to the tutor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub prompt: String,
    pub mode: Mode,
    pub subject: String,
    #[serde(rename = "isVoiceInput")]
    pub is_voice_input: bool,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Tutor reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Speech optimization request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeSpeechRequest {
    pub text: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
}

/// Speech optimization response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizeSpeechResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_text: Option<String>,
}

/// Voice output toggle audit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceToggleRequest {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "userEmail")]
    pub user_email: String,
    #[serde(rename = "isVoiceInput")]
    pub is_voice_input: bool,
}

/// Voice output toggle audit response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceToggleResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pick the most specific failure text a response carried
#[must_use]
pub fn failure_text(error: Option<&str>, message: Option<&str>) -> String {
    error
        .or(message)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| GENERIC_FAILURE.to_string(), ToString::to_string)
}
