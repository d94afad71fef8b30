//! HTTP client for the tutoring service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    ActiveSessionResponse, EndSessionRequest, EndSessionResponse, HealthResponse,
    HistoryResponse, OptimizeSpeechRequest, OptimizeSpeechResponse, SendMessageRequest,
    SendMessageResponse, StartSessionRequest, StartSessionResponse, TutorBackend,
    VoiceToggleRequest, VoiceToggleResponse,
};
use crate::{Error, Result};

/// Client for the tutoring service's JSON API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: Client,
    /// Base URL, without trailing slash
    base_url: String,
}

impl HttpBackend {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the tutoring service (e.g., <http://localhost:5000>)
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(url = %url, "GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| map_send_error(&url, e))?;

        Self::read_json(&url, response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(&url, e))?;

        Self::read_json(&url, response).await
    }

    async fn read_json<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url, status = %status, body = %body, "tutoring service error");
            return Err(Error::Backend(format!(
                "tutoring service error {status}: {body}"
            )));
        }

        let parsed = response.json().await.map_err(|e| {
            tracing::error!(url, error = %e, "failed to parse tutoring service response");
            e
        })?;
        Ok(parsed)
    }
}

/// Turn transport failures into the connectivity variants
fn map_send_error(url: &str, e: reqwest::Error) -> Error {
    tracing::warn!(url, error = %e, "tutoring service request failed");
    if e.is_timeout() {
        Error::Timeout(url.to_string())
    } else if e.is_connect() {
        Error::BackendUnavailable(e.to_string())
    } else {
        Error::Http(e)
    }
}

#[async_trait]
impl TutorBackend for HttpBackend {
    async fn health(&self) -> Result<HealthResponse> {
        self.get_json("/api/tutor/health", &[]).await
    }

    async fn active_session(&self, user_email: &str) -> Result<ActiveSessionResponse> {
        self.get_json("/api/tutor/session/active", &[("userEmail", user_email)])
            .await
    }

    async fn history(&self, user_email: &str, session_id: &str) -> Result<HistoryResponse> {
        self.get_json(
            "/api/tutor/history",
            &[("userEmail", user_email), ("sessionId", session_id)],
        )
        .await
    }

    async fn start_session(&self, request: &StartSessionRequest) -> Result<StartSessionResponse> {
        self.post_json("/api/tutor/session/start", request).await
    }

    async fn end_session(&self, request: &EndSessionRequest) -> Result<EndSessionResponse> {
        self.post_json("/api/tutor/session/end", request).await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<SendMessageResponse> {
        self.post_json("/api/tutor/ask", request).await
    }

    async fn optimize_speech(
        &self,
        request: &OptimizeSpeechRequest,
    ) -> Result<OptimizeSpeechResponse> {
        self.post_json("/api/tutor/optimize-speech", request).await
    }

    async fn voice_toggle(&self, request: &VoiceToggleRequest) -> Result<VoiceToggleResponse> {
        self.post_json("/api/tutor/voice-toggle", request).await
    }
}
