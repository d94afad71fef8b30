//! Voice tutor session controller
//!
//! Owns the session lifecycle, microphone state, transcript assembly, message
//! exchange with the tutoring service and speech playback of replies.
//!
//! Every operation takes `&mut self`, so operations never interleave: a
//! session check and a session start for the same controller are serialized
//! by the borrow. Engine callbacks arrive as [`ControllerEvent`]s and are
//! applied one at a time through [`TutorController::handle_event`].
//!
//! ```text
//!   NoSession ──start ok / resume found──▶ Active
//!   Active ──end ok / end failed (fail open)──▶ NoSession
//! ```

pub mod events;
mod transcript;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

pub use events::{
    ControllerEvent, EventReceiver, EventSender, RecognitionError, RecognitionEvent,
    RecognitionSegment, SpeechEvent, Visibility,
};
pub use transcript::Transcript;

use crate::backend::{
    EndSessionRequest, OptimizeSpeechRequest, SendMessageRequest, StartSessionRequest,
    TutorBackend, VoiceToggleRequest, failure_text,
};
use crate::model::{Message, MicState, Mode, QuickAction, Role, Session};
use crate::voice::{MicrophoneAccess, SpeechRecognizer, SpeechSynthesizer, Utterance};
use crate::{Error, Result};

const HISTORY_RESTORED: &str = "Previous conversation restored. Continue where you left off.";
const HISTORY_UNAVAILABLE: &str =
    "Session resumed, but previous messages could not be loaded. You can keep chatting.";
const SESSION_ENDED: &str = "Session ended. Start a new session whenever you're ready.";
const SUGGEST_END: &str =
    "Having trouble reaching the tutor. Consider ending this session and starting a new one.";
const DEFAULT_WELCOME: &str = "Hi! Let's get started.";
const RECOGNITION_UNSUPPORTED: &str =
    "Voice input is not available here. You can still type your questions.";

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Shortest time a session check or start may appear to take
    pub min_latency: Duration,
    /// Wait before the second cancellation attempt when stopping speech
    pub stop_grace: Duration,
    /// Consecutive send failures tolerated before suggesting the session end
    pub error_threshold: u32,
    /// Whether replies are spoken aloud
    pub voice_output: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            min_latency: Duration::from_secs(2),
            stop_grace: Duration::from_millis(50),
            error_threshold: 2,
            voice_output: true,
        }
    }
}

/// Speech engines the controller drives
pub struct SpeechEngines {
    pub recognizer: Box<dyn SpeechRecognizer>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub microphone: Box<dyn MicrophoneAccess>,
}

/// Read-only view of controller state, published after every transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub session: Option<Session>,
    pub mic: MicState,
    pub recording: bool,
    pub speaking: Option<Uuid>,
    pub checking: bool,
    pub voice_output: bool,
    pub messages: usize,
    pub consecutive_errors: u32,
    pub transcript: String,
}

/// State machine for one learner's voice tutoring page
pub struct TutorController {
    backend: Arc<dyn TutorBackend>,
    recognizer: Box<dyn SpeechRecognizer>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    microphone: Box<dyn MicrophoneAccess>,
    settings: ControllerSettings,
    recognition_supported: bool,
    synthesis_supported: bool,

    user: Option<String>,
    session: Option<Session>,
    checking: bool,
    messages: Vec<Message>,

    recording: bool,
    period: u64,
    transcript: Transcript,
    transcript_consumed: bool,
    restart_pending: bool,

    speaking: Option<Uuid>,
    voice_output: bool,

    in_flight: usize,
    mic: MicState,
    consecutive_errors: u32,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl TutorController {
    /// Create a controller
    ///
    /// Missing speech support is detected here, once: unsupported recognition
    /// leaves a single notice in the conversation, unsupported synthesis turns
    /// voice output off.
    #[must_use]
    pub fn new(
        backend: Arc<dyn TutorBackend>,
        engines: SpeechEngines,
        settings: ControllerSettings,
    ) -> Self {
        let recognition_supported = engines.recognizer.is_supported();
        let synthesis_supported = engines.synthesizer.is_supported();
        let voice_output = settings.voice_output && synthesis_supported;

        let mut messages = Vec::new();
        if !recognition_supported {
            tracing::warn!("speech recognition unsupported, voice input disabled");
            messages.push(Message::system(RECOGNITION_UNSUPPORTED));
        }
        if !synthesis_supported {
            tracing::warn!("speech synthesis unsupported, voice output disabled");
        }

        let (snapshot_tx, _) = watch::channel(Snapshot::default());

        let mut controller = Self {
            backend,
            recognizer: engines.recognizer,
            synthesizer: engines.synthesizer,
            microphone: engines.microphone,
            settings,
            recognition_supported,
            synthesis_supported,
            user: None,
            session: None,
            checking: false,
            messages,
            recording: false,
            period: 0,
            transcript: Transcript::default(),
            transcript_consumed: true,
            restart_pending: false,
            speaking: None,
            voice_output,
            in_flight: 0,
            mic: MicState::Inactive,
            consecutive_errors: 0,
            snapshot_tx,
        };
        controller.refresh();
        controller
    }

    // ---- accessors -------------------------------------------------------

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    #[must_use]
    pub fn is_session_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.active)
    }

    #[must_use]
    pub const fn mic_state(&self) -> MicState {
        self.mic
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording
    }

    #[must_use]
    pub fn transcript(&self) -> String {
        self.transcript.text()
    }

    /// Message currently being spoken
    #[must_use]
    pub const fn speaking(&self) -> Option<Uuid> {
        self.speaking
    }

    #[must_use]
    pub const fn is_checking(&self) -> bool {
        self.checking
    }

    #[must_use]
    pub const fn voice_output(&self) -> bool {
        self.voice_output
    }

    #[must_use]
    pub const fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Subscribe to state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    // ---- events ----------------------------------------------------------

    /// Apply one external event
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] for unrecoverable recognizer failures,
    /// which the front end should show to the learner
    pub async fn handle_event(&mut self, event: ControllerEvent) -> Result<()> {
        match event {
            ControllerEvent::Mounted | ControllerEvent::Visibility(Visibility::Visible) => {
                self.ensure_session_resolved().await;
            }
            ControllerEvent::Visibility(Visibility::Hidden) => {
                tracing::debug!("host hidden, releasing microphone and speech");
                self.stop_recording().await?;
                self.stop_speaking().await;
            }
            ControllerEvent::AuthResolved(user) => {
                self.set_user(user);
                self.ensure_session_resolved().await;
            }
            ControllerEvent::Recognition { period, event } => {
                return self.on_recognition(period, event).await;
            }
            ControllerEvent::Speech { message_id, event } => self.on_speech(message_id, event),
            ControllerEvent::Unload => self.shutdown(),
        }
        Ok(())
    }

    /// Set or clear the signed-in user
    pub fn set_user(&mut self, user: Option<String>) {
        let user = user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        tracing::debug!(user = ?user, "user identity resolved");
        self.user = user;
    }

    // ---- session lifecycle ----------------------------------------------

    /// Adopt the user's server-side session if one exists
    ///
    /// Safe to call from any trigger: does nothing while a session is tracked,
    /// while a check is running, or before the user is known. Failures become
    /// a chat notice.
    pub async fn ensure_session_resolved(&mut self) {
        if self.session.is_some() || self.checking {
            return;
        }
        let Some(user) = self.user.clone() else {
            tracing::debug!("user unknown, skipping session check");
            return;
        };

        self.checking = true;
        self.refresh();
        let started = Instant::now();

        let backend = Arc::clone(&self.backend);
        let email = user.clone();
        let result = self
            .call(async move { backend.active_session(&email).await })
            .await;

        match result {
            Ok(resp) if !resp.success => {
                let reason = failure_text(resp.error.as_deref(), None);
                tracing::warn!(reason = %reason, "active session lookup failed");
                self.messages.push(Message::system(format!(
                    "Couldn't check for an existing session: {reason}"
                )));
            }
            Ok(resp) if resp.has_active_session => match resp.session_data {
                Some(data) => {
                    tracing::info!(
                        session_id = %data.session_id,
                        mode = %data.mode,
                        "resuming active session"
                    );
                    self.session = Some(Session {
                        id: data.session_id,
                        mode: data.mode,
                        subject: data.subject,
                        active: true,
                    });
                    self.consecutive_errors = 0;
                    self.refresh();
                    self.restore_history(&user).await;
                }
                None => tracing::warn!("active session reported without session data"),
            },
            Ok(_) => tracing::debug!("no active session"),
            Err(e) => {
                tracing::warn!(error = %e, "active session lookup failed");
                self.messages.push(Message::system(format!(
                    "Couldn't check for an existing session: {}",
                    e.user_summary()
                )));
            }
        }

        self.hold_min_latency(started).await;
        self.checking = false;
        self.refresh();
    }

    /// Replace the conversation with the session's stored history
    async fn restore_history(&mut self, user: &str) {
        let Some(session) = self.session.clone() else {
            return;
        };

        match self.fetch_history(user, &session.id).await {
            Ok(history) if history.is_empty() => {
                self.messages = vec![Message::system(format!(
                    "Resumed your {} session on {}. No previous messages found.",
                    session.mode.display_name(),
                    session.subject
                ))];
            }
            Ok(history) => {
                tracing::debug!(count = history.len(), "history restored");
                self.messages = history;
                self.messages.push(Message::system(HISTORY_RESTORED));
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "history fetch failed");
                self.messages = vec![Message::system(HISTORY_UNAVAILABLE)];
            }
        }
        self.refresh();
    }

    async fn fetch_history(&mut self, user: &str, session_id: &str) -> Result<Vec<Message>> {
        let backend = Arc::clone(&self.backend);
        let (email, id) = (user.to_string(), session_id.to_string());
        let resp = self
            .call(async move { backend.history(&email, &id).await })
            .await?;

        if !resp.success {
            return Err(Error::Backend(failure_text(resp.error.as_deref(), None)));
        }

        Ok(resp
            .messages
            .into_iter()
            .map(|m| {
                let message = if m.is_ai {
                    Message::assistant(m.content)
                } else {
                    Message::user(m.content, false)
                };
                message.at(m.timestamp.as_deref())
            })
            .collect())
    }

    /// Start a new session (or resume the one the service hands back)
    ///
    /// # Errors
    ///
    /// Returns error if the subject is empty, no user is signed in, a session
    /// is already active, the service is unreachable, microphone access is
    /// refused, or the service rejects the start. No session is created in
    /// any of these cases.
    pub async fn start_session(&mut self, mode: Mode, subject: &str) -> Result<()> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(Error::Validation("choose a subject first".to_string()));
        }
        let user = self.user.clone().ok_or(Error::NotAuthenticated)?;
        if let Some(session) = &self.session {
            return Err(Error::SessionAlreadyActive(session.id.clone()));
        }

        let started = Instant::now();
        let result = self.try_start(mode, subject, &user).await;
        self.hold_min_latency(started).await;

        match &result {
            Ok(()) => {
                if let Some(reply) = self.last_assistant_id() {
                    self.speak_reply(reply).await;
                }
            }
            Err(e) => tracing::warn!(mode = %mode, error = %e, "session start failed"),
        }
        self.refresh();
        result
    }

    async fn try_start(&mut self, mode: Mode, subject: &str, user: &str) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        match self.call(async move { backend.health().await }).await {
            Ok(health) if health.success => {}
            Ok(_) => {
                return Err(Error::BackendUnavailable(
                    "health check reported failure".to_string(),
                ));
            }
            Err(e) if e.is_connectivity() => return Err(e),
            Err(e) => return Err(Error::BackendUnavailable(e.to_string())),
        }

        self.microphone.request_access().map_err(|e| match e {
            Error::MicrophonePermission(_) => e,
            other => Error::MicrophonePermission(other.to_string()),
        })?;

        let request = StartSessionRequest {
            mode,
            subject: subject.to_string(),
            user_email: user.to_string(),
            is_voice_input: self.recognition_supported,
        };
        let backend = Arc::clone(&self.backend);
        let resp = self
            .call(async move { backend.start_session(&request).await })
            .await?;

        if !resp.success {
            return Err(Error::Backend(failure_text(
                resp.error.as_deref(),
                resp.message.as_deref(),
            )));
        }
        let session_id = resp
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Backend("service did not return a session id".to_string()))?;

        let session = Session {
            id: session_id,
            mode: resp.mode.unwrap_or(mode),
            subject: resp
                .subject
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| subject.to_string()),
            active: true,
        };
        tracing::info!(
            session_id = %session.id,
            mode = %session.mode,
            resumed = resp.is_resumed,
            "session started"
        );
        self.session = Some(session.clone());
        self.consecutive_errors = 0;

        if resp.is_resumed {
            self.messages = match self.fetch_history(user, &session.id).await {
                Ok(history) => history,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "history fetch failed");
                    Vec::new()
                }
            };
            self.messages.push(Message::assistant(format!(
                "Welcome back! Continuing your {} session on {}.",
                session.mode.display_name(),
                session.subject
            )));
        } else {
            let welcome = resp.message.as_deref().unwrap_or(DEFAULT_WELCOME);
            self.messages = vec![Message::assistant(welcome).at(resp.timestamp.as_deref())];
        }
        self.refresh();
        Ok(())
    }

    /// End the active session
    ///
    /// Speech and recording stop before the request goes out. Local state is
    /// reset whether or not the service confirms.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveSession`] without a session, or the service's
    /// error after local state has been reset
    pub async fn end_session(&mut self) -> Result<()> {
        let Some(session) = self.session.clone() else {
            return Err(Error::NoActiveSession);
        };

        self.stop_speaking().await;
        if self.recording {
            self.abort_recording("session ending");
        }

        let request = EndSessionRequest {
            session_id: session.id.clone(),
            user_email: self.user.clone().unwrap_or_default(),
            is_voice_input: self.recognition_supported,
        };
        let backend = Arc::clone(&self.backend);
        let result = self
            .call(async move { backend.end_session(&request).await })
            .await
            .and_then(|resp| {
                if resp.success {
                    Ok(())
                } else {
                    Err(Error::Backend(failure_text(resp.error.as_deref(), None)))
                }
            });

        self.reset_session();

        match result {
            Ok(()) => {
                tracing::info!(session_id = %session.id, "session ended");
                self.messages = vec![Message::system(SESSION_ENDED)];
                self.refresh();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "end request failed, session reset locally");
                self.messages = vec![Message::system(format!(
                    "Session closed here, but the tutoring service reported a problem: {}",
                    e.user_summary()
                ))];
                self.refresh();
                Err(e)
            }
        }
    }

    fn reset_session(&mut self) {
        self.session = None;
        self.recording = false;
        self.transcript.clear();
        self.transcript_consumed = true;
        self.restart_pending = false;
        self.consecutive_errors = 0;
    }

    // ---- microphone ------------------------------------------------------

    /// Begin a recording period
    ///
    /// Any speech in progress is stopped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveSession`] without a session, or the
    /// recognizer's error if capture cannot start
    pub async fn start_recording(&mut self) -> Result<()> {
        if !self.recognition_supported {
            tracing::debug!("recording requested but recognition is unsupported");
            return Ok(());
        }
        if self.recording {
            return Ok(());
        }
        if !self.is_session_active() {
            return Err(Error::NoActiveSession);
        }

        self.stop_speaking().await;

        self.period += 1;
        self.transcript.clear();
        self.transcript_consumed = false;
        self.restart_pending = false;

        if let Err(e) = self.recognizer.start(self.period) {
            tracing::warn!(period = self.period, error = %e, "recognizer failed to start");
            self.transcript_consumed = true;
            self.refresh();
            return Err(e);
        }

        self.recording = true;
        tracing::debug!(period = self.period, "recording started");
        self.refresh();
        Ok(())
    }

    /// Stop recording and send what was heard
    ///
    /// The microphone flips to inactive before the engine confirms, and the
    /// period is marked consumed so the engine's end event cannot send again.
    ///
    /// # Errors
    ///
    /// Returns error only if the session vanished before the send
    pub async fn stop_recording(&mut self) -> Result<()> {
        if !self.recording {
            return Ok(());
        }

        let text = self.transcript.text();
        self.recording = false;
        self.transcript_consumed = true;
        self.restart_pending = false;
        self.refresh();
        self.recognizer.stop();
        tracing::debug!(period = self.period, chars = text.len(), "recording stopped");

        if text.trim().is_empty() {
            return Ok(());
        }
        self.send_message(&text, true).await
    }

    /// Stop capture without sending anything
    fn abort_recording(&mut self, reason: &str) {
        tracing::debug!(period = self.period, reason, "recording aborted");
        self.recording = false;
        self.transcript_consumed = true;
        self.restart_pending = false;
        self.recognizer.abort();
        self.refresh();
    }

    async fn on_recognition(&mut self, period: u64, event: RecognitionEvent) -> Result<()> {
        if period != self.period {
            tracing::trace!(period, current = self.period, "ignoring stale recognition event");
            return Ok(());
        }

        match event {
            RecognitionEvent::Result(segments) => {
                if !self.recording {
                    return Ok(());
                }
                for segment in &segments {
                    if segment.is_final {
                        self.transcript.push_final(&segment.text);
                    } else {
                        self.transcript.set_interim(&segment.text);
                    }
                }
                self.refresh();
            }
            RecognitionEvent::Error(error) if error.is_recoverable() => {
                if self.recording {
                    tracing::debug!(period, "no speech detected, restarting capture");
                    self.restart_pending = true;
                }
            }
            RecognitionEvent::Error(error) => {
                if !self.recording {
                    return Ok(());
                }
                tracing::warn!(period, error = %error.describe(), "speech recognition failed");
                self.abort_recording("recognizer error");
                return Err(Error::Recognition(error.describe()));
            }
            RecognitionEvent::Ended => {
                if self.restart_pending && self.recording {
                    self.restart_pending = false;
                    if let Err(e) = self.recognizer.start(period) {
                        tracing::warn!(period, error = %e, "recognizer restart failed");
                        self.abort_recording("restart failed");
                        return Err(e);
                    }
                    return Ok(());
                }
                if !self.recording {
                    return Ok(());
                }

                self.recording = false;
                self.refresh();
                if self.transcript_consumed {
                    return Ok(());
                }
                self.transcript_consumed = true;

                let text = self.transcript.text();
                if text.trim().is_empty() || !self.is_session_active() {
                    tracing::debug!(period, "recognition ended with nothing to send");
                    return Ok(());
                }
                tracing::debug!(period, "recognition ended, sending transcript");
                return self.send_message(&text, true).await;
            }
        }
        Ok(())
    }

    // ---- speech output ---------------------------------------------------

    /// Speak a message now, replacing any utterance in progress
    ///
    /// # Errors
    ///
    /// Returns error if the message does not exist or synthesis is unavailable
    pub async fn speak_message(&mut self, message_id: Uuid) -> Result<()> {
        if !self.synthesis_supported {
            return Err(Error::Unsupported("speech synthesis".to_string()));
        }
        let text = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .map(|m| m.content.clone())
            .ok_or_else(|| Error::Validation(format!("unknown message {message_id}")))?;

        let text = self.optimize_for_speech(text).await;
        self.speak(message_id, text)
    }

    /// Auto-speak a freshly arrived reply if nothing else is playing
    async fn speak_reply(&mut self, message_id: Uuid) {
        if !self.voice_output || self.speaking.is_some() {
            return;
        }
        let Some(text) = self
            .messages
            .iter()
            .find(|m| m.id == message_id && m.role == Role::Assistant)
            .map(|m| m.content.clone())
        else {
            return;
        };

        let text = self.optimize_for_speech(text).await;
        if let Err(e) = self.speak(message_id, text) {
            tracing::warn!(message_id = %message_id, error = %e, "failed to speak reply");
        }
    }

    fn speak(&mut self, message_id: Uuid, text: String) -> Result<()> {
        if self.recording {
            self.abort_recording("speech starting");
        }

        self.synthesizer.cancel();
        self.speaking = None;

        let result = self.synthesizer.speak(Utterance { message_id, text });
        if result.is_ok() {
            tracing::debug!(message_id = %message_id, "speaking");
            self.speaking = Some(message_id);
        }
        self.refresh();
        result
    }

    /// Rewrite text for speech, falling back to the raw text
    async fn optimize_for_speech(&mut self, text: String) -> String {
        let Some(user) = self.user.clone() else {
            return text;
        };

        let request = OptimizeSpeechRequest {
            text: text.clone(),
            user_email: user,
        };
        let backend = Arc::clone(&self.backend);
        match self
            .call(async move { backend.optimize_speech(&request).await })
            .await
        {
            Ok(resp) if resp.success => resp
                .optimized_text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(text),
            Ok(_) => {
                tracing::debug!("speech optimization declined, using raw text");
                text
            }
            Err(e) => {
                tracing::debug!(error = %e, "speech optimization failed, using raw text");
                text
            }
        }
    }

    /// Stop speech playback
    ///
    /// Cancellation is not always immediate in speech engines, so this cancels,
    /// then pauses and cancels again after a short grace period if audio is
    /// still playing, and finally applies the end transition itself.
    pub async fn stop_speaking(&mut self) {
        if self.speaking.is_none() && !self.synthesizer.is_speaking() {
            return;
        }

        self.synthesizer.cancel();
        if self.synthesizer.is_speaking() {
            tokio::time::sleep(self.settings.stop_grace).await;
            self.synthesizer.pause();
            self.synthesizer.cancel();
        }

        if let Some(id) = self.speaking.take() {
            tracing::debug!(message_id = %id, "speech stopped");
        }
        self.refresh();
    }

    /// Turn spoken replies on or off
    ///
    /// Turning off stops current speech at once. The service is told about the
    /// change, but a failed notification does not undo it. The notification
    /// does not hold the microphone, so a recording in progress keeps going.
    pub async fn set_voice_output(&mut self, enabled: bool) {
        if enabled && !self.synthesis_supported {
            tracing::debug!("voice output requested but synthesis is unsupported");
            return;
        }
        if enabled == self.voice_output {
            return;
        }

        self.voice_output = enabled;
        if !enabled {
            self.stop_speaking().await;
        }
        self.refresh();
        tracing::info!(enabled, "voice output toggled");

        let Some(user) = self.user.clone() else {
            return;
        };
        let request = VoiceToggleRequest {
            enabled,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            user_email: user,
            is_voice_input: self.recognition_supported,
        };
        match self.backend.voice_toggle(&request).await {
            Ok(resp) if resp.success => {}
            Ok(resp) => tracing::warn!(message = ?resp.message, "voice toggle not recorded"),
            Err(e) => tracing::warn!(error = %e, "voice toggle notification failed"),
        }
    }

    fn on_speech(&mut self, message_id: Uuid, event: SpeechEvent) {
        if self.speaking != Some(message_id) {
            tracing::trace!(message_id = %message_id, ?event, "ignoring event for other utterance");
            return;
        }
        match event {
            SpeechEvent::Started => tracing::trace!(message_id = %message_id, "speech started"),
            SpeechEvent::Ended => {
                self.speaking = None;
                self.refresh();
            }
            SpeechEvent::Error(reason) => {
                tracing::warn!(message_id = %message_id, reason = %reason, "speech playback failed");
                self.speaking = None;
                self.refresh();
            }
        }
    }

    // ---- message exchange ------------------------------------------------

    /// Send a learner message to the tutor
    ///
    /// Blank text is ignored. The learner's message is shown before the
    /// request goes out; a failure becomes a system message instead of an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveSession`] without a session
    pub async fn send_message(&mut self, text: &str, is_voice_input: bool) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let Some(session) = self.session.clone() else {
            tracing::warn!("message dropped, no active session");
            return Err(Error::NoActiveSession);
        };

        self.messages.push(Message::user(text, is_voice_input));
        self.refresh();

        let request = SendMessageRequest {
            prompt: text.to_string(),
            mode: session.mode,
            subject: session.subject.clone(),
            is_voice_input,
            user_email: self.user.clone().unwrap_or_default(),
            session_id: session.id.clone(),
        };
        let backend = Arc::clone(&self.backend);
        let result = self
            .call(async move { backend.send_message(&request).await })
            .await
            .and_then(|resp| {
                if !resp.success {
                    return Err(Error::Backend(failure_text(resp.error.as_deref(), None)));
                }
                let reply = resp
                    .response
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| Error::Backend("the tutor sent an empty reply".to_string()))?;
                Ok(Message::assistant(reply).at(resp.timestamp.as_deref()))
            });

        match result {
            Ok(reply) => {
                self.consecutive_errors = 0;
                let id = reply.id;
                self.messages.push(reply);
                self.refresh();
                self.speak_reply(id).await;
            }
            Err(e) => {
                self.consecutive_errors += 1;
                tracing::warn!(
                    session_id = %session.id,
                    consecutive = self.consecutive_errors,
                    error = %e,
                    "message exchange failed"
                );
                self.messages.push(Message::system(format!(
                    "Sorry, I couldn't get a reply: {}",
                    e.user_summary()
                )));
                if self.consecutive_errors == self.settings.error_threshold.saturating_add(1) {
                    self.messages.push(Message::system(SUGGEST_END));
                }
                self.refresh();
            }
        }
        Ok(())
    }

    /// Send one of the canned quick-action prompts
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveSession`] without a session
    pub async fn send_quick_action(&mut self, action: QuickAction) -> Result<()> {
        self.send_message(action.prompt(), false).await
    }

    // ---- teardown --------------------------------------------------------

    /// Release speech resources; safe to call any number of times
    pub fn shutdown(&mut self) {
        self.recognizer.abort();
        self.synthesizer.cancel();
        self.recording = false;
        self.transcript_consumed = true;
        self.restart_pending = false;
        self.speaking = None;
        self.refresh();
    }

    // ---- internals -------------------------------------------------------

    /// Run a service call with the microphone held disabled
    async fn call<T, F>(&mut self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.recording {
            self.abort_recording("network call starting");
        }
        self.in_flight += 1;
        self.refresh();

        let result = request.await;

        self.in_flight -= 1;
        self.refresh();
        result
    }

    async fn hold_min_latency(&self, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed < self.settings.min_latency {
            tokio::time::sleep(self.settings.min_latency - elapsed).await;
        }
    }

    fn last_assistant_id(&self) -> Option<Uuid> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.id)
    }

    /// Recompute the microphone state and publish a snapshot
    fn refresh(&mut self) {
        let mic = if self.speaking.is_some() || self.in_flight > 0 {
            MicState::Disabled
        } else if self.recording {
            MicState::Active
        } else {
            MicState::Inactive
        };
        if mic != self.mic {
            tracing::trace!(from = ?self.mic, to = ?mic, "microphone state changed");
            self.mic = mic;
        }

        let snapshot = Snapshot {
            session: self.session.clone(),
            mic: self.mic,
            recording: self.recording,
            speaking: self.speaking,
            checking: self.checking,
            voice_output: self.voice_output,
            messages: self.messages.len(),
            consecutive_errors: self.consecutive_errors,
            transcript: self.transcript.text(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

impl Drop for TutorController {
    fn drop(&mut self) {
        self.recognizer.abort();
        self.synthesizer.cancel();
    }
}
