//! Shared test utilities
//!
//! In-memory stand-ins for the tutoring service and the speech engines. Every
//! fake writes to a shared [`Journal`] so tests can assert on the order of
//! side effects and on controller state at the moment each one happened.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use voice_tutor::backend::{
    ActiveSessionResponse, EndSessionRequest, EndSessionResponse, HealthResponse,
    HistoryMessage, HistoryResponse, OptimizeSpeechRequest, OptimizeSpeechResponse,
    SendMessageRequest, SendMessageResponse, SessionData, StartSessionRequest,
    StartSessionResponse, TutorBackend, VoiceToggleRequest, VoiceToggleResponse,
};
use voice_tutor::voice::{MicrophoneAccess, SpeechRecognizer, SpeechSynthesizer, Utterance};
use voice_tutor::{
    ControllerSettings, Error, Mode, Result, Role, Snapshot, SpeechEngines, TutorController,
};

pub const USER: &str = "ada@example.com";

/// One recorded side effect
#[derive(Debug, Clone)]
pub struct Entry {
    pub what: String,
    pub snapshot: Option<Snapshot>,
}

/// Ordered log of side effects across all fakes
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<Entry>>>,
    observer: Arc<Mutex<Option<watch::Receiver<Snapshot>>>>,
}

impl Journal {
    /// Capture controller snapshots alongside every entry from now on
    pub fn observe(&self, rx: watch::Receiver<Snapshot>) {
        *self.observer.lock().unwrap() = Some(rx);
    }

    pub fn record(&self, what: impl Into<String>) {
        let snapshot = self
            .observer
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| rx.borrow().clone());
        self.entries.lock().unwrap().push(Entry {
            what: what.into(),
            snapshot,
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.what.clone())
            .collect()
    }

    pub fn last(&self, what: &str) -> Option<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.what == what)
            .cloned()
    }

    pub fn count(&self, what: &str) -> usize {
        self.names().iter().filter(|n| *n == what).count()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Scripted outcome of one backend call
#[derive(Debug, Clone)]
pub enum Scripted<T> {
    Reply(T),
    Unreachable,
    TimedOut,
}

impl<T> Scripted<T> {
    fn into_result(self) -> Result<T> {
        match self {
            Self::Reply(value) => Ok(value),
            Self::Unreachable => Err(Error::BackendUnavailable("connection refused".to_string())),
            Self::TimedOut => Err(Error::Timeout("request exceeded 30s".to_string())),
        }
    }
}

/// Requests the fake backend received
#[derive(Debug, Clone)]
pub enum Call {
    Health,
    ActiveSession(String),
    History { user_email: String, session_id: String },
    Start(StartSessionRequest),
    End(EndSessionRequest),
    Send(SendMessageRequest),
    Optimize(OptimizeSpeechRequest),
    VoiceToggle(VoiceToggleRequest),
}

#[derive(Default)]
struct Scripts {
    health: VecDeque<Scripted<HealthResponse>>,
    active: VecDeque<Scripted<ActiveSessionResponse>>,
    history: VecDeque<Scripted<HistoryResponse>>,
    start: VecDeque<Scripted<StartSessionResponse>>,
    end: VecDeque<Scripted<EndSessionResponse>>,
    send: VecDeque<Scripted<SendMessageResponse>>,
    optimize: VecDeque<Scripted<OptimizeSpeechResponse>>,
    toggle: VecDeque<Scripted<VoiceToggleResponse>>,
}

/// Tutoring service stand-in with per-endpoint scripted replies
///
/// Unscripted calls succeed with plausible defaults.
#[derive(Default)]
pub struct FakeBackend {
    scripts: Mutex<Scripts>,
    calls: Mutex<Vec<Call>>,
    journal: Journal,
    delay: Mutex<Duration>,
}

impl FakeBackend {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Make every call take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn script_health(&self, reply: Scripted<HealthResponse>) {
        self.scripts.lock().unwrap().health.push_back(reply);
    }

    pub fn script_active(&self, reply: Scripted<ActiveSessionResponse>) {
        self.scripts.lock().unwrap().active.push_back(reply);
    }

    pub fn script_history(&self, reply: Scripted<HistoryResponse>) {
        self.scripts.lock().unwrap().history.push_back(reply);
    }

    pub fn script_start(&self, reply: Scripted<StartSessionResponse>) {
        self.scripts.lock().unwrap().start.push_back(reply);
    }

    pub fn script_end(&self, reply: Scripted<EndSessionResponse>) {
        self.scripts.lock().unwrap().end.push_back(reply);
    }

    pub fn script_send(&self, reply: Scripted<SendMessageResponse>) {
        self.scripts.lock().unwrap().send.push_back(reply);
    }

    pub fn script_optimize(&self, reply: Scripted<OptimizeSpeechResponse>) {
        self.scripts.lock().unwrap().optimize.push_back(reply);
    }

    pub fn script_toggle(&self, reply: Scripted<VoiceToggleResponse>) {
        self.scripts.lock().unwrap().toggle.push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts(&self) -> Vec<StartSessionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Start(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn sends(&self) -> Vec<SendMessageRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn ends(&self) -> Vec<EndSessionRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::End(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn toggles(&self) -> Vec<VoiceToggleRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::VoiceToggle(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn active_lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::ActiveSession(_)))
            .count()
    }

    async fn enter(&self, call: Call, name: &str) {
        self.journal.record(format!("backend.{name}"));
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl TutorBackend for FakeBackend {
    async fn health(&self) -> Result<HealthResponse> {
        self.enter(Call::Health, "health").await;
        let scripted = self.scripts.lock().unwrap().health.pop_front();
        scripted.map_or_else(|| Ok(HealthResponse { success: true }), Scripted::into_result)
    }

    async fn active_session(&self, user_email: &str) -> Result<ActiveSessionResponse> {
        self.enter(Call::ActiveSession(user_email.to_string()), "active")
            .await;
        let scripted = self.scripts.lock().unwrap().active.pop_front();
        scripted.map_or_else(
            || {
                Ok(ActiveSessionResponse {
                    success: true,
                    ..ActiveSessionResponse::default()
                })
            },
            Scripted::into_result,
        )
    }

    async fn history(&self, user_email: &str, session_id: &str) -> Result<HistoryResponse> {
        self.enter(
            Call::History {
                user_email: user_email.to_string(),
                session_id: session_id.to_string(),
            },
            "history",
        )
        .await;
        let scripted = self.scripts.lock().unwrap().history.pop_front();
        scripted.map_or_else(
            || {
                Ok(HistoryResponse {
                    success: true,
                    ..HistoryResponse::default()
                })
            },
            Scripted::into_result,
        )
    }

    async fn start_session(&self, request: &StartSessionRequest) -> Result<StartSessionResponse> {
        self.enter(Call::Start(request.clone()), "start").await;
        let scripted = self.scripts.lock().unwrap().start.pop_front();
        scripted.map_or_else(
            || Ok(started("sess-1", &format!("Welcome! Let's study {}.", request.subject))),
            Scripted::into_result,
        )
    }

    async fn end_session(&self, request: &EndSessionRequest) -> Result<EndSessionResponse> {
        self.enter(Call::End(request.clone()), "end").await;
        let scripted = self.scripts.lock().unwrap().end.pop_front();
        scripted.map_or_else(
            || {
                Ok(EndSessionResponse {
                    success: true,
                    error: None,
                })
            },
            Scripted::into_result,
        )
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<SendMessageResponse> {
        self.enter(Call::Send(request.clone()), "send").await;
        let scripted = self.scripts.lock().unwrap().send.pop_front();
        scripted.map_or_else(
            || Ok(replied(&format!("About \"{}\": here's an answer.", request.prompt))),
            Scripted::into_result,
        )
    }

    async fn optimize_speech(
        &self,
        request: &OptimizeSpeechRequest,
    ) -> Result<OptimizeSpeechResponse> {
        self.enter(Call::Optimize(request.clone()), "optimize").await;
        let scripted = self.scripts.lock().unwrap().optimize.pop_front();
        scripted.map_or_else(
            || {
                Ok(OptimizeSpeechResponse {
                    success: true,
                    optimized_text: None,
                })
            },
            Scripted::into_result,
        )
    }

    async fn voice_toggle(&self, request: &VoiceToggleRequest) -> Result<VoiceToggleResponse> {
        self.enter(Call::VoiceToggle(request.clone()), "toggle").await;
        let scripted = self.scripts.lock().unwrap().toggle.pop_front();
        scripted.map_or_else(
            || {
                Ok(VoiceToggleResponse {
                    success: true,
                    message: None,
                })
            },
            Scripted::into_result,
        )
    }
}

/// Successful, fresh start response
pub fn started(session_id: &str, welcome: &str) -> StartSessionResponse {
    StartSessionResponse {
        success: true,
        session_id: Some(session_id.to_string()),
        is_resumed: false,
        message: Some(welcome.to_string()),
        timestamp: Some("2024-05-01T10:00:00".to_string()),
        ..StartSessionResponse::default()
    }
}

/// Successful tutor reply
pub fn replied(text: &str) -> SendMessageResponse {
    SendMessageResponse {
        success: true,
        response: Some(text.to_string()),
        timestamp: Some("2024-05-01T10:01:00".to_string()),
        error: None,
    }
}

/// Logical send failure
pub fn send_failed(reason: &str) -> SendMessageResponse {
    SendMessageResponse {
        success: false,
        error: Some(reason.to_string()),
        ..SendMessageResponse::default()
    }
}

/// Active session lookup that finds a session
pub fn found(session_id: &str, mode: Mode, subject: &str) -> ActiveSessionResponse {
    ActiveSessionResponse {
        success: true,
        has_active_session: true,
        session_data: Some(SessionData {
            session_id: session_id.to_string(),
            mode,
            subject: subject.to_string(),
        }),
        error: None,
    }
}

/// History entry
pub fn said(content: &str, is_ai: bool) -> HistoryMessage {
    HistoryMessage {
        content: content.to_string(),
        is_ai,
        timestamp: None,
    }
}

/// Observable state of the fake recognizer
#[derive(Debug, Default)]
pub struct RecognizerState {
    pub starts: Vec<u64>,
    pub stops: usize,
    pub aborts: usize,
    pub fail_next_start: bool,
}

pub struct FakeRecognizer {
    state: Arc<Mutex<RecognizerState>>,
    supported: bool,
    journal: Journal,
}

impl SpeechRecognizer for FakeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, period: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_start) {
            return Err(Error::Audio("device busy".to_string()));
        }
        state.starts.push(period);
        drop(state);
        self.journal.record(format!("recognizer.start:{period}"));
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stops += 1;
        self.journal.record("recognizer.stop");
    }

    fn abort(&mut self) {
        self.state.lock().unwrap().aborts += 1;
        self.journal.record("recognizer.abort");
    }
}

/// Observable state of the fake synthesizer
#[derive(Debug, Default)]
pub struct SynthState {
    pub spoken: Vec<Utterance>,
    pub current: Option<Utterance>,
    pub cancels: usize,
    pub pauses: usize,
    /// Number of cancel calls to ignore before audio actually stops
    pub ignore_cancels: usize,
}

pub struct FakeSynthesizer {
    state: Arc<Mutex<SynthState>>,
    supported: bool,
    journal: Journal,
}

impl SpeechSynthesizer for FakeSynthesizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn speak(&mut self, utterance: Utterance) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.spoken.push(utterance.clone());
        state.current = Some(utterance);
        drop(state);
        self.journal.record("synth.speak");
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.cancels += 1;
        if state.current.is_some() && state.ignore_cancels > 0 {
            state.ignore_cancels -= 1;
        } else {
            state.current = None;
        }
        drop(state);
        self.journal.record("synth.cancel");
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().pauses += 1;
        self.journal.record("synth.pause");
    }

    fn is_speaking(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

#[derive(Debug, Default)]
pub struct MicrophoneState {
    pub requests: usize,
    pub deny: bool,
}

pub struct FakeMicrophone {
    state: Arc<Mutex<MicrophoneState>>,
    journal: Journal,
}

impl MicrophoneAccess for FakeMicrophone {
    fn request_access(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        let deny = state.deny;
        drop(state);
        self.journal.record("microphone.request");
        if deny {
            Err(Error::MicrophonePermission("NotAllowedError".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Knobs for building a [`Harness`]
#[derive(Debug, Clone)]
pub struct Options {
    pub settings: ControllerSettings,
    pub recognition_supported: bool,
    pub synthesis_supported: bool,
    pub user: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            settings: ControllerSettings {
                min_latency: Duration::ZERO,
                ..ControllerSettings::default()
            },
            recognition_supported: true,
            synthesis_supported: true,
            user: Some(USER.to_string()),
        }
    }
}

/// A controller wired to fakes, with handles to inspect them
pub struct Harness {
    pub controller: TutorController,
    pub backend: Arc<FakeBackend>,
    pub recognizer: Arc<Mutex<RecognizerState>>,
    pub synth: Arc<Mutex<SynthState>>,
    pub microphone: Arc<Mutex<MicrophoneState>>,
    pub journal: Journal,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Options::default())
    }

    pub fn with(options: Options) -> Self {
        let journal = Journal::default();
        let backend = Arc::new(FakeBackend::new(journal.clone()));
        let recognizer = Arc::new(Mutex::new(RecognizerState::default()));
        let synth = Arc::new(Mutex::new(SynthState::default()));
        let microphone = Arc::new(Mutex::new(MicrophoneState::default()));

        let engines = SpeechEngines {
            recognizer: Box::new(FakeRecognizer {
                state: Arc::clone(&recognizer),
                supported: options.recognition_supported,
                journal: journal.clone(),
            }),
            synthesizer: Box::new(FakeSynthesizer {
                state: Arc::clone(&synth),
                supported: options.synthesis_supported,
                journal: journal.clone(),
            }),
            microphone: Box::new(FakeMicrophone {
                state: Arc::clone(&microphone),
                journal: journal.clone(),
            }),
        };

        let shared: Arc<dyn TutorBackend> = backend.clone();
        let mut controller = TutorController::new(shared, engines, options.settings);
        controller.set_user(options.user);
        journal.observe(controller.subscribe());

        Self {
            controller,
            backend,
            recognizer,
            synth,
            microphone,
            journal,
        }
    }

    /// Start a tutor session on "Linear Algebra"
    pub async fn start(&mut self) {
        self.controller
            .start_session(Mode::Tutor, "Linear Algebra")
            .await
            .unwrap();
    }

    /// Message contents with their roles, in order
    pub fn transcript(&self) -> Vec<(Role, String)> {
        self.controller
            .messages()
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.controller
            .messages()
            .iter()
            .filter(|m| m.role == role)
            .count()
    }

    pub fn count_content(&self, content: &str) -> usize {
        self.controller
            .messages()
            .iter()
            .filter(|m| m.content == content)
            .count()
    }

    /// Whether the fake engine is producing audio
    pub fn audible(&self) -> bool {
        self.synth.lock().unwrap().current.is_some()
    }
}
