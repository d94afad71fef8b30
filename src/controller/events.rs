//! Events delivered to the controller
//!
//! Speech engines, the page host and the auth provider never mutate controller
//! state directly. They push a [`ControllerEvent`] and the driver applies it
//! with [`TutorController::handle_event`](super::TutorController::handle_event).

use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending half of the controller's event queue
pub type EventSender = mpsc::UnboundedSender<ControllerEvent>;

/// Receiving half of the controller's event queue
pub type EventReceiver = mpsc::UnboundedReceiver<ControllerEvent>;

/// Create an event queue
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Something that happened outside the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// The controller's host came up
    Mounted,
    /// Host visibility changed
    Visibility(Visibility),
    /// Auth provider resolved the current user (`None` when signed out)
    AuthResolved(Option<String>),
    /// Speech recognizer callback for a recording period
    Recognition {
        period: u64,
        event: RecognitionEvent,
    },
    /// Speech synthesizer callback for an utterance
    Speech {
        message_id: Uuid,
        event: SpeechEvent,
    },
    /// Host is going away
    Unload,
}

/// Host visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Speech recognizer callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// New results since the last callback
    Result(Vec<RecognitionSegment>),
    /// Recognizer failed
    Error(RecognitionError),
    /// Recognizer stopped listening
    Ended,
}

/// One piece of recognized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSegment {
    pub text: String,
    pub is_final: bool,
}

impl RecognitionSegment {
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Recognizer failure kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Nothing was said before the engine gave up; recoverable
    NoSpeech,
    /// Capture was aborted
    Aborted,
    /// Microphone permission was refused
    NotAllowed,
    /// Recognition service unreachable
    Network,
    Other(String),
}

impl RecognitionError {
    /// Whether the controller restarts capture instead of surfacing the error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::NoSpeech => "no speech detected".to_string(),
            Self::Aborted => "capture aborted".to_string(),
            Self::NotAllowed => "microphone permission denied".to_string(),
            Self::Network => "recognition service unreachable".to_string(),
            Self::Other(reason) => reason.clone(),
        }
    }
}

/// Speech synthesizer callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Ended,
    Error(String),
}
