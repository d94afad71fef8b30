//! Voice Tutor - Voice-first AI tutoring sessions
//!
//! This library provides the client side of a voice tutoring product:
//! - Session lifecycle against a remote tutoring service
//! - Microphone and transcript management
//! - Spoken replies with reliable cancellation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Front end                        │
//! │        CLI REPL  │  snapshot subscribers             │
//! └────────────────────┬────────────────────────────────┘
//!                      │ operations / ControllerEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                 TutorController                      │
//! │   Session  │  Microphone  │  Transcript  │  Speech   │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │                             │
//! ┌──────────▼──────────┐   ┌──────────────▼────────────┐
//! │   TutorBackend      │   │  Speech engines           │
//! │   (HTTP/JSON)       │   │  cpal + STT/TTS APIs      │
//! └─────────────────────┘   └───────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod voice;

pub use backend::{HttpBackend, TutorBackend};
pub use config::Config;
pub use controller::{
    ControllerEvent, ControllerSettings, Snapshot, SpeechEngines, TutorController,
};
pub use error::{Error, Result};
pub use model::{Message, MicState, Mode, QuickAction, Role, Session};
