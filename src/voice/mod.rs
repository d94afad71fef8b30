//! Speech capabilities
//!
//! The controller depends on the traits below rather than on any particular
//! engine. Native engines built on `cpal` and hosted STT/TTS APIs live in
//! [`native`]; tests substitute in-memory fakes.

mod capture;
pub mod native;
mod playback;
mod segmenter;
mod stt;
mod tts;

use uuid::Uuid;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use native::{NativeMicrophone, NativeRecognizer, NativeSynthesizer, NoSpeech};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, PlaybackHandle};
pub use segmenter::{SegmentEvent, SpeechSegmenter, is_speech, rms_energy};
pub use stt::SpeechToText;
pub use tts::TextToSpeech;

use crate::Result;

/// Turns microphone audio into recognition events
///
/// Implementations report results, errors and end-of-stream through the
/// controller's event queue, tagged with the `period` passed to [`start`].
///
/// [`start`]: SpeechRecognizer::start
pub trait SpeechRecognizer {
    /// Whether recognition is available in this environment
    fn is_supported(&self) -> bool {
        true
    }

    /// Begin capturing for a recording period
    ///
    /// # Errors
    ///
    /// Returns error if capture cannot start
    fn start(&mut self, period: u64) -> Result<()>;

    /// Stop capturing; the engine may still deliver a final end event
    fn stop(&mut self);

    /// Stop capturing and release the device; must be safe to call repeatedly
    fn abort(&mut self);
}

/// A piece of text to speak, scoped to the message it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub message_id: Uuid,
    pub text: String,
}

/// Plays text aloud
pub trait SpeechSynthesizer {
    /// Whether synthesis is available in this environment
    fn is_supported(&self) -> bool {
        true
    }

    /// Queue an utterance
    ///
    /// # Errors
    ///
    /// Returns error if the engine refuses the utterance
    fn speak(&mut self, utterance: Utterance) -> Result<()>;

    /// Drop the current utterance
    fn cancel(&mut self);

    /// Pause the current utterance
    fn pause(&mut self);

    /// Whether audio is still being produced
    fn is_speaking(&self) -> bool;
}

/// Checks that the microphone can be opened
pub trait MicrophoneAccess {
    /// Acquire the capture device and release it immediately
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MicrophonePermission`] if access is refused
    fn request_access(&mut self) -> Result<()>;
}
