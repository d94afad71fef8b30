//! Speech engines backed by local audio devices and hosted STT/TTS
//!
//! The recognizer polls the capture buffer every 100ms, segments speech by
//! energy and transcribes each finished phrase. The synthesizer fetches MP3
//! audio and plays it on a blocking thread. Both report back through the
//! controller's event queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::capture::{self, AudioCapture, SAMPLE_RATE, SharedSamples, samples_to_wav};
use super::playback::{AudioPlayback, PlaybackHandle};
use super::segmenter::{SegmentEvent, SpeechSegmenter};
use super::stt::SpeechToText;
use super::tts::TextToSpeech;
use super::{MicrophoneAccess, SpeechRecognizer, SpeechSynthesizer, Utterance};
use crate::controller::{
    ControllerEvent, EventSender, RecognitionError, RecognitionEvent, RecognitionSegment,
    SpeechEvent,
};
use crate::{Error, Result};

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Samples fed to the segmenter at a time (100ms at 16kHz)
const CHUNK_SAMPLES: usize = 1600;

/// Microphone recognizer using a hosted transcription API
pub struct NativeRecognizer {
    stt: Option<Arc<SpeechToText>>,
    events: EventSender,
    supported: bool,
    period: u64,
    capture: Option<AudioCapture>,
    worker: Option<JoinHandle<()>>,
}

impl NativeRecognizer {
    /// Create a recognizer; without a transcriber it reports itself unsupported
    #[must_use]
    pub fn new(stt: Option<SpeechToText>, events: EventSender) -> Self {
        let supported = stt.is_some() && AudioCapture::device_available();
        Self {
            stt: stt.map(Arc::new),
            events,
            supported,
            period: 0,
            capture: None,
            worker: None,
        }
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
    }
}

impl SpeechRecognizer for NativeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, period: u64) -> Result<()> {
        let stt = self
            .stt
            .clone()
            .ok_or_else(|| Error::Unsupported("speech recognition".to_string()))?;

        self.release();
        self.period = period;

        let mut capture = AudioCapture::new()?;
        capture.start()?;
        let buffer = capture.shared_buffer();
        self.capture = Some(capture);

        let events = self.events.clone();
        self.worker = Some(tokio::spawn(listen(period, buffer, stt, events)));
        tracing::debug!(period, "native recognizer listening");
        Ok(())
    }

    fn stop(&mut self) {
        if self.capture.is_none() && self.worker.is_none() {
            return;
        }
        self.release();
        if self
            .events
            .send(ControllerEvent::Recognition {
                period: self.period,
                event: RecognitionEvent::Ended,
            })
            .is_err()
        {
            tracing::trace!(period = self.period, "controller gone, end of recognition dropped");
        }
    }

    fn abort(&mut self) {
        self.release();
    }
}

impl Drop for NativeRecognizer {
    fn drop(&mut self) {
        self.release();
    }
}

/// Capture loop for one recording period
async fn listen(
    period: u64,
    buffer: SharedSamples,
    stt: Arc<SpeechToText>,
    events: EventSender,
) {
    let emit = |event: RecognitionEvent| {
        if let Err(e) = events.send(ControllerEvent::Recognition { period, event }) {
            tracing::trace!(period, event = ?e.0, "controller gone, recognition event dropped");
        }
    };
    let mut segmenter = SpeechSegmenter::new();

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        let samples = capture::drain(&buffer);
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            match segmenter.process(chunk) {
                None => {}
                Some(SegmentEvent::Segment(segment)) => {
                    match transcribe(&stt, &segment).await {
                        Ok(text) if text.trim().is_empty() => {}
                        Ok(text) => emit(RecognitionEvent::Result(vec![
                            RecognitionSegment::final_text(text),
                        ])),
                        Err(e) => {
                            tracing::warn!(period, error = %e, "transcription failed");
                            let error = if e.is_connectivity() {
                                RecognitionError::Network
                            } else {
                                RecognitionError::Other(e.to_string())
                            };
                            emit(RecognitionEvent::Error(error));
                            emit(RecognitionEvent::Ended);
                            return;
                        }
                    }
                }
                Some(SegmentEvent::NoSpeech) => {
                    emit(RecognitionEvent::Error(RecognitionError::NoSpeech));
                    emit(RecognitionEvent::Ended);
                    return;
                }
                Some(SegmentEvent::EndOfStream) => {
                    emit(RecognitionEvent::Ended);
                    return;
                }
            }
        }
    }
}

async fn transcribe(stt: &SpeechToText, samples: &[f32]) -> Result<String> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    stt.transcribe(&wav).await
}

/// Speaker output using a hosted synthesis API
pub struct NativeSynthesizer {
    tts: Option<Arc<TextToSpeech>>,
    events: EventSender,
    supported: bool,
    current: Option<PlaybackHandle>,
}

impl NativeSynthesizer {
    /// Create a synthesizer; without a TTS client it reports itself unsupported
    #[must_use]
    pub fn new(tts: Option<TextToSpeech>, events: EventSender) -> Self {
        let supported = tts.is_some() && AudioPlayback::device_available();
        Self {
            tts: tts.map(Arc::new),
            events,
            supported,
            current: None,
        }
    }
}

impl SpeechSynthesizer for NativeSynthesizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn speak(&mut self, utterance: Utterance) -> Result<()> {
        let tts = self
            .tts
            .clone()
            .ok_or_else(|| Error::Unsupported("speech synthesis".to_string()))?;

        self.cancel();
        let handle = PlaybackHandle::started();
        self.current = Some(handle.clone());

        let events = self.events.clone();
        tokio::spawn(async move {
            let Utterance { message_id, text } = utterance;
            let emit = |event: SpeechEvent| {
                if let Err(e) = events.send(ControllerEvent::Speech { message_id, event }) {
                    tracing::trace!(%message_id, event = ?e.0, "controller gone, speech event dropped");
                }
            };

            let audio = match tts.synthesize(&text).await {
                Ok(audio) => audio,
                Err(e) => {
                    handle.finish();
                    if !handle.is_cancelled() {
                        emit(SpeechEvent::Error(e.to_string()));
                    }
                    return;
                }
            };
            if handle.is_cancelled() {
                handle.finish();
                return;
            }

            emit(SpeechEvent::Started);
            let player = handle.clone();
            let played = tokio::task::spawn_blocking(move || {
                AudioPlayback::new()?.play_mp3(&audio, &player)
            })
            .await;
            handle.finish();

            match played {
                Ok(Ok(())) => emit(SpeechEvent::Ended),
                Ok(Err(e)) => emit(SpeechEvent::Error(e.to_string())),
                Err(e) => emit(SpeechEvent::Error(e.to_string())),
            }
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(handle) = &self.current {
            handle.cancel();
        }
    }

    fn pause(&mut self) {
        // Playback cannot resume, so pausing silences the stream like cancel
        self.cancel();
    }

    fn is_speaking(&self) -> bool {
        self.current.as_ref().is_some_and(PlaybackHandle::is_active)
    }
}

impl Drop for NativeSynthesizer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Opens the default input device to confirm it can be used
#[derive(Debug, Default)]
pub struct NativeMicrophone;

impl MicrophoneAccess for NativeMicrophone {
    fn request_access(&mut self) -> Result<()> {
        let mut capture = AudioCapture::new()?;
        capture.start().map_err(|e| match e {
            Error::MicrophonePermission(_) => e,
            other => Error::MicrophonePermission(other.to_string()),
        })?;
        capture.stop();
        tracing::debug!("microphone access confirmed");
        Ok(())
    }
}

/// Placeholder engines for environments without speech support
#[derive(Debug, Default)]
pub struct NoSpeech;

impl SpeechRecognizer for NoSpeech {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&mut self, _period: u64) -> Result<()> {
        Err(Error::Unsupported("speech recognition".to_string()))
    }

    fn stop(&mut self) {}

    fn abort(&mut self) {}
}

impl SpeechSynthesizer for NoSpeech {
    fn is_supported(&self) -> bool {
        false
    }

    fn speak(&mut self, _utterance: Utterance) -> Result<()> {
        Err(Error::Unsupported("speech synthesis".to_string()))
    }

    fn cancel(&mut self) {}

    fn pause(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

impl MicrophoneAccess for NoSpeech {
    fn request_access(&mut self) -> Result<()> {
        Ok(())
    }
}
