//! Energy-based speech segmentation
//!
//! Splits a live capture stream into utterance segments the way a streaming
//! recognizer finalizes phrases, and decides when the stream has ended.

/// Minimum RMS energy to count a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech length for a segment (0.3 s at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Pause that closes a segment (0.6 s)
const SEGMENT_SILENCE_SAMPLES: usize = 9600;

/// Silence after the last segment that ends the stream (2.5 s)
const END_SILENCE_SAMPLES: usize = 40_000;

/// Time without any speech before giving up (8 s)
const NO_SPEECH_SAMPLES: usize = 128_000;

/// Outcome of feeding audio to the segmenter
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentEvent {
    /// A phrase ended; samples cover the whole phrase
    Segment(Vec<f32>),
    /// Nothing was said before the no-speech timeout
    NoSpeech,
    /// Long silence after speech; the recording is over
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Waiting,
    Speaking,
}

/// Splits audio into speech segments
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: State,
    segment: Vec<f32>,
    silence: usize,
    heard_speech: bool,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::Waiting,
            segment: Vec::new(),
            silence: 0,
            heard_speech: false,
        }
    }

    /// Feed a chunk of 16kHz mono samples
    pub fn process(&mut self, samples: &[f32]) -> Option<SegmentEvent> {
        if samples.is_empty() {
            return None;
        }
        let speech = is_speech(samples);

        match self.state {
            State::Waiting => {
                if speech {
                    self.state = State::Speaking;
                    self.segment.clear();
                    self.segment.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!("speech started");
                    return None;
                }

                self.silence += samples.len();
                if self.heard_speech && self.silence > END_SILENCE_SAMPLES {
                    tracing::debug!("end of speech stream");
                    return Some(SegmentEvent::EndOfStream);
                }
                if !self.heard_speech && self.silence > NO_SPEECH_SAMPLES {
                    tracing::debug!("no speech before timeout");
                    self.silence = 0;
                    return Some(SegmentEvent::NoSpeech);
                }
                None
            }
            State::Speaking => {
                self.segment.extend_from_slice(samples);
                if speech {
                    self.silence = 0;
                    return None;
                }

                self.silence += samples.len();
                if self.silence <= SEGMENT_SILENCE_SAMPLES {
                    return None;
                }

                self.state = State::Waiting;
                let segment = std::mem::take(&mut self.segment);
                if segment.len() - self.silence < MIN_SPEECH_SAMPLES {
                    tracing::trace!(samples = segment.len(), "discarding short noise burst");
                    return None;
                }

                self.heard_speech = true;
                tracing::debug!(samples = segment.len(), "speech segment complete");
                Some(SegmentEvent::Segment(segment))
            }
        }
    }

    /// Take whatever speech is buffered, ending the current segment early
    pub fn flush(&mut self) -> Option<Vec<f32>> {
        if self.state != State::Speaking {
            return None;
        }
        self.state = State::Waiting;
        self.silence = 0;
        let segment = std::mem::take(&mut self.segment);
        (segment.len() >= MIN_SPEECH_SAMPLES).then_some(segment)
    }

    /// Whether at least one segment has been produced
    #[must_use]
    pub const fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Whether a chunk is loud enough to count as speech
#[must_use]
pub fn is_speech(samples: &[f32]) -> bool {
    rms_energy(samples) > ENERGY_THRESHOLD
}

/// RMS energy of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
