//! Transcript assembly for one recording period

/// Recognized speech accumulated while the microphone is active
///
/// Finalized segments only ever grow; the interim segment is replaced by each
/// new interim result and dropped once the engine finalizes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    finalized: String,
    interim: String,
}

impl Transcript {
    /// Append a finalized segment
    pub fn push_final(&mut self, text: &str) {
        let text = text.trim();
        self.interim.clear();
        if text.is_empty() {
            return;
        }
        if !self.finalized.is_empty() {
            self.finalized.push(' ');
        }
        self.finalized.push_str(text);
    }

    /// Replace the interim segment
    pub fn set_interim(&mut self, text: &str) {
        self.interim = text.trim().to_string();
    }

    /// Visible text: finalized segments followed by the latest interim one
    #[must_use]
    pub fn text(&self) -> String {
        match (self.finalized.is_empty(), self.interim.is_empty()) {
            (_, true) => self.finalized.clone(),
            (true, false) => self.interim.clone(),
            (false, false) => format!("{} {}", self.finalized, self.interim),
        }
    }

    /// Finalized text only
    #[must_use]
    pub fn finalized(&self) -> &str {
        &self.finalized
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty() && self.interim.is_empty()
    }

    pub fn clear(&mut self) {
        self.finalized.clear();
        self.interim.clear();
    }
}
