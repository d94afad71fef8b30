//! Session, message and microphone state types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use uuid::Uuid;

use crate::Error;

/// Interaction style chosen before a session starts
///
/// Serialized lowercase; parsed case-insensitively from both text and the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Tutor,
    Conversation,
    Debate,
    Interview,
}

impl Mode {
    /// Every mode, in display order
    pub const ALL: [Self; 4] = [
        Self::Tutor,
        Self::Conversation,
        Self::Debate,
        Self::Interview,
    ];

    /// Wire identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tutor => "tutor",
            Self::Conversation => "conversation",
            Self::Debate => "debate",
            Self::Interview => "interview",
        }
    }

    /// Human-readable name
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Tutor => "Personal Tutor",
            Self::Conversation => "Conversation Practice",
            Self::Debate => "Debate Partner",
            Self::Interview => "Interview Prep",
        }
    }

    /// One-line description of the mode
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Tutor => "One-on-one learning sessions",
            Self::Conversation => "Practice speaking and listening",
            Self::Debate => "Structured argument practice",
            Self::Interview => "Job interview simulation",
        }
    }

    /// What the learner is expected to say next
    #[must_use]
    pub fn prompt_hint(self, subject: &str) -> String {
        match self {
            Self::Tutor => "Ask questions or request explanations".to_string(),
            Self::Conversation => format!("Start a conversation about {subject}"),
            Self::Debate => "Present your argument".to_string(),
            Self::Interview => "Answer interview questions".to_string(),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tutor" => Ok(Self::Tutor),
            "conversation" => Ok(Self::Conversation),
            "debate" => Ok(Self::Debate),
            "interview" => Ok(Self::Interview),
            other => Err(Error::Validation(format!("unknown mode: {other}"))),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// A tutoring session tracked by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub mode: Mode,
    pub subject: String,
    pub active: bool,
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One entry of the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub is_voice_input: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            is_voice_input: false,
            timestamp: Utc::now(),
        }
    }

    /// Message typed or spoken by the learner
    #[must_use]
    pub fn user(content: impl Into<String>, is_voice_input: bool) -> Self {
        Self {
            is_voice_input,
            ..Self::new(Role::User, content)
        }
    }

    /// Reply from the tutor
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Local notice (errors, restoration, confirmations)
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Override the timestamp with one reported by the server
    #[must_use]
    pub fn at(mut self, timestamp: Option<&str>) -> Self {
        if let Some(ts) = timestamp.and_then(parse_timestamp) {
            self.timestamp = ts;
        }
        self
    }
}

/// Parse a server timestamp (RFC 3339, or naive ISO 8601 assumed UTC)
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Microphone availability as shown to the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MicState {
    #[default]
    Inactive,
    Active,
    /// Speech is playing or a network call is outstanding
    Disabled,
}

/// Canned prompts offered next to the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickAction {
    AskQuestion,
    GetHint,
    ExplainMore,
    ChangeTopic,
}

impl QuickAction {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AskQuestion => "Ask Question",
            Self::GetHint => "Get Hint",
            Self::ExplainMore => "Explain More",
            Self::ChangeTopic => "Change Topic",
        }
    }

    /// Prompt sent to the tutor for this action
    #[must_use]
    pub const fn prompt(self) -> &'static str {
        match self {
            Self::AskQuestion => "Ask me a question to test my understanding.",
            Self::GetHint => "Give me a hint without revealing the full answer.",
            Self::ExplainMore => "Explain that in more detail, with an example.",
            Self::ChangeTopic => "Let's move on to a different topic within this subject.",
        }
    }
}
