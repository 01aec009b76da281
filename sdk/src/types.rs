//! Interview domain types
//!
//! Value objects shared by the engine's storage, interview core and CLI.
//! Subjects and members are referenced by id only; a chat entry never owns them.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Maximum number of answers a live conversation may hold
pub const MAX_ANSWER_COUNT: usize = 10;

/// Highest score the interviewer can award
pub const MAX_SCORE: u8 = 100;

/// Current time truncated to millisecond precision
///
/// Timestamps are persisted as epoch milliseconds, so everything created in
/// memory is truncated the same way to compare equal after a round trip.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}

/// Identifies one conversation: a (subject, member) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub subject_id: i64,
    pub member_id: i64,
}

impl ConversationKey {
    pub fn new(subject_id: i64, member_id: i64) -> Self {
        Self {
            subject_id,
            member_id,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject={} member={}", self.subject_id, self.member_id)
    }
}

/// Subject category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectCategory {
    Os,
    Network,
    Database,
    DataStructure,
    Algorithm,
}

impl SubjectCategory {
    pub const ALL: [SubjectCategory; 5] = [
        Self::Os,
        Self::Network,
        Self::Database,
        Self::DataStructure,
        Self::Algorithm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Os => "OS",
            Self::Network => "NETWORK",
            Self::Database => "DATABASE",
            Self::DataStructure => "DATA_STRUCTURE",
            Self::Algorithm => "ALGORITHM",
        }
    }
}

impl fmt::Display for SubjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectCategory {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| EngineError::UnknownCategory(s.to_string()))
    }
}

/// A subject: one fixed interview question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    pub title: String,
    /// Base question, always the first entry of a conversation
    pub question: String,
    pub category: SubjectCategory,
}

/// How a member signed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginType {
    Google,
}

impl LoginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
        }
    }
}

impl FromStr for LoginType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GOOGLE" => Ok(Self::Google),
            other => Err(EngineError::Database(format!("unknown login type: {}", other))),
        }
    }
}

/// A member answering interview questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub login_type: LoginType,
}

/// Interview score in `[0, MAX_SCORE]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(u8);

impl Score {
    pub const ZERO: Score = Score(0);

    /// Build a score, clamping anything above `MAX_SCORE`
    pub fn clamped(value: u64) -> Self {
        Score(value.min(MAX_SCORE as u64) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=MAX_SCORE as i64).contains(&value) {
            Ok(Score(value as u8))
        } else {
            Err(EngineError::CorruptEntry(format!(
                "score {} outside 0..={}",
                value, MAX_SCORE
            )))
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage discriminant of a chat entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Question,
    Answer,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Answer => "answer",
        }
    }
}

impl FromStr for ChatKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(Self::Question),
            "answer" => Ok(Self::Answer),
            other => Err(EngineError::UnknownChatType(other.to_string())),
        }
    }
}

/// Content of a chat entry
///
/// A question carries only text; an answer always carries its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChatContent {
    Question { message: String },
    Answer { message: String, score: Score },
}

impl ChatContent {
    pub fn question(message: impl Into<String>) -> Self {
        Self::Question {
            message: message.into(),
        }
    }

    pub fn answer(message: impl Into<String>, score: Score) -> Self {
        Self::Answer {
            message: message.into(),
            score,
        }
    }

    /// Rebuild content from its stored columns
    ///
    /// An unrecognised kind yields `UnknownChatType`; a score on a question or
    /// a missing score on an answer yields `CorruptEntry`.
    pub fn from_parts(kind: &str, message: String, score: Option<i64>) -> Result<Self, EngineError> {
        match (kind.parse::<ChatKind>()?, score) {
            (ChatKind::Question, None) => Ok(Self::Question { message }),
            (ChatKind::Answer, Some(raw)) => Ok(Self::Answer {
                message,
                score: Score::try_from(raw)?,
            }),
            (ChatKind::Question, Some(_)) => Err(EngineError::CorruptEntry(
                "question entry carries a score".to_string(),
            )),
            (ChatKind::Answer, None) => Err(EngineError::CorruptEntry(
                "answer entry has no score".to_string(),
            )),
        }
    }

    pub fn kind(&self) -> ChatKind {
        match self {
            Self::Question { .. } => ChatKind::Question,
            Self::Answer { .. } => ChatKind::Answer,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Question { message } | Self::Answer { message, .. } => message,
        }
    }

    pub fn score(&self) -> Option<Score> {
        match self {
            Self::Question { .. } => None,
            Self::Answer { score, .. } => Some(*score),
        }
    }
}

/// A chat entry that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatEntry {
    pub key: ConversationKey,
    pub content: ChatContent,
    pub created_at: DateTime<Utc>,
}

impl NewChatEntry {
    pub fn new(key: ConversationKey, content: ChatContent) -> Self {
        Self {
            key,
            content,
            created_at: now_millis(),
        }
    }
}

/// One immutable record of a live conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub id: i64,
    pub key: ConversationKey,
    #[serde(flatten)]
    pub content: ChatContent,
    pub created_at: DateTime<Utc>,
}

/// Header of a frozen conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub id: i64,
    pub key: ConversationKey,
    pub archived_at: DateTime<Utc>,
}

/// One entry copied into an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveContent {
    pub archive_id: i64,
    /// Zero-based position in the archived conversation
    pub position: u32,
    #[serde(flatten)]
    pub content: ChatContent,
    pub created_at: DateTime<Utc>,
}
