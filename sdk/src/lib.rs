//! Interviewer SDK
//!
//! Shared vocabulary for the interviewer engine: domain value types and the
//! engine error type. Kept free of I/O so every component can depend on it.

/// Error types and handling
pub mod errors;

/// Domain value types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, EngineErrorExt};
pub use types::{
    now_millis, Archive, ArchiveContent, ChatContent, ChatEntry, ChatKind, ConversationKey,
    LoginType, Member, NewChatEntry, Score, Subject, SubjectCategory, MAX_ANSWER_COUNT, MAX_SCORE,
};
