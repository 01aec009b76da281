//! Interview engine
//!
//! Turns a member's answer into a scored answer entry plus the interviewer's
//! follow-up question, and archives finished conversations.

pub mod locks;
pub mod prompt;
pub mod score;
pub mod service;

pub use locks::PairLocks;
pub use prompt::build_request_messages;
pub use score::{extract_score, parse_score, ParsedScore};
pub use service::{
    answer_count, enforce_answer_limit, AppendedTurn, ArchiveWithContents, ConversationService,
    TurnOutcome,
};
