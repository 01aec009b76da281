//! Error types and handling
//!
//! This module provides the error types used throughout the interviewer engine.
//! All errors implement the `EngineErrorExt` trait which provides user-friendly
//! hints, a stable error code and whether the error is recoverable.
//!
//! # Error Categories
//!
//! - **Validation**: blank answers, unknown categories
//! - **Conversation state**: answer limit reached, stale conversation view
//! - **Directory**: missing subjects or members
//! - **Storage**: SQLite failures and corrupt rows
//! - **Completion**: language-model provider failures and timeouts
//!
//! Validation and limit errors are recoverable (the caller can fix the input
//! or archive first). Storage and defensive errors are fatal for the request.

use thiserror::Error;

/// Trait for engine error extensions
pub trait EngineErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never echoes raw
    /// storage or provider details.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be corrected by the caller. Non-recoverable
    /// errors indicate a storage fault or a broken invariant.
    fn is_recoverable(&self) -> bool;

    /// Stable machine-readable error code
    fn error_code(&self) -> &'static str;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use interviewer_sdk::errors::{EngineError, EngineErrorExt};
///
/// let error = EngineError::AllAnswersUsed { limit: 10 };
/// assert_eq!(error.error_code(), "ALL_ANSWERS_USED");
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::UnknownChatType("note".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt chat entry: {0}")]
    CorruptEntry(String),

    // Conversation errors
    #[error("Answer must not be blank")]
    InvalidAnswer,

    #[error("All {limit} answers have been used; archive the conversation to start over")]
    AllAnswersUsed { limit: usize },

    #[error("Unknown chat type: {0}")]
    UnknownChatType(String),

    #[error("Conversation changed: expected {expected} live entries, found {actual}")]
    StaleConversation { expected: usize, actual: usize },

    // Directory errors
    #[error("Subject not found by id: {0}")]
    SubjectNotFound(i64),

    #[error("Member not found by id: {0}")]
    MemberNotFound(i64),

    #[error("Unknown subject category: {0}")]
    UnknownCategory(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,
}

impl EngineErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Database(_) => "Database operation failed. Try again later",
            Self::CorruptEntry(_) => "Stored conversation is damaged. Contact an administrator",

            Self::InvalidAnswer => "Type an answer before submitting",
            Self::AllAnswersUsed { .. } => "No answers left. Archive this conversation to start over",
            Self::UnknownChatType(_) => "Stored conversation is damaged. Contact an administrator",
            Self::StaleConversation { .. } => "The conversation changed meanwhile. Reload and retry",

            Self::SubjectNotFound(_) => "The requested subject does not exist",
            Self::MemberNotFound(_) => "The requested member does not exist",
            Self::UnknownCategory(_) => "Unknown category. Use one of the listed categories",

            Self::LLMProvider(_) => "Interviewer unavailable. Check provider settings and network",
            Self::LLMTimeout => "The interviewer took too long to respond. Try again",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Database(_) | Self::CorruptEntry(_) | Self::UnknownChatType(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Database(_) | Self::CorruptEntry(_) | Self::UnknownChatType(_) => "SERVER_ERROR",
            Self::InvalidAnswer => "NO_ANSWER",
            Self::AllAnswersUsed { .. } => "ALL_ANSWERS_USED",
            Self::StaleConversation { .. } => "CONFLICT",
            Self::SubjectNotFound(_) => "SUBJECT_NOT_FOUND",
            Self::MemberNotFound(_) => "MEMBER_NOT_FOUND",
            Self::UnknownCategory(_) => "BAD_REQUEST",
            Self::LLMProvider(_) => "LLM_UNAVAILABLE",
            Self::LLMTimeout => "LLM_TIMEOUT",
        }
    }
}
