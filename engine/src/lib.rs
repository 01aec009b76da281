//! Interviewer Engine Library
//!
//! Core of the CS interview trainer: conversation state, prompt assembly,
//! score extraction and archiving. Used by the `interviewer` binary and the
//! integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Storage collaborator traits and the in-memory implementation
pub mod store;

/// LLM provider abstraction layer
pub mod llm;

/// Interview turns and archiving
pub mod interview;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
