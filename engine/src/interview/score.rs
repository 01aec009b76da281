//! Score extraction from interviewer replies
//!
//! The role-grant prompt asks the model to start every reply with the line
//! `답변에 대한 점수: nn점`. The first such line found anywhere in the reply
//! wins. A reply without it scores 0; [`extract_score`] tells the two cases
//! apart so callers can log the fallback.

use interviewer_sdk::types::{Score, MAX_SCORE};
use regex::Regex;
use std::sync::OnceLock;

/// Fixed score-line phrase, shared with the prompt template
pub const SCORE_LINE_PREFIX: &str = "답변에 대한 점수:";

static SCORE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn score_pattern() -> &'static Regex {
    SCORE_PATTERN
        .get_or_init(|| Regex::new(r"답변에 대한 점수: ([0-9]+)점").expect("Invalid score pattern"))
}

/// Result of looking for the score line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedScore {
    pub score: Score,
    /// False when no score line was found and the score fell back to 0
    pub recovered: bool,
}

/// Extract the score and whether it was actually present
pub fn extract_score(reply: &str) -> ParsedScore {
    let Some(digits) = score_pattern()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return ParsedScore {
            score: Score::ZERO,
            recovered: false,
        };
    };

    // Too many digits to fit u64 is still "above the maximum"
    let raw = digits.parse::<u64>().unwrap_or(u64::MAX);
    if raw > MAX_SCORE as u64 {
        tracing::warn!(raw = digits, "score above {} clamped", MAX_SCORE);
    }

    ParsedScore {
        score: Score::clamped(raw),
        recovered: true,
    }
}

/// Score of a reply, 0 when the score line is absent
pub fn parse_score(reply: &str) -> Score {
    extract_score(reply).score
}
