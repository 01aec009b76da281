//! Conversation service
//!
//! Drives one interview turn from answer to stored follow-up question and
//! moves finished conversations into the archive. Every multi-write step runs
//! in a single unit of work, and every operation on a (subject, member) pair
//! holds that pair's lock from first read to commit.

use anyhow::Result;
use interviewer_sdk::errors::EngineError;
use interviewer_sdk::types::{
    now_millis, Archive, ArchiveContent, ChatContent, ChatEntry, ConversationKey, Member,
    NewChatEntry, Score, Subject, MAX_ANSWER_COUNT,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::locks::PairLocks;
use super::prompt::build_request_messages;
use super::score::extract_score;
use crate::llm::router::LLMRouter;
use crate::store::{Storage, UnitOfWork};

/// Entries written by one append
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendedTurn {
    /// Present only when the conversation was empty before the append
    pub bootstrap: Option<ChatEntry>,
    pub answer: ChatEntry,
    pub next_question: ChatEntry,
}

/// Result of a full interview turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    #[serde(flatten)]
    pub entries: AppendedTurn,
    /// Answers in the live conversation after this turn
    pub answer_count: usize,
    /// False when the reply had no score line and the score fell back to 0
    pub score_recovered: bool,
    /// Provider that produced the reply
    pub provider: String,
}

/// An archive header with its ordered contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveWithContents {
    #[serde(flatten)]
    pub archive: Archive,
    pub contents: Vec<ArchiveContent>,
}

/// Number of answers in a well-formed live conversation of `live_entry_count` entries
pub fn answer_count(live_entry_count: usize) -> usize {
    live_entry_count / 2
}

/// Reject a turn when the conversation already holds the maximum number of answers
pub fn enforce_answer_limit(live_entry_count: usize) -> Result<(), EngineError> {
    if answer_count(live_entry_count) >= MAX_ANSWER_COUNT {
        return Err(EngineError::AllAnswersUsed {
            limit: MAX_ANSWER_COUNT,
        });
    }
    Ok(())
}

pub struct ConversationService {
    storage: Arc<dyn Storage>,
    router: Arc<LLMRouter>,
    locks: PairLocks,
    completion_timeout: Duration,
}

impl ConversationService {
    pub fn new(
        storage: Arc<dyn Storage>,
        router: Arc<LLMRouter>,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            router,
            locks: PairLocks::new(),
            completion_timeout,
        }
    }

    /// Run a full turn: validate, ask the interviewer, store answer and follow-up
    ///
    /// Nothing is written when validation, the limit check or the completion
    /// call fails.
    pub async fn answer(
        &self,
        subject: &Subject,
        member: &Member,
        answer_text: &str,
    ) -> Result<TurnOutcome> {
        if answer_text.trim().is_empty() {
            return Err(EngineError::InvalidAnswer.into());
        }

        let key = ConversationKey::new(subject.id, member.id);
        let _pair = self.locks.acquire(key).await;

        let conversation = self.storage.load_conversation(key).await?;
        if let Err(e) = enforce_answer_limit(conversation.len()) {
            warn!(
                subject_id = key.subject_id,
                member_id = key.member_id,
                "answer rejected: {}",
                e
            );
            return Err(e.into());
        }

        debug!(
            subject_id = key.subject_id,
            member_id = key.member_id,
            live_entries = conversation.len(),
            "requesting interviewer reply"
        );

        let messages = build_request_messages(subject, &conversation, answer_text);
        let (reply, provider) =
            match tokio::time::timeout(self.completion_timeout, self.router.call(&messages)).await
            {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(
                        subject_id = key.subject_id,
                        member_id = key.member_id,
                        "completion failed, nothing written: {}",
                        e
                    );
                    return Err(EngineError::LLMProvider(e.to_string()).into());
                }
                Err(_) => {
                    warn!(
                        subject_id = key.subject_id,
                        member_id = key.member_id,
                        timeout = ?self.completion_timeout,
                        "completion timed out, nothing written"
                    );
                    return Err(EngineError::LLMTimeout.into());
                }
            };

        let parsed = extract_score(&reply);
        if !parsed.recovered {
            warn!(
                subject_id = key.subject_id,
                member_id = key.member_id,
                provider = %provider,
                "reply has no score line, recording 0"
            );
        }

        let entries = self
            .append_locked(
                subject,
                member,
                answer_text,
                conversation.len(),
                &reply,
                parsed.score,
            )
            .await?;

        let live_entries = conversation.len() + if entries.bootstrap.is_some() { 3 } else { 2 };
        let outcome = TurnOutcome {
            entries,
            answer_count: answer_count(live_entries),
            score_recovered: parsed.recovered,
            provider,
        };

        info!(
            subject_id = key.subject_id,
            member_id = key.member_id,
            score = outcome.entries.answer.content.score().map(|s| s.value()),
            answer_count = outcome.answer_count,
            "turn recorded"
        );

        Ok(outcome)
    }

    /// Atomically append (bootstrap question,) answer and next question
    ///
    /// `live_entry_count` is the size of the conversation the caller based the
    /// turn on; a different count at write time fails with `StaleConversation`.
    pub async fn append_answer_and_next_question(
        &self,
        subject: &Subject,
        member: &Member,
        answer_text: &str,
        live_entry_count: usize,
        next_question_text: &str,
        score: Score,
    ) -> Result<AppendedTurn> {
        let key = ConversationKey::new(subject.id, member.id);
        let _pair = self.locks.acquire(key).await;

        self.append_locked(
            subject,
            member,
            answer_text,
            live_entry_count,
            next_question_text,
            score,
        )
        .await
    }

    async fn append_locked(
        &self,
        subject: &Subject,
        member: &Member,
        answer_text: &str,
        live_entry_count: usize,
        next_question_text: &str,
        score: Score,
    ) -> Result<AppendedTurn> {
        if answer_text.trim().is_empty() {
            return Err(EngineError::InvalidAnswer.into());
        }

        let key = ConversationKey::new(subject.id, member.id);
        let mut unit = self.storage.begin().await?;

        let written = write_turn(
            unit.as_mut(),
            subject,
            key,
            answer_text,
            live_entry_count,
            next_question_text,
            score,
        )
        .await;

        match written {
            Ok(turn) => {
                unit.commit().await?;
                Ok(turn)
            }
            Err(e) => {
                warn!(
                    subject_id = key.subject_id,
                    member_id = key.member_id,
                    "append rolled back: {}",
                    e
                );
                rollback(unit).await;
                Err(e)
            }
        }
    }

    /// Move the live conversation into a new archive and clear it
    ///
    /// Returns `None` without writing anything when the conversation is empty.
    pub async fn archive(&self, subject: &Subject, member: &Member) -> Result<Option<Archive>> {
        let key = ConversationKey::new(subject.id, member.id);
        let _pair = self.locks.acquire(key).await;

        let mut unit = self.storage.begin().await?;

        match archive_live(unit.as_mut(), key).await {
            Ok(Some((archive, copied))) => {
                unit.commit().await?;
                info!(
                    subject_id = key.subject_id,
                    member_id = key.member_id,
                    archive_id = archive.id,
                    entries = copied,
                    "conversation archived"
                );
                Ok(Some(archive))
            }
            Ok(None) => {
                rollback(unit).await;
                debug!(
                    subject_id = key.subject_id,
                    member_id = key.member_id,
                    "nothing to archive"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    subject_id = key.subject_id,
                    member_id = key.member_id,
                    "archive rolled back: {}",
                    e
                );
                rollback(unit).await;
                Err(e)
            }
        }
    }

    /// Live conversation in creation order
    pub async fn conversation(&self, key: ConversationKey) -> Result<Vec<ChatEntry>> {
        self.storage.load_conversation(key).await
    }

    /// Archives of a conversation, oldest first, each with its contents
    pub async fn archives(&self, key: ConversationKey) -> Result<Vec<ArchiveWithContents>> {
        let mut result = Vec::new();
        for archive in self.storage.list_archives(key).await? {
            let contents = self.storage.load_archive_contents(archive.id).await?;
            result.push(ArchiveWithContents { archive, contents });
        }
        Ok(result)
    }
}

async fn write_turn(
    unit: &mut dyn UnitOfWork,
    subject: &Subject,
    key: ConversationKey,
    answer_text: &str,
    live_entry_count: usize,
    next_question_text: &str,
    score: Score,
) -> Result<AppendedTurn> {
    let live = unit.find_ordered(key).await?;
    if live.len() != live_entry_count {
        return Err(EngineError::StaleConversation {
            expected: live_entry_count,
            actual: live.len(),
        }
        .into());
    }
    enforce_answer_limit(live.len())?;

    let bootstrap = if live.is_empty() {
        Some(
            unit.append(NewChatEntry::new(
                key,
                ChatContent::question(subject.question.as_str()),
            ))
            .await?,
        )
    } else {
        None
    };

    let answer = unit
        .append(NewChatEntry::new(
            key,
            ChatContent::answer(answer_text, score),
        ))
        .await?;

    let next_question = unit
        .append(NewChatEntry::new(
            key,
            ChatContent::question(next_question_text),
        ))
        .await?;

    Ok(AppendedTurn {
        bootstrap,
        answer,
        next_question,
    })
}

async fn archive_live(
    unit: &mut dyn UnitOfWork,
    key: ConversationKey,
) -> Result<Option<(Archive, usize)>> {
    let live = unit.find_ordered(key).await?;
    if live.is_empty() {
        return Ok(None);
    }

    let archive = unit.create(key, now_millis(), &live).await?;
    let copied = unit.find_contents(archive.id).await?;
    if copied.len() != live.len() {
        return Err(EngineError::CorruptEntry(format!(
            "archive {} holds {} of {} entries",
            archive.id,
            copied.len(),
            live.len()
        ))
        .into());
    }

    let deleted = unit.delete_all(key).await?;
    if deleted != live.len() as u64 {
        return Err(EngineError::StaleConversation {
            expected: live.len(),
            actual: deleted as usize,
        }
        .into());
    }

    Ok(Some((archive, live.len())))
}

async fn rollback(unit: Box<dyn UnitOfWork>) {
    if let Err(e) = unit.rollback().await {
        error!("rollback failed: {:#}", e);
    }
}
