//! Storage collaborator interfaces
//!
//! The interview core never touches SQL. It talks to a [`Storage`] that hands
//! out [`UnitOfWork`]s: every write of one operation goes through a single
//! unit, which either commits as a whole or rolls back as a whole. Dropping an
//! uncommitted unit rolls it back, so early returns and `?` release it too.
//!
//! Two implementations exist: [`crate::db::SqliteStorage`] for real use and
//! [`memory::MemoryStorage`] for tests and fault injection.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interviewer_sdk::types::{Archive, ArchiveContent, ChatEntry, ConversationKey, NewChatEntry};

pub mod memory;

pub use memory::MemoryStorage;

/// Append-only live conversation log
#[async_trait]
pub trait ConversationStore: Send {
    /// Append one entry and return it with its assigned id
    async fn append(&mut self, entry: NewChatEntry) -> Result<ChatEntry>;

    /// All live entries of a conversation in creation order
    async fn find_ordered(&mut self, key: ConversationKey) -> Result<Vec<ChatEntry>>;

    /// Remove every live entry of a conversation, returning how many were removed
    async fn delete_all(&mut self, key: ConversationKey) -> Result<u64>;
}

/// Cold storage for archived conversations
#[async_trait]
pub trait ArchiveStore: Send {
    /// Freeze `contents` (in order) into a new archive
    async fn create(
        &mut self,
        key: ConversationKey,
        archived_at: DateTime<Utc>,
        contents: &[ChatEntry],
    ) -> Result<Archive>;

    /// Archives of a conversation, oldest first
    async fn find_by_subject_and_member(&mut self, key: ConversationKey) -> Result<Vec<Archive>>;

    /// Contents of one archive ordered by position
    async fn find_contents(&mut self, archive_id: i64) -> Result<Vec<ArchiveContent>>;
}

/// Atomic multi-write scope
#[async_trait]
pub trait UnitOfWork: ConversationStore + ArchiveStore {
    /// Make every write of this unit visible at once
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every write of this unit
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Entry point to a storage backend
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a unit of work; writes are serialized across units
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Committed live entries of a conversation in creation order
    async fn load_conversation(&self, key: ConversationKey) -> Result<Vec<ChatEntry>>;

    /// Committed archives of a conversation, oldest first
    async fn list_archives(&self, key: ConversationKey) -> Result<Vec<Archive>>;

    /// Committed contents of one archive ordered by position
    async fn load_archive_contents(&self, archive_id: i64) -> Result<Vec<ArchiveContent>>;
}
