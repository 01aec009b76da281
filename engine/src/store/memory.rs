//! In-memory storage
//!
//! A unit of work takes the state lock for its whole lifetime and works on a
//! private copy of the state. Commit swaps the copy in; anything else drops it.
//! [`MemoryStorage::fail_on_write`] makes a chosen write fail so tests can
//! check that partial work never becomes visible.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interviewer_sdk::types::{Archive, ArchiveContent, ChatEntry, ConversationKey, NewChatEntry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ArchiveStore, ConversationStore, Storage, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    chats: Vec<ChatEntry>,
    archives: Vec<Archive>,
    contents: Vec<ArchiveContent>,
    next_chat_id: i64,
    next_archive_id: i64,
}

impl MemoryState {
    fn conversation(&self, key: ConversationKey) -> Vec<ChatEntry> {
        self.chats.iter().filter(|c| c.key == key).cloned().collect()
    }

    fn archives_of(&self, key: ConversationKey) -> Vec<Archive> {
        self.archives
            .iter()
            .filter(|a| a.key == key)
            .cloned()
            .collect()
    }

    fn contents_of(&self, archive_id: i64) -> Vec<ArchiveContent> {
        let mut contents: Vec<ArchiveContent> = self
            .contents
            .iter()
            .filter(|c| c.archive_id == archive_id)
            .cloned()
            .collect();
        contents.sort_by_key(|c| c.position);
        contents
    }
}

/// Storage backed by process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
    /// Countdown to an injected failure; 0 disables injection
    fail_countdown: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th write from now (1-based) fail
    ///
    /// Writes are appends, deletes and archive creations.
    pub fn fail_on_write(&self, n: usize) {
        self.fail_countdown.store(n, Ordering::SeqCst);
    }

    /// Total number of committed live entries across all conversations
    pub async fn live_entry_total(&self) -> usize {
        self.state.lock().await.chats.len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            fail_countdown: Arc::clone(&self.fail_countdown),
        }))
    }

    async fn load_conversation(&self, key: ConversationKey) -> Result<Vec<ChatEntry>> {
        Ok(self.state.lock().await.conversation(key))
    }

    async fn list_archives(&self, key: ConversationKey) -> Result<Vec<Archive>> {
        Ok(self.state.lock().await.archives_of(key))
    }

    async fn load_archive_contents(&self, archive_id: i64) -> Result<Vec<ArchiveContent>> {
        Ok(self.state.lock().await.contents_of(archive_id))
    }
}

/// Unit of work over a private copy of the memory state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_countdown: Arc<AtomicUsize>,
}

impl MemoryUnitOfWork {
    fn check_injected_failure(&self) -> Result<()> {
        let previous = self
            .fail_countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);

        if previous == 1 {
            bail!("injected write failure");
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryUnitOfWork {
    async fn append(&mut self, entry: NewChatEntry) -> Result<ChatEntry> {
        self.check_injected_failure()?;

        self.working.next_chat_id += 1;
        let stored = ChatEntry {
            id: self.working.next_chat_id,
            key: entry.key,
            content: entry.content,
            created_at: entry.created_at,
        };
        self.working.chats.push(stored.clone());
        Ok(stored)
    }

    async fn find_ordered(&mut self, key: ConversationKey) -> Result<Vec<ChatEntry>> {
        Ok(self.working.conversation(key))
    }

    async fn delete_all(&mut self, key: ConversationKey) -> Result<u64> {
        self.check_injected_failure()?;

        let before = self.working.chats.len();
        self.working.chats.retain(|c| c.key != key);
        Ok((before - self.working.chats.len()) as u64)
    }
}

#[async_trait]
impl ArchiveStore for MemoryUnitOfWork {
    async fn create(
        &mut self,
        key: ConversationKey,
        archived_at: DateTime<Utc>,
        contents: &[ChatEntry],
    ) -> Result<Archive> {
        self.check_injected_failure()?;

        self.working.next_archive_id += 1;
        let archive = Archive {
            id: self.working.next_archive_id,
            key,
            archived_at,
        };
        self.working.archives.push(archive.clone());

        for (position, entry) in contents.iter().enumerate() {
            self.working.contents.push(ArchiveContent {
                archive_id: archive.id,
                position: position as u32,
                content: entry.content.clone(),
                created_at: entry.created_at,
            });
        }

        Ok(archive)
    }

    async fn find_by_subject_and_member(&mut self, key: ConversationKey) -> Result<Vec<Archive>> {
        Ok(self.working.archives_of(key))
    }

    async fn find_contents(&mut self, archive_id: i64) -> Result<Vec<ArchiveContent>> {
        Ok(self.working.contents_of(archive_id))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
