/// SQLite conversation and archive storage
///
/// Each unit of work is one sqlx transaction. SQLite admits a single writer,
/// so units also hold a writer gate for their whole lifetime; two units never
/// interleave, which keeps concurrent turns on different pairs from tripping
/// over `SQLITE_BUSY` on lock upgrade. Reads outside a unit go straight to
/// the pool and see committed data only.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interviewer_sdk::errors::EngineError;
use interviewer_sdk::types::{
    Archive, ArchiveContent, ChatContent, ChatEntry, ConversationKey, NewChatEntry,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::store::{ArchiveStore, ConversationStore, Storage, UnitOfWork};

/// Storage over the SQLite connection pool
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let gate = Arc::clone(&self.writer).lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        Ok(Box::new(SqliteUnitOfWork { tx, _gate: gate }))
    }

    async fn load_conversation(&self, key: ConversationKey) -> Result<Vec<ChatEntry>> {
        select_conversation(&self.pool, key).await
    }

    async fn list_archives(&self, key: ConversationKey) -> Result<Vec<Archive>> {
        select_archives(&self.pool, key).await
    }

    async fn load_archive_contents(&self, archive_id: i64) -> Result<Vec<ArchiveContent>> {
        select_archive_contents(&self.pool, archive_id).await
    }
}

/// One transaction plus the writer gate
///
/// Dropping it without `commit` rolls the transaction back.
pub struct SqliteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

#[async_trait]
impl ConversationStore for SqliteUnitOfWork {
    async fn append(&mut self, entry: NewChatEntry) -> Result<ChatEntry> {
        let score = entry.content.score().map(|s| i64::from(s.value()));

        let result = sqlx::query(
            "INSERT INTO chats (subject_id, member_id, kind, message, score, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.key.subject_id)
        .bind(entry.key.member_id)
        .bind(entry.content.kind().as_str())
        .bind(entry.content.message())
        .bind(score)
        .bind(entry.created_at.timestamp_millis())
        .execute(&mut *self.tx)
        .await
        .context("Failed to append chat entry")?;

        Ok(ChatEntry {
            id: result.last_insert_rowid(),
            key: entry.key,
            content: entry.content,
            created_at: entry.created_at,
        })
    }

    async fn find_ordered(&mut self, key: ConversationKey) -> Result<Vec<ChatEntry>> {
        select_conversation(&mut *self.tx, key).await
    }

    async fn delete_all(&mut self, key: ConversationKey) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chats WHERE subject_id = ? AND member_id = ?")
            .bind(key.subject_id)
            .bind(key.member_id)
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete chat entries")?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ArchiveStore for SqliteUnitOfWork {
    async fn create(
        &mut self,
        key: ConversationKey,
        archived_at: DateTime<Utc>,
        contents: &[ChatEntry],
    ) -> Result<Archive> {
        let result = sqlx::query(
            "INSERT INTO chat_archives (subject_id, member_id, archived_at) VALUES (?, ?, ?)",
        )
        .bind(key.subject_id)
        .bind(key.member_id)
        .bind(archived_at.timestamp_millis())
        .execute(&mut *self.tx)
        .await
        .context("Failed to create archive")?;

        let archive_id = result.last_insert_rowid();

        for (position, entry) in contents.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chat_archive_contents (archive_id, position, kind, message, score, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(archive_id)
            .bind(position as i64)
            .bind(entry.content.kind().as_str())
            .bind(entry.content.message())
            .bind(entry.content.score().map(|s| i64::from(s.value())))
            .bind(entry.created_at.timestamp_millis())
            .execute(&mut *self.tx)
            .await
            .context("Failed to copy chat entry into archive")?;
        }

        debug!(archive_id, entries = contents.len(), "archive rows written");

        Ok(Archive {
            id: archive_id,
            key,
            archived_at,
        })
    }

    async fn find_by_subject_and_member(&mut self, key: ConversationKey) -> Result<Vec<Archive>> {
        select_archives(&mut *self.tx, key).await
    }

    async fn find_contents(&mut self, archive_id: i64) -> Result<Vec<ArchiveContent>> {
        select_archive_contents(&mut *self.tx, archive_id).await
    }
}

#[async_trait]
impl UnitOfWork for SqliteUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let SqliteUnitOfWork { tx, _gate } = *self;
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let SqliteUnitOfWork { tx, _gate } = *self;
        tx.rollback().await.context("Failed to roll back transaction")?;
        Ok(())
    }
}

async fn select_conversation<'e, E>(executor: E, key: ConversationKey) -> Result<Vec<ChatEntry>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, subject_id, member_id, kind, message, score, created_at FROM chats WHERE subject_id = ? AND member_id = ? ORDER BY id ASC",
    )
    .bind(key.subject_id)
    .bind(key.member_id)
    .fetch_all(executor)
    .await
    .context("Failed to fetch conversation")?;

    rows.iter().map(chat_from_row).collect()
}

async fn select_archives<'e, E>(executor: E, key: ConversationKey) -> Result<Vec<Archive>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT id, subject_id, member_id, archived_at FROM chat_archives WHERE subject_id = ? AND member_id = ? ORDER BY id ASC",
    )
    .bind(key.subject_id)
    .bind(key.member_id)
    .fetch_all(executor)
    .await
    .context("Failed to fetch archives")?;

    rows.iter()
        .map(|row| -> Result<Archive> {
            Ok(Archive {
                id: row.get("id"),
                key: ConversationKey::new(row.get("subject_id"), row.get("member_id")),
                archived_at: timestamp(row.get("archived_at"))?,
            })
        })
        .collect()
}

async fn select_archive_contents<'e, E>(executor: E, archive_id: i64) -> Result<Vec<ArchiveContent>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT archive_id, position, kind, message, score, created_at FROM chat_archive_contents WHERE archive_id = ? ORDER BY position ASC",
    )
    .bind(archive_id)
    .fetch_all(executor)
    .await
    .context("Failed to fetch archive contents")?;

    rows.iter()
        .map(|row| -> Result<ArchiveContent> {
            let position: i64 = row.get("position");
            Ok(ArchiveContent {
                archive_id: row.get("archive_id"),
                position: u32::try_from(position).map_err(|_| {
                    EngineError::CorruptEntry(format!("archive position {}", position))
                })?,
                content: content_from_row(row)?,
                created_at: timestamp(row.get("created_at"))?,
            })
        })
        .collect()
}

fn chat_from_row(row: &SqliteRow) -> Result<ChatEntry> {
    Ok(ChatEntry {
        id: row.get("id"),
        key: ConversationKey::new(row.get("subject_id"), row.get("member_id")),
        content: content_from_row(row)?,
        created_at: timestamp(row.get("created_at"))?,
    })
}

fn content_from_row(row: &SqliteRow) -> Result<ChatContent> {
    let kind: String = row.get("kind");
    Ok(ChatContent::from_parts(
        &kind,
        row.get("message"),
        row.get("score"),
    )?)
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| EngineError::CorruptEntry(format!("timestamp {}", millis)).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use interviewer_sdk::types::{now_millis, LoginType, Score, SubjectCategory};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, ConversationKey) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();

        let subject = db
            .directory()
            .add_subject("os", "What is a process?", SubjectCategory::Os)
            .await
            .unwrap();
        let member = db
            .directory()
            .add_member("Kim", "kim@example.com", LoginType::Google)
            .await
            .unwrap();

        (temp_dir, db, ConversationKey::new(subject.id, member.id))
    }

    #[tokio::test]
    async fn test_append_and_load_in_order() {
        let (_dir, db, key) = setup().await;
        let storage = db.storage();

        let mut unit = storage.begin().await.unwrap();
        unit.append(NewChatEntry::new(key, ChatContent::question("Q0")))
            .await
            .unwrap();
        unit.append(NewChatEntry::new(
            key,
            ChatContent::answer("A1", Score::clamped(30)),
        ))
        .await
        .unwrap();
        unit.commit().await.unwrap();

        let entries = storage.load_conversation(key).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].content, ChatContent::question("Q0"));
        assert_eq!(entries[1].content.score(), Some(Score::clamped(30)));
    }

    #[tokio::test]
    async fn test_uncommitted_unit_is_rolled_back_on_drop() {
        let (_dir, db, key) = setup().await;
        let storage = db.storage();

        {
            let mut unit = storage.begin().await.unwrap();
            unit.append(NewChatEntry::new(key, ChatContent::question("Q0")))
                .await
                .unwrap();
        }

        assert!(storage.load_conversation(key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_surfaces_on_read() {
        let (_dir, db, key) = setup().await;

        // Bypass the CHECK constraint to simulate a row written by a foreign tool
        let mut conn = db.pool().acquire().await.unwrap();
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO chats (subject_id, member_id, kind, message, score, created_at) VALUES (?, ?, 'hint', 'x', NULL, 0)",
        )
        .bind(key.subject_id)
        .bind(key.member_id)
        .execute(&mut *conn)
        .await
        .unwrap();
        drop(conn);

        let err = db.storage().load_conversation(key).await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<EngineError>(),
            Some(EngineError::UnknownChatType(kind)) if kind == "hint"
        ));
    }

    #[tokio::test]
    async fn test_unit_reads_back_its_own_archive() {
        let (_dir, db, key) = setup().await;
        let storage = db.storage();

        let mut unit = storage.begin().await.unwrap();
        let q0 = unit
            .append(NewChatEntry::new(key, ChatContent::question("Q0")))
            .await
            .unwrap();
        let a1 = unit
            .append(NewChatEntry::new(
                key,
                ChatContent::answer("A1", Score::clamped(70)),
            ))
            .await
            .unwrap();
        let q2 = unit
            .append(NewChatEntry::new(key, ChatContent::question("Q2")))
            .await
            .unwrap();
        let archive = unit
            .create(key, now_millis(), &[q0.clone(), a1.clone(), q2.clone()])
            .await
            .unwrap();

        // Visible inside the unit before commit, hidden from the pool
        let found = unit.find_by_subject_and_member(key).await.unwrap();
        assert_eq!(found, vec![archive.clone()]);
        assert!(storage.list_archives(key).await.unwrap().is_empty());

        let contents = unit.find_contents(archive.id).await.unwrap();
        let positions: Vec<u32> = contents.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(contents[0].content, q0.content);
        assert_eq!(contents[1].content, a1.content);
        assert_eq!(contents[2].content, q2.content);

        let other = ConversationKey::new(key.subject_id, key.member_id + 1);
        assert!(unit.find_by_subject_and_member(other).await.unwrap().is_empty());
        assert!(unit.find_contents(archive.id + 1).await.unwrap().is_empty());

        unit.commit().await.unwrap();
        assert_eq!(storage.list_archives(key).await.unwrap(), vec![archive]);
    }

    #[tokio::test]
    async fn test_archive_timestamps_survive_round_trip() {
        let (_dir, db, key) = setup().await;
        let storage = db.storage();

        let mut unit = storage.begin().await.unwrap();
        let q0 = unit
            .append(NewChatEntry::new(key, ChatContent::question("Q0")))
            .await
            .unwrap();
        let archived_at = now_millis();
        let archive = unit.create(key, archived_at, &[q0.clone()]).await.unwrap();
        unit.commit().await.unwrap();

        let archives = storage.list_archives(key).await.unwrap();
        assert_eq!(archives, vec![archive.clone()]);

        let contents = storage.load_archive_contents(archive.id).await.unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].created_at, q0.created_at);
        assert_eq!(contents[0].content, q0.content);
    }
}
