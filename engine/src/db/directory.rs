/// Subject and member directory
///
/// Subjects and members are referenced by conversations but not owned by them.
/// Lookups by id raise `SubjectNotFound` / `MemberNotFound` so callers can
/// propagate the error unchanged.
use anyhow::{Context, Result};
use interviewer_sdk::errors::EngineError;
use interviewer_sdk::types::{now_millis, LoginType, Member, Score, Subject, SubjectCategory};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

/// A subject as seen by one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSubject {
    pub id: i64,
    pub title: String,
    pub category: SubjectCategory,
    /// Best score among the member's live answers, if any
    pub max_score: Option<Score>,
}

/// Directory repository for database operations
pub struct DirectoryRepository {
    pool: SqlitePool,
}

impl DirectoryRepository {
    /// Create a new directory repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new subject
    pub async fn add_subject(
        &self,
        title: &str,
        question: &str,
        category: SubjectCategory,
    ) -> Result<Subject> {
        let now = now_millis().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO subjects (title, question, category, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(title)
        .bind(question)
        .bind(category.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert subject")?;

        Ok(Subject {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            question: question.to_string(),
            category,
        })
    }

    /// Get a subject by ID
    pub async fn subject(&self, id: i64) -> Result<Subject> {
        let row = sqlx::query("SELECT id, title, question, category FROM subjects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch subject")?;

        match row {
            Some(row) => subject_from_row(&row),
            None => Err(EngineError::SubjectNotFound(id).into()),
        }
    }

    /// List subjects of one category ordered by id
    pub async fn subjects_by_category(&self, category: SubjectCategory) -> Result<Vec<Subject>> {
        let rows = sqlx::query(
            "SELECT id, title, question, category FROM subjects WHERE category = ? ORDER BY id",
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subjects")?;

        rows.iter().map(subject_from_row).collect()
    }

    /// Register a new member
    pub async fn add_member(&self, name: &str, email: &str, login_type: LoginType) -> Result<Member> {
        let now = now_millis().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO members (name, email, login_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(login_type.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to insert member")?;

        Ok(Member {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            login_type,
        })
    }

    /// Get a member by ID
    pub async fn member(&self, id: i64) -> Result<Member> {
        let row = sqlx::query("SELECT id, name, email, login_type FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch member")?;

        match row {
            Some(row) => member_from_row(&row),
            None => Err(EngineError::MemberNotFound(id).into()),
        }
    }

    /// Find a member by email
    pub async fn member_by_email(&self, email: &str) -> Result<Option<Member>> {
        let row = sqlx::query("SELECT id, name, email, login_type FROM members WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch member by email")?;

        row.as_ref().map(member_from_row).transpose()
    }

    /// Subjects with the member's best live score, optionally filtered by category
    ///
    /// Only the live log counts: once a conversation is archived its best score
    /// is gone until the member answers again.
    pub async fn member_subjects(
        &self,
        member_id: i64,
        category: Option<SubjectCategory>,
    ) -> Result<Vec<MemberSubject>> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.category, MAX(c.score) AS max_score
             FROM subjects s
             LEFT JOIN chats c ON c.subject_id = s.id AND c.member_id = ?
             WHERE (? IS NULL OR s.category = ?)
             GROUP BY s.id
             ORDER BY s.id ASC",
        )
        .bind(member_id)
        .bind(category.map(|c| c.as_str()))
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list member subjects")?;

        rows.iter()
            .map(|row| -> Result<MemberSubject> {
                let category: String = row.get("category");
                let max_score: Option<i64> = row.get("max_score");
                Ok(MemberSubject {
                    id: row.get("id"),
                    title: row.get("title"),
                    category: category.parse()?,
                    max_score: max_score.map(Score::try_from).transpose()?,
                })
            })
            .collect()
    }
}

fn subject_from_row(row: &SqliteRow) -> Result<Subject> {
    let category: String = row.get("category");
    Ok(Subject {
        id: row.get("id"),
        title: row.get("title"),
        question: row.get("question"),
        category: category.parse()?,
    })
}

fn member_from_row(row: &SqliteRow) -> Result<Member> {
    let login_type: String = row.get("login_type");
    Ok(Member {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        login_type: login_type.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_add_and_get_subject() {
        let (_dir, db) = setup().await;
        let repo = db.directory();

        let created = repo
            .add_subject("프로세스", "프로세스와 스레드의 차이는?", SubjectCategory::Os)
            .await
            .unwrap();
        let fetched = repo.subject(created.id).await.unwrap();

        assert_eq!(created, fetched);
    }

    #[tokio::test]
    async fn test_missing_subject_is_not_found() {
        let (_dir, db) = setup().await;

        let err = db.directory().subject(42).await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<EngineError>(),
            Some(EngineError::SubjectNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_missing_member_is_not_found() {
        let (_dir, db) = setup().await;

        let err = db.directory().member(7).await.unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<EngineError>(),
            Some(EngineError::MemberNotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_subjects_by_category() {
        let (_dir, db) = setup().await;
        let repo = db.directory();

        repo.add_subject("os", "q1", SubjectCategory::Os).await.unwrap();
        repo.add_subject("net", "q2", SubjectCategory::Network)
            .await
            .unwrap();
        repo.add_subject("os2", "q3", SubjectCategory::Os).await.unwrap();

        let os = repo.subjects_by_category(SubjectCategory::Os).await.unwrap();
        assert_eq!(os.len(), 2);
        assert!(os.iter().all(|s| s.category == SubjectCategory::Os));
        assert!(os[0].id < os[1].id);
    }

    #[tokio::test]
    async fn test_duplicate_subject_is_rejected() {
        let (_dir, db) = setup().await;
        let repo = db.directory();

        repo.add_subject("TCP", "TCP란?", SubjectCategory::Network)
            .await
            .unwrap();
        assert!(repo
            .add_subject("TCP", "TCP란?", SubjectCategory::Network)
            .await
            .is_err());

        // Same title with another question is a different subject
        repo.add_subject("TCP", "3-way handshake란?", SubjectCategory::Network)
            .await
            .unwrap();

        let network = repo
            .subjects_by_category(SubjectCategory::Network)
            .await
            .unwrap();
        assert_eq!(network.len(), 2);
    }

    #[tokio::test]
    async fn test_member_by_email() {
        let (_dir, db) = setup().await;
        let repo = db.directory();

        let member = repo
            .add_member("Kim", "kim@example.com", LoginType::Google)
            .await
            .unwrap();

        assert_eq!(
            repo.member_by_email("kim@example.com").await.unwrap(),
            Some(member)
        );
        assert_eq!(repo.member_by_email("nobody@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_member_subjects_without_answers() {
        let (_dir, db) = setup().await;
        let repo = db.directory();

        let member = repo
            .add_member("Kim", "kim@example.com", LoginType::Google)
            .await
            .unwrap();
        repo.add_subject("os", "q1", SubjectCategory::Os).await.unwrap();
        repo.add_subject("net", "q2", SubjectCategory::Network)
            .await
            .unwrap();

        let all = repo.member_subjects(member.id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|s| s.max_score.is_none()));

        let net = repo
            .member_subjects(member.id, Some(SubjectCategory::Network))
            .await
            .unwrap();
        assert_eq!(net.len(), 1);
        assert_eq!(net[0].title, "net");
    }
}
