//! Integration tests for interview turns
//!
//! Runs the conversation service against SQLite and a mock Ollama server.

use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use interviewer_engine::config::LLMConfig;
use interviewer_engine::db::Database;
use interviewer_engine::interview::prompt::ROLE_GRANT_MESSAGE;
use interviewer_engine::interview::ConversationService;
use interviewer_engine::llm::{ollama::OllamaProvider, router::LLMRouter, LLMProvider};
use interviewer_sdk::errors::EngineError;
use interviewer_sdk::types::{
    ChatKind, ConversationKey, LoginType, Member, Score, Subject, SubjectCategory,
};

const REPLY: &str = "답변에 대한 점수: 30점\n\
이유: 스케줄링에 대한 설명은 부족합니다.\n\
공부할 수 있는 키워드: PCB / 문맥 교환\n\
꼬리 질문: 문맥 교환에 대해 더 깊게 설명해보세요.";

struct Harness {
    _dir: TempDir,
    db: Database,
    server: MockServer,
    subject: Subject,
    member: Member,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("interviewer.db"))
            .await
            .unwrap();
        let subject = db
            .directory()
            .add_subject("프로세스", "프로세스란 무엇인가요?", SubjectCategory::Os)
            .await
            .unwrap();
        let member = db
            .directory()
            .add_member("Kim", "kim@example.com", LoginType::Google)
            .await
            .unwrap();

        Self {
            _dir: dir,
            db,
            server: MockServer::start().await,
            subject,
            member,
        }
    }

    fn service(&self, timeout: Duration) -> ConversationService {
        let provider = Box::new(OllamaProvider::new(self.server.uri(), "llama3.1:8b"))
            as Box<dyn LLMProvider>;
        let router = LLMRouter::new(vec![provider], Arc::new(LLMConfig::default()));
        ConversationService::new(Arc::new(self.db.storage()), Arc::new(router), timeout)
    }

    fn key(&self) -> ConversationKey {
        ConversationKey::new(self.subject.id, self.member.id)
    }

    async fn reply_with(&self, content: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ollama_body(content)))
            .mount(&self.server)
            .await;
    }

    /// Roles of every message in each chat request, in arrival order
    async fn request_roles(&self) -> Vec<Vec<String>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| {
                let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
                body["messages"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|m| m["role"].as_str().unwrap().to_string())
                    .collect()
            })
            .collect()
    }
}

fn ollama_body(content: &str) -> serde_json::Value {
    json!({
        "model": "llama3.1:8b",
        "created_at": "2024-01-01T00:00:00Z",
        "message": { "role": "assistant", "content": content },
        "done": true
    })
}

fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.root_cause().downcast_ref::<EngineError>()
}

#[tokio::test]
async fn test_first_answer_bootstraps_conversation() {
    let h = Harness::new().await;
    h.reply_with(REPLY).await;
    let service = h.service(Duration::from_secs(10));

    let outcome = service
        .answer(&h.subject, &h.member, "I don't know")
        .await
        .unwrap();

    assert_eq!(outcome.answer_count, 1);
    assert!(outcome.score_recovered);
    assert_eq!(outcome.provider, "ollama");

    let log = service.conversation(h.key()).await.unwrap();
    let kinds: Vec<_> = log.iter().map(|e| e.content.kind()).collect();
    assert_eq!(
        kinds,
        vec![ChatKind::Question, ChatKind::Answer, ChatKind::Question]
    );
    assert_eq!(log[0].content.message(), "프로세스란 무엇인가요?");
    assert_eq!(log[1].content.message(), "I don't know");
    assert_eq!(log[1].content.score(), Some(Score::clamped(30)));
    assert_eq!(log[2].content.message(), REPLY);

    let requests = h.server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["content"], ROLE_GRANT_MESSAGE);
    assert!(messages[1]["content"]
        .as_str()
        .unwrap()
        .ends_with("질문: 프로세스란 무엇인가요?"));
    assert_eq!(messages[2]["content"], "I don't know");
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_history_is_replayed_in_order() {
    let h = Harness::new().await;
    h.reply_with(REPLY).await;
    let service = h.service(Duration::from_secs(10));

    service.answer(&h.subject, &h.member, "A1").await.unwrap();
    let outcome = service.answer(&h.subject, &h.member, "A2").await.unwrap();

    assert_eq!(outcome.answer_count, 2);
    assert!(outcome.entries.bootstrap.is_none());
    assert_eq!(service.conversation(h.key()).await.unwrap().len(), 5);

    let roles = h.request_roles().await;
    assert_eq!(roles.len(), 2);
    assert_eq!(roles[0], vec!["user", "assistant", "user"]);
    assert_eq!(
        roles[1],
        vec!["user", "assistant", "user", "assistant", "user"]
    );
}

#[tokio::test]
async fn test_eleventh_answer_is_rejected_without_completion() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ollama_body(REPLY)))
        .expect(10)
        .mount(&h.server)
        .await;
    let service = h.service(Duration::from_secs(10));

    for turn in 1..=10 {
        let outcome = service
            .answer(&h.subject, &h.member, &format!("A{}", turn))
            .await
            .unwrap();
        assert_eq!(outcome.answer_count, turn);
    }
    assert_eq!(service.conversation(h.key()).await.unwrap().len(), 21);

    let err = service
        .answer(&h.subject, &h.member, "one more")
        .await
        .unwrap_err();

    assert!(matches!(
        engine_error(&err),
        Some(EngineError::AllAnswersUsed { limit: 10 })
    ));
    assert_eq!(service.conversation(h.key()).await.unwrap().len(), 21);
}

#[tokio::test]
async fn test_archive_then_continue_starts_fresh() {
    let h = Harness::new().await;
    h.reply_with(REPLY).await;
    let service = h.service(Duration::from_secs(10));

    service.answer(&h.subject, &h.member, "A1").await.unwrap();
    service.answer(&h.subject, &h.member, "A2").await.unwrap();
    let before = service.conversation(h.key()).await.unwrap();

    let archive = service
        .archive(&h.subject, &h.member)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(archive.key, h.key());
    assert!(service.conversation(h.key()).await.unwrap().is_empty());

    let outcome = service
        .answer(&h.subject, &h.member, "A1 again")
        .await
        .unwrap();
    assert!(outcome.entries.bootstrap.is_some());
    assert_eq!(outcome.answer_count, 1);

    let roles = h.request_roles().await;
    assert_eq!(roles.last().unwrap().len(), 3);

    let archives = service.archives(h.key()).await.unwrap();
    assert_eq!(archives.len(), 1);
    let archived: Vec<_> = archives[0]
        .contents
        .iter()
        .map(|c| c.content.clone())
        .collect();
    let original: Vec<_> = before.iter().map(|e| e.content.clone()).collect();
    assert_eq!(archived, original);
}

#[tokio::test]
async fn test_provider_failure_writes_nothing() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    let service = h.service(Duration::from_secs(10));

    let err = service
        .answer(&h.subject, &h.member, "A1")
        .await
        .unwrap_err();

    assert!(matches!(
        engine_error(&err),
        Some(EngineError::LLMProvider(_))
    ));
    assert!(service.conversation(h.key()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_completion_times_out_and_writes_nothing() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ollama_body(REPLY))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;
    let service = h.service(Duration::from_millis(200));

    let err = service
        .answer(&h.subject, &h.member, "A1")
        .await
        .unwrap_err();

    assert!(matches!(engine_error(&err), Some(EngineError::LLMTimeout)));
    assert!(service.conversation(h.key()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_without_score_records_zero() {
    let h = Harness::new().await;
    h.reply_with("꼬리 질문: 스레드와 비교해보세요.").await;
    let service = h.service(Duration::from_secs(10));

    let outcome = service.answer(&h.subject, &h.member, "A1").await.unwrap();

    assert!(!outcome.score_recovered);
    let log = service.conversation(h.key()).await.unwrap();
    assert_eq!(log[1].content.score(), Some(Score::ZERO));
}

#[tokio::test]
async fn test_concurrent_answers_on_same_pair_serialize() {
    let h = Harness::new().await;
    h.reply_with(REPLY).await;
    let service = h.service(Duration::from_secs(10));

    let results = join_all((0..4).map(|i| {
        let service = &service;
        let subject = &h.subject;
        let member = &h.member;
        async move { service.answer(subject, member, &format!("A{}", i)).await }
    }))
    .await;

    assert!(results.iter().all(|r| r.is_ok()));

    let log = service.conversation(h.key()).await.unwrap();
    assert_eq!(log.len(), 9);
    for (i, entry) in log.iter().enumerate() {
        let expected = if i % 2 == 0 {
            ChatKind::Question
        } else {
            ChatKind::Answer
        };
        assert_eq!(entry.content.kind(), expected, "entry {} out of order", i);
    }
    let mut counts: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().answer_count)
        .collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_concurrent_pairs_do_not_interfere() {
    let h = Harness::new().await;
    h.reply_with(REPLY).await;
    let service = h.service(Duration::from_secs(10));

    let mut members = vec![h.member.clone()];
    for i in 0..3 {
        members.push(
            h.db.directory()
                .add_member("Lee", &format!("lee{}@example.com", i), LoginType::Google)
                .await
                .unwrap(),
        );
    }

    let results = join_all(
        members
            .iter()
            .map(|member| service.answer(&h.subject, member, "동시 답변")),
    )
    .await;
    assert!(results.iter().all(|r| r.is_ok()));

    for member in &members {
        let log = service
            .conversation(ConversationKey::new(h.subject.id, member.id))
            .await
            .unwrap();
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|e| e.key.member_id == member.id));
    }
}
