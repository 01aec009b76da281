//! Command handlers for CLI operations
//!
//! Each handler opens the database, resolves the subject and member it needs
//! through the directory, calls the interview core and prints the result as
//! text or pretty JSON.

use anyhow::{Context, Result};
use interviewer_sdk::types::{
    ArchiveContent, ChatContent, ChatEntry, ConversationKey, LoginType, Member, Subject,
    SubjectCategory, MAX_ANSWER_COUNT,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::Database;
use crate::interview::ConversationService;
use crate::llm::ollama::OllamaProvider;
use crate::llm::openai::OpenAIProvider;
use crate::llm::router::LLMRouter;
use crate::llm::LLMProvider;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Build the provider router from configuration
///
/// Ollama is always registered. OpenAI is registered when it is the default
/// provider or its API key variable is set. Per-attempt timeouts are fitted
/// inside the turn deadline so failover can finish before the turn gives up.
pub fn build_router(config: &Config) -> LLMRouter {
    let mut providers: Vec<Box<dyn LLMProvider>> =
        vec![Box::new(OllamaProvider::from_config(&config.llm.ollama))];

    let openai_key_present = std::env::var(&config.llm.openai.api_key_env)
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    if openai_key_present || config.llm.default_provider == "openai" {
        providers.push(Box::new(OpenAIProvider::new(config.llm.openai.clone())));
    }

    debug!("Registered {} LLM provider(s)", providers.len());
    LLMRouter::new(providers, Arc::new(config.llm.clone()))
        .within_deadline(config.interview.completion_timeout())
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

fn conversation_service(database: &Database, config: &Config) -> ConversationService {
    ConversationService::new(
        Arc::new(database.storage()),
        Arc::new(build_router(config)),
        config.interview.completion_timeout(),
    )
}

async fn resolve_pair(
    database: &Database,
    subject_id: i64,
    member_id: i64,
) -> Result<(Subject, Member)> {
    let directory = database.directory();
    let subject = directory.subject(subject_id).await?;
    let member = directory.member(member_id).await?;
    Ok((subject, member))
}

fn format_time(time: &chrono::DateTime<chrono::Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_content(content: &ChatContent) {
    match content {
        ChatContent::Question { message } => {
            println!("[Q] {}", message);
        }
        ChatContent::Answer { message, score } => {
            println!("[A] {} ({}점)", message, score.value());
        }
    }
}

fn print_entries(entries: &[ChatEntry]) {
    for entry in entries {
        print_content(&entry.content);
        println!("    {}", format_time(&entry.created_at));
    }
}

fn print_archive_contents(contents: &[ArchiveContent]) {
    for content in contents {
        print!("  {:>2}. ", content.position);
        print_content(&content.content);
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Register a new subject
pub async fn handle_subject_add(
    title: String,
    category: String,
    question: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let category: SubjectCategory = category.parse()?;
    let database = open_database(config).await?;

    let subject = database
        .directory()
        .add_subject(&title, &question, category)
        .await?;
    info!(subject_id = subject.id, "Subject registered");

    match format {
        OutputFormat::Text => {
            println!(
                "Subject {} registered: {} [{}]",
                subject.id,
                subject.title,
                subject.category.as_str()
            );
        }
        OutputFormat::Json => print_json(&json!({ "subject": subject }))?,
    }

    Ok(())
}

/// List subjects of one category
pub async fn handle_subject_list(
    category: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let category: SubjectCategory = category.parse()?;
    let database = open_database(config).await?;

    let subjects = database.directory().subjects_by_category(category).await?;

    match format {
        OutputFormat::Text => {
            if subjects.is_empty() {
                println!("No subjects in {}", category.as_str());
                return Ok(());
            }

            println!("Subjects in {}:", category.as_str());
            for subject in &subjects {
                println!("  {:>4}  {}", subject.id, subject.title);
            }
        }
        OutputFormat::Json => print_json(&json!({
            "category": category,
            "subjects": subjects,
            "count": subjects.len()
        }))?,
    }

    Ok(())
}

/// Show one subject with its opening question
pub async fn handle_subject_show(id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let subject = database.directory().subject(id).await?;

    match format {
        OutputFormat::Text => {
            println!("Subject {}: {}", subject.id, subject.title);
            println!("  Category: {}", subject.category.as_str());
            println!("  Question: {}", subject.question);
        }
        OutputFormat::Json => print_json(&json!({ "subject": subject }))?,
    }

    Ok(())
}

/// Register a new member
pub async fn handle_member_add(
    name: String,
    email: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let directory = database.directory();

    let member = match directory.member_by_email(&email).await? {
        Some(existing) => {
            debug!(member_id = existing.id, "Member already registered");
            existing
        }
        None => directory.add_member(&name, &email, LoginType::Google).await?,
    };

    match format {
        OutputFormat::Text => {
            println!("Member {}: {} <{}>", member.id, member.name, member.email);
        }
        OutputFormat::Json => print_json(&json!({ "member": member }))?,
    }

    Ok(())
}

/// List subjects with the member's best live score
pub async fn handle_my_subjects(
    member_id: i64,
    category: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let category = category
        .map(|c| c.parse::<SubjectCategory>())
        .transpose()?;
    let database = open_database(config).await?;
    let directory = database.directory();

    directory.member(member_id).await?;
    let subjects = directory.member_subjects(member_id, category).await?;

    match format {
        OutputFormat::Text => {
            if subjects.is_empty() {
                println!("No subjects");
                return Ok(());
            }

            for subject in &subjects {
                let best = subject
                    .max_score
                    .map(|s| format!("{}점", s.value()))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {:>4}  {:<16} {:>5}  {}",
                    subject.id,
                    subject.category.as_str(),
                    best,
                    subject.title
                );
            }
        }
        OutputFormat::Json => print_json(&json!({
            "member_id": member_id,
            "subjects": subjects,
            "count": subjects.len()
        }))?,
    }

    Ok(())
}

/// Answer the current question and print the interviewer's reply
pub async fn handle_answer(
    subject_id: i64,
    member_id: i64,
    text: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let (subject, member) = resolve_pair(&database, subject_id, member_id).await?;
    let service = conversation_service(&database, config);

    let outcome = service.answer(&subject, &member, &text).await?;

    match format {
        OutputFormat::Text => {
            if let Some(score) = outcome.entries.answer.content.score() {
                println!("Score: {}점", score.value());
            }
            if !outcome.score_recovered {
                println!("(the reply had no score line; recorded as 0)");
            }
            println!();
            println!("{}", outcome.entries.next_question.content.message());
            println!();
            println!(
                "Answers used: {}/{} (via {})",
                outcome.answer_count, MAX_ANSWER_COUNT, outcome.provider
            );
        }
        OutputFormat::Json => print_json(&json!({ "turn": outcome }))?,
    }

    Ok(())
}

/// Show the live conversation of a pair
pub async fn handle_chats(
    subject_id: i64,
    member_id: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let (subject, member) = resolve_pair(&database, subject_id, member_id).await?;
    let service = conversation_service(&database, config);

    let entries = service
        .conversation(ConversationKey::new(subject.id, member.id))
        .await?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No conversation yet. First question:");
                println!("[Q] {}", subject.question);
                return Ok(());
            }

            println!("{} ({} entries)", subject.title, entries.len());
            println!();
            print_entries(&entries);
        }
        OutputFormat::Json => print_json(&json!({
            "subject_id": subject.id,
            "member_id": member.id,
            "chats": entries,
            "count": entries.len()
        }))?,
    }

    Ok(())
}

/// Archive the live conversation of a pair
pub async fn handle_archive(
    subject_id: i64,
    member_id: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let (subject, member) = resolve_pair(&database, subject_id, member_id).await?;
    let service = conversation_service(&database, config);

    let archive = service.archive(&subject, &member).await?;

    match format {
        OutputFormat::Text => match &archive {
            Some(archive) => println!(
                "Conversation archived as #{} at {}",
                archive.id,
                format_time(&archive.archived_at)
            ),
            None => println!("Nothing to archive"),
        },
        OutputFormat::Json => print_json(&json!({ "archive": archive }))?,
    }

    Ok(())
}

/// Show archived conversations of a pair
pub async fn handle_archives(
    subject_id: i64,
    member_id: i64,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let (subject, member) = resolve_pair(&database, subject_id, member_id).await?;
    let service = conversation_service(&database, config);

    let archives = service
        .archives(ConversationKey::new(subject.id, member.id))
        .await?;

    match format {
        OutputFormat::Text => {
            if archives.is_empty() {
                println!("No archives");
                return Ok(());
            }

            for entry in &archives {
                println!(
                    "Archive #{} ({})",
                    entry.archive.id,
                    format_time(&entry.archive.archived_at)
                );
                print_archive_contents(&entry.contents);
                println!();
            }
        }
        OutputFormat::Json => print_json(&json!({
            "archives": archives,
            "count": archives.len()
        }))?,
    }

    Ok(())
}

/// Show configuration and provider health
pub async fn handle_status(config: &Config, format: OutputFormat) -> Result<()> {
    let router = build_router(config);
    let health = router.check_health().await;
    let db_path = config.database_path();

    match format {
        OutputFormat::Text => {
            println!("Data directory:   {}", config.core.data_dir.display());
            println!(
                "Database:         {} ({})",
                db_path.display(),
                if db_path.exists() {
                    "exists"
                } else {
                    "not initialized"
                }
            );
            println!("Default provider: {}", config.llm.default_provider);
            println!(
                "Timeout:          {}s",
                config.interview.completion_timeout_secs
            );
            println!("Providers:");
            for (name, healthy) in &health {
                println!(
                    "  {:<10} {}",
                    name,
                    if *healthy { "available" } else { "unavailable" }
                );
            }
        }
        OutputFormat::Json => {
            let providers: Vec<_> = health
                .iter()
                .map(|(name, healthy)| json!({ "name": name, "available": healthy }))
                .collect();
            print_json(&json!({
                "data_dir": config.core.data_dir,
                "database": db_path,
                "database_exists": db_path.exists(),
                "default_provider": config.llm.default_provider,
                "completion_timeout_secs": config.interview.completion_timeout_secs,
                "providers": providers
            }))?;
        }
    }

    Ok(())
}
