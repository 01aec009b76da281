// Interviewer
// Main entry point for the interviewer binary

use clap::Parser;
use interviewer_engine::cli::{Cli, Command, MemberAction, SubjectAction};
use interviewer_engine::config::Config;
use interviewer_engine::handlers::{
    handle_answer, handle_archive, handle_archives, handle_chats, handle_member_add,
    handle_my_subjects, handle_status, handle_subject_add, handle_subject_list,
    handle_subject_show, OutputFormat,
};
use interviewer_engine::telemetry::init_telemetry_with_level;
use interviewer_sdk::errors::{EngineError, EngineErrorExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        match err.root_cause().downcast_ref::<EngineError>() {
            Some(engine_err) => {
                tracing::debug!("Command failed: {:#}", err);
                eprintln!(
                    "Error [{}]: {}",
                    engine_err.error_code(),
                    engine_err.user_hint()
                );
            }
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Load configuration (or use custom path if provided)
    let config = match &cli.config {
        Some(config_path) => Config::load_or_create_at(config_path)?,
        None => Config::load_or_create()?,
    };

    // --log overrides the configured level; RUST_LOG overrides both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("Interviewer v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Subject { action } => match action {
            SubjectAction::Add {
                title,
                category,
                question,
            } => handle_subject_add(title, category, question, &config, format).await,
            SubjectAction::List { category } => {
                handle_subject_list(category, &config, format).await
            }
            SubjectAction::Show { id } => handle_subject_show(id, &config, format).await,
        },

        Command::Member { action } => match action {
            MemberAction::Add { name, email } => {
                handle_member_add(name, email, &config, format).await
            }
        },

        Command::MySubjects { member, category } => {
            handle_my_subjects(member, category, &config, format).await
        }

        Command::Answer {
            subject,
            member,
            text,
        } => {
            tracing::info!(subject_id = subject, member_id = member, "Answering");
            handle_answer(subject, member, text, &config, format).await
        }

        Command::Chats { subject, member } => handle_chats(subject, member, &config, format).await,

        Command::Archive { subject, member } => {
            tracing::info!(subject_id = subject, member_id = member, "Archiving");
            handle_archive(subject, member, &config, format).await
        }

        Command::Archives { subject, member } => {
            handle_archives(subject, member, &config, format).await
        }

        Command::Status => handle_status(&config, format).await,
    }
}
