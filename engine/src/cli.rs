//! CLI interface for the interviewer
//!
//! Defines the commands and global flags with clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CS interview trainer
///
/// Asks a computer-science question per subject, scores each answer with a
/// language model and keeps the conversation until it is archived.
#[derive(Parser, Debug)]
#[command(name = "interviewer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage interview subjects
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Manage members
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// List subjects with a member's best live score
    MySubjects {
        /// Member ID
        #[arg(long)]
        member: i64,

        /// Only show one category (os, network, database, data-structure, algorithm)
        #[arg(long)]
        category: Option<String>,
    },

    /// Answer the current question of a subject
    Answer {
        /// Subject ID
        #[arg(long)]
        subject: i64,

        /// Member ID
        #[arg(long)]
        member: i64,

        /// The answer text
        text: String,
    },

    /// Show the live conversation
    Chats {
        /// Subject ID
        #[arg(long)]
        subject: i64,

        /// Member ID
        #[arg(long)]
        member: i64,
    },

    /// Archive the live conversation and start over
    Archive {
        /// Subject ID
        #[arg(long)]
        subject: i64,

        /// Member ID
        #[arg(long)]
        member: i64,
    },

    /// Show archived conversations
    Archives {
        /// Subject ID
        #[arg(long)]
        subject: i64,

        /// Member ID
        #[arg(long)]
        member: i64,
    },

    /// Show configuration and provider availability
    Status,
}

/// Subject management actions
#[derive(Subcommand, Debug)]
pub enum SubjectAction {
    /// Register a new subject
    Add {
        /// Subject title
        #[arg(long)]
        title: String,

        /// Category (os, network, database, data-structure, algorithm)
        #[arg(long)]
        category: String,

        /// The opening question
        question: String,
    },

    /// List subjects of a category
    List {
        /// Category (os, network, database, data-structure, algorithm)
        category: String,
    },

    /// Show one subject
    Show {
        /// Subject ID
        id: i64,
    },
}

/// Member management actions
#[derive(Subcommand, Debug)]
pub enum MemberAction {
    /// Register a new member
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Email address
        #[arg(long)]
        email: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["interviewer", "status"]);
        assert!(matches!(cli.command, Command::Status));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["interviewer", "--json", "--log", "debug", "status"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_answer_command() {
        let cli = Cli::parse_from([
            "interviewer",
            "answer",
            "--subject",
            "3",
            "--member",
            "9",
            "프로세스는 실행 중인 프로그램입니다",
        ]);
        if let Command::Answer {
            subject,
            member,
            text,
        } = cli.command
        {
            assert_eq!(subject, 3);
            assert_eq!(member, 9);
            assert_eq!(text, "프로세스는 실행 중인 프로그램입니다");
        } else {
            panic!("Expected Answer command");
        }
    }

    #[test]
    fn test_subject_add() {
        let cli = Cli::parse_from([
            "interviewer",
            "subject",
            "add",
            "--title",
            "TCP",
            "--category",
            "network",
            "TCP와 UDP의 차이는?",
        ]);
        if let Command::Subject {
            action:
                SubjectAction::Add {
                    title,
                    category,
                    question,
                },
        } = cli.command
        {
            assert_eq!(title, "TCP");
            assert_eq!(category, "network");
            assert_eq!(question, "TCP와 UDP의 차이는?");
        } else {
            panic!("Expected SubjectAction::Add");
        }
    }

    #[test]
    fn test_my_subjects_category_is_optional() {
        let cli = Cli::parse_from(["interviewer", "my-subjects", "--member", "1"]);
        assert!(matches!(
            cli.command,
            Command::MySubjects {
                member: 1,
                category: None
            }
        ));
    }

    #[test]
    fn test_answer_requires_pair() {
        let result = Cli::try_parse_from(["interviewer", "answer", "--subject", "1", "text"]);
        assert!(result.is_err());
    }
}
