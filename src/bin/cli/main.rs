mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use emt_study_lib::flashcards::Grade;
use emt_study_lib::progress::ActivityType;

#[derive(Parser)]
#[command(name = "emt-study", about = "EMT-B study progress and flashcard review", version)]
struct Cli {
    /// Read and write data in this directory instead of the configured one
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum GradeArg {
    Again,
    Hard,
    Good,
    Easy,
}

impl From<GradeArg> for Grade {
    fn from(arg: GradeArg) -> Self {
        match arg {
            GradeArg::Again => Grade::Again,
            GradeArg::Hard => Grade::Hard,
            GradeArg::Good => Grade::Good,
            GradeArg::Easy => Grade::Easy,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Grade a flashcard and reschedule it
    Review {
        /// Card ID
        card_id: String,
        /// Recall grade
        grade: GradeArg,
        /// Topic the card belongs to
        #[arg(long)]
        topic: String,
        /// Time spent on the card in milliseconds
        #[arg(long, default_value = "0")]
        time_ms: u64,
    },

    /// Show a card's schedule, grade preview and recent history
    Card {
        /// Card ID
        card_id: String,
    },

    /// List cards due for review
    Due {
        /// Only cards in this topic
        #[arg(long)]
        topic: Option<String>,
    },

    /// List weak topics, or the weakest cards within one topic
    Weak {
        /// Show the weakest cards in this topic instead
        #[arg(long)]
        topic: Option<String>,
        /// Average score below which a topic is weak (default from config)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Flashcard review analytics
    Analytics {
        /// Only cards in this topic
        #[arg(long)]
        topic: Option<String>,
        /// Recompute topic rollups from per-card counters first
        #[arg(long)]
        rebuild: bool,
    },

    /// Study session tracking
    #[command(subcommand)]
    Session(SessionCommand),

    /// Show dashboard statistics
    Stats,

    /// Record a quiz attempt
    Quiz {
        /// Quiz ID
        quiz_id: String,
        /// Number of correct answers
        correct: u32,
        /// Number of questions
        total: u32,
        /// Chapter the quiz covers
        #[arg(long)]
        chapter: Option<String>,
        /// Time spent in seconds
        #[arg(long, default_value = "0")]
        time: u64,
    },

    /// Record a PCR practice attempt
    Pcr {
        /// Scenario ID
        scenario_id: String,
        /// Score, 0 - 100
        score: f64,
        /// Time spent in seconds
        #[arg(long, default_value = "0")]
        time: u64,
    },

    /// Record reading progress through a chapter
    Chapter {
        /// Chapter ID
        chapter_id: String,
        /// Percentage read, 0 - 100
        percent: f64,
        /// Time spent in seconds
        #[arg(long, default_value = "0")]
        time: u64,
    },

    /// Record flashcard mastery for a chapter's deck
    Deck {
        /// Chapter ID
        chapter_id: String,
        /// Cards in the deck
        total: u32,
        /// Cards studied so far
        studied: u32,
        /// Cards mastered
        mastered: u32,
    },

    /// Toggle a chapter as favorite
    Favorite {
        /// Chapter ID
        chapter_id: String,
    },

    /// Chapter bookmarks
    #[command(subcommand)]
    Bookmark(BookmarkCommand),

    /// Write all progress as JSON (stdout unless a file is given)
    Export {
        /// Output file
        file: Option<PathBuf>,
    },

    /// Replace all progress with a previously exported document
    Import {
        /// Export file ("-" for stdin)
        file: PathBuf,
    },

    /// Delete all progress and flashcard data
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Start a study session and print its ID
    Start {
        /// Activity: quiz, flashcards, pcr, study-notes, scenarios, calculators
        activity: ActivityType,
        /// What is being studied
        resource_id: String,
    },

    /// End a study session
    End {
        /// Session ID
        session_id: String,
    },

    /// List open sessions
    List,
}

#[derive(Subcommand)]
enum BookmarkCommand {
    /// Bookmark a chapter or section
    Add {
        chapter_id: String,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },

    /// Remove a bookmark
    Remove {
        chapter_id: String,
        #[arg(long)]
        section: Option<String>,
    },

    /// List bookmarks and favorite chapters
    List,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let app = app::App::new(cli.config.as_deref(), cli.data_dir)?;
    let format = &cli.format;

    match cli.command {
        Command::Review { card_id, grade, topic, time_ms } => {
            commands::cards::run_review(&app, &card_id, &topic, grade.into(), time_ms, format)?;
        }
        Command::Card { card_id } => {
            commands::cards::run_card(&app, &card_id, format)?;
        }
        Command::Due { topic } => {
            commands::cards::run_due(&app, topic.as_deref(), format)?;
        }
        Command::Weak { topic, threshold } => {
            commands::cards::run_weak(&app, topic.as_deref(), threshold, format)?;
        }
        Command::Analytics { topic, rebuild } => {
            commands::cards::run_analytics(&app, topic.as_deref(), rebuild, format)?;
        }
        Command::Session(subcmd) => match subcmd {
            SessionCommand::Start { activity, resource_id } => {
                commands::session::run_start(&app, activity, &resource_id, format)?;
            }
            SessionCommand::End { session_id } => {
                commands::session::run_end(&app, &session_id, format)?;
            }
            SessionCommand::List => {
                commands::session::run_list(&app, format)?;
            }
        },
        Command::Stats => {
            commands::progress::run_stats(&app, format)?;
        }
        Command::Quiz { quiz_id, correct, total, chapter, time } => {
            commands::progress::run_quiz(&app, &quiz_id, correct, total, chapter, time, format)?;
        }
        Command::Pcr { scenario_id, score, time } => {
            commands::progress::run_pcr(&app, &scenario_id, score, time, format)?;
        }
        Command::Chapter { chapter_id, percent, time } => {
            commands::progress::run_chapter(&app, &chapter_id, percent, time, format)?;
        }
        Command::Deck { chapter_id, total, studied, mastered } => {
            commands::progress::run_deck(&app, &chapter_id, total, studied, mastered, format)?;
        }
        Command::Favorite { chapter_id } => {
            commands::progress::run_favorite(&app, &chapter_id, format)?;
        }
        Command::Bookmark(subcmd) => match subcmd {
            BookmarkCommand::Add { chapter_id, section, label } => {
                commands::progress::run_bookmark_add(
                    &app,
                    &chapter_id,
                    section.as_deref(),
                    label.as_deref(),
                    format,
                )?;
            }
            BookmarkCommand::Remove { chapter_id, section } => {
                commands::progress::run_bookmark_remove(&app, &chapter_id, section.as_deref(), format)?;
            }
            BookmarkCommand::List => {
                commands::progress::run_bookmark_list(&app, format)?;
            }
        },
        Command::Export { file } => {
            commands::data::run_export(&app, file.as_deref())?;
        }
        Command::Import { file } => {
            commands::data::run_import(&app, &file, format)?;
        }
        Command::Clear { yes } => {
            commands::data::run_clear(&app, yes, format)?;
        }
    }

    Ok(())
}
