use anyhow::{bail, Context, Result};
use chrono::Utc;

use emt_study_lib::progress::{ChapterProgress, FlashcardProgress, PcrProgress, QuizProgress};

use crate::app::App;
use crate::OutputFormat;

pub fn run_stats(app: &App, format: &OutputFormat) -> Result<()> {
    let stats = app.state.progress.get_statistics()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        OutputFormat::Plain => {
            let hours = stats.total_study_time / 3600;
            let minutes = (stats.total_study_time % 3600) / 60;
            println!("Quizzes taken:       {}", stats.total_quizzes_taken);
            println!("Average quiz score:  {:.1}", stats.average_quiz_score);
            println!("Study time:          {}h {:02}m", hours, minutes);
            println!("Streak:              {} days", stats.streak);
            println!("Chapters completed:  {}", stats.chapters_completed);
            println!("Cards mastered:      {}", stats.flashcards_mastered);
            if let Some(date) = stats.last_active_date {
                println!("Last active:         {}", date);
            }
        }
    }

    Ok(())
}

pub fn run_quiz(
    app: &App,
    quiz_id: &str,
    correct: u32,
    total: u32,
    chapter: Option<String>,
    time: u64,
    format: &OutputFormat,
) -> Result<()> {
    if total == 0 {
        bail!("A quiz needs at least one question");
    }
    if correct > total {
        bail!("{} correct answers out of {} questions", correct, total);
    }

    let quiz = QuizProgress {
        quiz_id: quiz_id.to_string(),
        chapter_id: chapter,
        score: f64::from(correct) / f64::from(total) * 100.0,
        correct_answers: correct,
        total_questions: total,
        time_spent: time,
        completed_at: Utc::now(),
    };
    app.state
        .progress
        .save_quiz_progress(quiz.clone())
        .context("Failed to save quiz")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&quiz)?),
        OutputFormat::Plain => println!(
            "Saved quiz {}: {}/{} ({:.0}%)",
            quiz_id, correct, total, quiz.score
        ),
    }

    Ok(())
}

pub fn run_pcr(
    app: &App,
    scenario_id: &str,
    score: f64,
    time: u64,
    format: &OutputFormat,
) -> Result<()> {
    let pcr = PcrProgress {
        scenario_id: scenario_id.to_string(),
        score,
        time_spent: time,
        completed_at: Utc::now(),
    };
    app.state
        .progress
        .save_pcr_progress(pcr.clone())
        .context("Failed to save PCR practice")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pcr)?),
        OutputFormat::Plain => println!("Saved PCR practice {}: {:.0}%", scenario_id, score),
    }

    Ok(())
}

pub fn run_chapter(
    app: &App,
    chapter_id: &str,
    percent: f64,
    time: u64,
    format: &OutputFormat,
) -> Result<()> {
    let progress = &app.state.progress;
    let previous_time = progress
        .get_chapter_progress(chapter_id)?
        .map(|c| c.time_spent)
        .unwrap_or(0);

    let chapter = ChapterProgress {
        chapter_id: chapter_id.to_string(),
        completed: percent >= 100.0,
        percent_complete: percent,
        time_spent: previous_time + time,
        last_accessed: Utc::now(),
    };
    progress
        .save_chapter_progress(chapter.clone())
        .context("Failed to save chapter progress")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&chapter)?),
        OutputFormat::Plain => {
            let status = if chapter.completed { " (completed)" } else { "" };
            println!("Chapter {}: {:.0}%{}", chapter_id, percent, status);
        }
    }

    Ok(())
}

pub fn run_deck(
    app: &App,
    chapter_id: &str,
    total: u32,
    studied: u32,
    mastered: u32,
    format: &OutputFormat,
) -> Result<()> {
    if studied > total || mastered > studied {
        bail!("Expected mastered <= studied <= total");
    }

    let deck = FlashcardProgress {
        chapter_id: chapter_id.to_string(),
        total_cards: total,
        cards_studied: studied,
        cards_mastered: mastered,
        last_studied: Utc::now(),
    };
    app.state
        .progress
        .save_flashcard_progress(deck.clone())
        .context("Failed to save deck progress")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&deck)?),
        OutputFormat::Plain => println!(
            "Deck {}: {} of {} studied, {} mastered",
            chapter_id, studied, total, mastered
        ),
    }

    Ok(())
}

pub fn run_favorite(app: &App, chapter_id: &str, format: &OutputFormat) -> Result<()> {
    let favorite = app.state.progress.toggle_favorite_chapter(chapter_id)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "chapterId": chapter_id, "favorite": favorite });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if favorite {
                println!("Added {} to favorites", chapter_id);
            } else {
                println!("Removed {} from favorites", chapter_id);
            }
        }
    }

    Ok(())
}

pub fn run_bookmark_add(
    app: &App,
    chapter_id: &str,
    section: Option<&str>,
    label: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let bookmark = app.state.progress.add_bookmark(chapter_id, section, label)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bookmark)?),
        OutputFormat::Plain => println!("Bookmarked {}", describe(chapter_id, section)),
    }

    Ok(())
}

pub fn run_bookmark_remove(
    app: &App,
    chapter_id: &str,
    section: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let removed = app.state.progress.remove_bookmark(chapter_id, section)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "removed": removed });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            if removed {
                println!("Removed bookmark {}", describe(chapter_id, section));
            } else {
                println!("No bookmark at {}", describe(chapter_id, section));
            }
        }
    }

    Ok(())
}

pub fn run_bookmark_list(app: &App, format: &OutputFormat) -> Result<()> {
    let preferences = app.state.progress.get_progress()?.preferences;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preferences)?),
        OutputFormat::Plain => {
            if !preferences.favorite_chapters.is_empty() {
                println!("Favorites: {}", preferences.favorite_chapters.join(", "));
            }
            if preferences.bookmarks.is_empty() {
                println!("No bookmarks.");
                return Ok(());
            }
            for b in &preferences.bookmarks {
                println!(
                    "{:<20} {}",
                    describe(&b.chapter_id, b.section_id.as_deref()),
                    b.label.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

fn describe(chapter_id: &str, section: Option<&str>) -> String {
    match section {
        Some(s) => format!("{} \u{00a7}{}", chapter_id, s),
        None => chapter_id.to_string(),
    }
}
