use anyhow::{Context, Result};
use chrono::Utc;

use emt_study_lib::flashcards::algorithm::{format_interval, preview_intervals};
use emt_study_lib::flashcards::{CardScheduleState, Grade, TopicSummary};

use crate::app::App;
use crate::OutputFormat;

pub fn run_review(
    app: &App,
    card_id: &str,
    topic: &str,
    grade: Grade,
    time_ms: u64,
    format: &OutputFormat,
) -> Result<()> {
    let state = app
        .state
        .ledger
        .review_card(card_id, topic, grade, time_ms)
        .context("Failed to record review")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        OutputFormat::Plain => {
            println!("Reviewed {} as {}", card_id, grade.name());
            println!(
                "  Next review in {} ({})",
                format_interval(state.interval),
                state.next_review_at.format("%Y-%m-%d")
            );
            println!("  Ease: {:.2}  Repetitions: {}", state.ease_factor, state.repetitions);
        }
    }

    Ok(())
}

pub fn run_card(app: &App, card_id: &str, format: &OutputFormat) -> Result<()> {
    let ledger = &app.state.ledger;
    let now = Utc::now();
    let state = ledger.schedule(card_id)?;
    let preview_from = state
        .clone()
        .unwrap_or_else(|| CardScheduleState::new(card_id, now));
    let preview = preview_intervals(&preview_from, now)?;
    let history = ledger.history(card_id)?;

    match format {
        OutputFormat::Json => {
            let preview: serde_json::Map<String, serde_json::Value> = Grade::ALL
                .iter()
                .zip(preview)
                .map(|(grade, days)| (grade.name().to_string(), days.into()))
                .collect();
            let output = serde_json::json!({
                "schedule": state,
                "preview": preview,
                "history": history,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            match &state {
                Some(s) => {
                    println!("Card {}", card_id);
                    println!(
                        "  Interval: {}  Ease: {:.2}  Repetitions: {}",
                        format_interval(s.interval),
                        s.ease_factor,
                        s.repetitions
                    );
                    println!("  Due: {}", s.next_review_at.format("%Y-%m-%d %H:%M"));
                }
                None => println!("Card {} has not been reviewed yet", card_id),
            }

            let labels: Vec<String> = Grade::ALL
                .iter()
                .zip(preview)
                .map(|(grade, days)| format!("{} {}", grade.name(), format_interval(days)))
                .collect();
            println!("  Next: {}", labels.join("  "));

            if !history.is_empty() {
                println!("\nRecent reviews:");
                for event in history.iter().rev() {
                    println!(
                        "  {}  {:<5}  {:>3}  {} -> {}",
                        event.timestamp.format("%Y-%m-%d %H:%M"),
                        event.grade.name(),
                        event.score,
                        format_interval(event.previous_interval),
                        format_interval(event.new_interval)
                    );
                }
            }
        }
    }

    Ok(())
}

pub fn run_due(app: &App, topic: Option<&str>, format: &OutputFormat) -> Result<()> {
    let due = app.state.ledger.due_cards(topic)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&due)?);
        }
        OutputFormat::Plain => {
            if due.is_empty() {
                println!("No cards due.");
                return Ok(());
            }
            for card_id in &due {
                println!("{}", card_id);
            }
            println!("\n{} cards due", due.len());
        }
    }

    Ok(())
}

pub fn run_weak(
    app: &App,
    topic: Option<&str>,
    threshold: Option<f64>,
    format: &OutputFormat,
) -> Result<()> {
    let ledger = &app.state.ledger;

    if let Some(topic) = topic {
        let cards = ledger.get_weakest_cards(topic)?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cards)?),
            OutputFormat::Plain => {
                if cards.is_empty() {
                    println!("No struggling cards in {}.", topic);
                }
                for card_id in &cards {
                    println!("{}", card_id);
                }
            }
        }
        return Ok(());
    }

    let threshold = threshold.unwrap_or(app.config.weak_topic_threshold);
    let topics = ledger.weak_topics(threshold)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&topics)?),
        OutputFormat::Plain => {
            if topics.is_empty() {
                println!("No topics below {:.0}%.", threshold);
                return Ok(());
            }
            print_topics(&topics);
        }
    }

    Ok(())
}

pub fn run_analytics(
    app: &App,
    topic: Option<&str>,
    rebuild: bool,
    format: &OutputFormat,
) -> Result<()> {
    let ledger = &app.state.ledger;
    if rebuild {
        ledger.rebuild_topics().context("Failed to rebuild topic rollups")?;
    }
    let analytics = ledger.get_analytics(topic)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&analytics)?);
        }
        OutputFormat::Plain => {
            println!("Reviews:        {}", analytics.total_reviews);
            println!("Average score:  {:.1}", analytics.average_score);
            println!("Retention:      {:.1}%", analytics.retention_rate);
            println!("Due now:        {}", analytics.due_cards);
            if !analytics.topics.is_empty() {
                println!();
                print_topics(&analytics.topics);
            }
        }
    }

    Ok(())
}

fn print_topics(topics: &[TopicSummary]) {
    let topic_width = topics.iter().map(|t| t.topic.len()).max().unwrap_or(5).clamp(5, 30);

    println!("{:<tw$} {:>7} {:>5} {:>7}", "Topic", "Reviews", "Cards", "Average", tw = topic_width);
    println!(
        "{} {} {} {}",
        "\u{2500}".repeat(topic_width),
        "\u{2500}".repeat(7),
        "\u{2500}".repeat(5),
        "\u{2500}".repeat(7)
    );
    for t in topics {
        println!(
            "{:<tw$} {:>7} {:>5} {:>7.1}",
            t.topic,
            t.reviews,
            t.card_count,
            t.average_score,
            tw = topic_width
        );
    }
}
