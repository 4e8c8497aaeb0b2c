use anyhow::Result;

use emt_study_lib::progress::{ActivityType, SessionTracker};

use crate::app::App;
use crate::OutputFormat;

pub fn run_start(
    app: &App,
    activity: ActivityType,
    resource_id: &str,
    format: &OutputFormat,
) -> Result<()> {
    let tracker = SessionTracker::new(&app.state.progress);
    let session_id = tracker.start(activity, resource_id)?;

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "sessionId": session_id,
                "activityType": activity,
                "resourceId": resource_id,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("Started {} session on {}", activity, resource_id);
            println!("  ID: {}", session_id);
        }
    }

    Ok(())
}

pub fn run_end(app: &App, session_id: &str, format: &OutputFormat) -> Result<()> {
    let tracker = SessionTracker::new(&app.state.progress);
    let closed = tracker.end(session_id)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&closed)?);
        }
        OutputFormat::Plain => match closed {
            Some(session) => {
                let secs = session.duration.unwrap_or(0);
                println!(
                    "Ended {} session on {} after {}m {:02}s",
                    session.activity_type,
                    session.resource_id,
                    secs / 60,
                    secs % 60
                );
            }
            None => println!("No open session with ID {}", session_id),
        },
    }

    Ok(())
}

pub fn run_list(app: &App, format: &OutputFormat) -> Result<()> {
    let sessions = SessionTracker::new(&app.state.progress).open_sessions()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Plain => {
            if sessions.is_empty() {
                println!("No open sessions.");
                return Ok(());
            }
            for session in &sessions {
                println!(
                    "{}  {:<12} {:<24} started {}",
                    session.session_id,
                    session.activity_type,
                    session.resource_id,
                    session.start_time.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }

    Ok(())
}
