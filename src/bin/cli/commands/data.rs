use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::app::App;
use crate::OutputFormat;

pub fn run_export(app: &App, file: Option<&Path>) -> Result<()> {
    let blob = app.state.progress.export_all().context("Failed to export progress")?;

    match file {
        Some(path) => {
            fs::write(path, &blob)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            eprintln!("Exported progress to {:?}", path);
        }
        None => println!("{}", blob),
    }

    Ok(())
}

pub fn run_import(app: &App, file: &Path, format: &OutputFormat) -> Result<()> {
    let blob = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        fs::read_to_string(file)
            .with_context(|| format!("Failed to read import file: {:?}", file))?
    };

    app.state
        .progress
        .try_import_all(&blob)
        .context("Import rejected; existing progress was left unchanged")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "imported": true })),
        OutputFormat::Plain => println!("Imported progress from {:?}", file),
    }

    Ok(())
}

pub fn run_clear(app: &App, yes: bool, format: &OutputFormat) -> Result<()> {
    if !yes {
        bail!("Refusing to delete all data without --yes");
    }

    app.state.progress.clear_all()?;
    app.state.ledger.clear_all()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "cleared": true })),
        OutputFormat::Plain => println!("Cleared all progress and flashcard data"),
    }

    Ok(())
}
