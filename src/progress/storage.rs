//! Progress storage implementation

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use thiserror::Error;
use uuid::Uuid;

use super::models::*;
use crate::clock::{local_date, Clock};
use crate::storage::{Repository, StorageError, CURRENT_SCHEMA_VERSION};

pub const PROGRESS_KEY: &str = "user-progress";

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),
}

pub type Result<T> = std::result::Result<T, ProgressError>;

/// Storage for quizzes, decks, PCR practice, chapters and study sessions
pub struct ProgressStore {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl ProgressStore {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    // ===== Reads =====

    /// The full aggregate, with statistics recomputed for today
    pub fn get_progress(&self) -> Result<UserProgress> {
        let mut progress: UserProgress = self.repo.load_or_default(PROGRESS_KEY)?.value;
        refresh_statistics(&mut progress, self.clock.today());
        Ok(progress)
    }

    pub fn get_statistics(&self) -> Result<Statistics> {
        Ok(self.get_progress()?.statistics)
    }

    pub fn get_quiz_progress(&self, quiz_id: &str) -> Result<Option<QuizProgress>> {
        Ok(self
            .get_progress()?
            .quizzes
            .into_iter()
            .find(|q| q.quiz_id == quiz_id))
    }

    pub fn get_chapter_progress(&self, chapter_id: &str) -> Result<Option<ChapterProgress>> {
        Ok(self
            .get_progress()?
            .chapters
            .into_iter()
            .find(|c| c.chapter_id == chapter_id))
    }

    // ===== Activity Saves =====

    /// Record a quiz attempt, replacing any earlier attempt at the same quiz
    pub fn save_quiz_progress(&self, quiz: QuizProgress) -> Result<()> {
        check_score("quiz score", quiz.score)?;
        if quiz.correct_answers > quiz.total_questions {
            return Err(ProgressError::InvalidInput(format!(
                "{} correct answers out of {} questions",
                quiz.correct_answers, quiz.total_questions
            )));
        }

        self.mutate(|progress| {
            progress.quizzes.retain(|q| q.quiz_id != quiz.quiz_id);
            progress.quizzes.push(quiz.clone());
        })?;
        log::debug!("Saved quiz progress for {}", quiz.quiz_id);
        Ok(())
    }

    /// Upsert deck mastery for a chapter
    pub fn save_flashcard_progress(&self, deck: FlashcardProgress) -> Result<()> {
        self.mutate(|progress| {
            match progress
                .flashcards
                .iter_mut()
                .find(|f| f.chapter_id == deck.chapter_id)
            {
                Some(existing) => *existing = deck.clone(),
                None => progress.flashcards.push(deck.clone()),
            }
        })
    }

    /// Append a PCR attempt, dropping the oldest beyond the cap
    pub fn save_pcr_progress(&self, pcr: PcrProgress) -> Result<()> {
        check_score("PCR score", pcr.score)?;
        self.mutate(|progress| {
            progress.pcr_practice.push(pcr.clone());
            let excess = progress
                .pcr_practice
                .len()
                .saturating_sub(PCR_PRACTICE_CAPACITY);
            progress.pcr_practice.drain(..excess);
        })
    }

    /// Upsert progress through a chapter
    pub fn save_chapter_progress(&self, chapter: ChapterProgress) -> Result<()> {
        check_score("chapter completion", chapter.percent_complete)?;
        self.mutate(|progress| {
            match progress
                .chapters
                .iter_mut()
                .find(|c| c.chapter_id == chapter.chapter_id)
            {
                Some(existing) => *existing = chapter.clone(),
                None => progress.chapters.push(chapter.clone()),
            }
        })
    }

    // ===== Preferences =====

    /// Flip a chapter's favorite flag, returning whether it is now a favorite
    pub fn toggle_favorite_chapter(&self, chapter_id: &str) -> Result<bool> {
        self.repo.update(PROGRESS_KEY, |progress: &mut UserProgress| {
            let favorites = &mut progress.preferences.favorite_chapters;
            let now_favorite = match favorites.iter().position(|c| c == chapter_id) {
                Some(pos) => {
                    favorites.remove(pos);
                    false
                }
                None => {
                    favorites.push(chapter_id.to_string());
                    true
                }
            };
            Ok::<_, ProgressError>(now_favorite)
        })
    }

    /// Add a bookmark unless one already points at the same place
    pub fn add_bookmark(
        &self,
        chapter_id: &str,
        section_id: Option<&str>,
        label: Option<&str>,
    ) -> Result<Bookmark> {
        let now = self.clock.now();
        self.repo.update(PROGRESS_KEY, |progress: &mut UserProgress| {
            let bookmarks = &mut progress.preferences.bookmarks;
            if let Some(existing) = bookmarks.iter().find(|b| b.points_at(chapter_id, section_id)) {
                return Ok::<_, ProgressError>(existing.clone());
            }
            let bookmark = Bookmark {
                chapter_id: chapter_id.to_string(),
                section_id: section_id.map(str::to_string),
                label: label.map(str::to_string),
                created_at: now,
            };
            bookmarks.push(bookmark.clone());
            Ok(bookmark)
        })
    }

    /// Remove a bookmark, returning whether one existed
    pub fn remove_bookmark(&self, chapter_id: &str, section_id: Option<&str>) -> Result<bool> {
        self.repo.update(PROGRESS_KEY, |progress: &mut UserProgress| {
            let bookmarks = &mut progress.preferences.bookmarks;
            let before = bookmarks.len();
            bookmarks.retain(|b| !b.points_at(chapter_id, section_id));
            Ok::<_, ProgressError>(bookmarks.len() != before)
        })
    }

    // ===== Sessions =====

    /// Open a study session and return its ID
    pub fn start_session(&self, activity_type: ActivityType, resource_id: &str) -> Result<String> {
        let now = self.clock.now();
        let session_id = Uuid::new_v4().to_string();

        self.mutate(|progress| {
            progress.study_sessions.push(StudySession {
                session_id: session_id.clone(),
                activity_type,
                resource_id: resource_id.to_string(),
                start_time: now,
                end_time: None,
                duration: None,
            });
        })?;

        log::debug!("Started {} session {} on {}", activity_type, session_id, resource_id);
        Ok(session_id)
    }

    /// Close an open session and add its duration to the study time total.
    ///
    /// Returns the closed session, or `None` if no open session has this ID.
    pub fn end_session(&self, session_id: &str) -> Result<Option<StudySession>> {
        let now = self.clock.now();

        let closed = self.repo.update(PROGRESS_KEY, |progress: &mut UserProgress| {
            let session = match progress
                .study_sessions
                .iter_mut()
                .find(|s| s.session_id == session_id && s.is_open())
            {
                Some(session) => session,
                None => return Ok::<_, ProgressError>(None),
            };

            let duration = (now - session.start_time).num_seconds().max(0) as u64;
            session.end_time = Some(now);
            session.duration = Some(duration);
            let closed = session.clone();

            progress.statistics.total_study_time += duration;
            touch(progress, local_date(now));
            Ok(Some(closed))
        })?;

        match &closed {
            Some(session) => log::debug!(
                "Ended session {} after {}s",
                session_id,
                session.duration.unwrap_or(0)
            ),
            None => log::debug!("No open session {} to end", session_id),
        }
        Ok(closed)
    }

    pub fn open_sessions(&self) -> Result<Vec<StudySession>> {
        Ok(self
            .get_progress()?
            .study_sessions
            .into_iter()
            .filter(StudySession::is_open)
            .collect())
    }

    // ===== Import / Export =====

    /// Serialize the whole aggregate as a versioned export document
    pub fn export_all(&self) -> Result<String> {
        let export = ProgressExport {
            schema_version: CURRENT_SCHEMA_VERSION,
            exported_at: self.clock.now(),
            progress: self.get_progress()?,
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Replace the aggregate with an export document.
    ///
    /// The document is validated before anything is written; on failure the
    /// stored progress is untouched.
    pub fn try_import_all(&self, blob: &str) -> Result<()> {
        let export: ProgressExport = serde_json::from_str(blob)
            .map_err(|e| ProgressError::InvalidImport(e.to_string()))?;

        if export.schema_version == 0 || export.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(ProgressError::InvalidImport(format!(
                "unsupported schema version {}",
                export.schema_version
            )));
        }
        export
            .progress
            .validate()
            .map_err(ProgressError::InvalidImport)?;

        self.repo.put(PROGRESS_KEY, &export.progress)?;
        log::info!(
            "Imported progress exported at {} ({} quizzes, {} sessions)",
            export.exported_at,
            export.progress.quizzes.len(),
            export.progress.study_sessions.len()
        );
        Ok(())
    }

    /// Like [`Self::try_import_all`], reporting only success
    pub fn import_all(&self, blob: &str) -> bool {
        match self.try_import_all(blob) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Progress import rejected: {}", e);
                false
            }
        }
    }

    /// Delete all stored progress
    pub fn clear_all(&self) -> Result<()> {
        self.repo.remove(PROGRESS_KEY)?;
        log::info!("Cleared all progress");
        Ok(())
    }

    /// Apply a change, mark today active and recompute statistics
    fn mutate<F>(&self, mut change: F) -> Result<()>
    where
        F: FnMut(&mut UserProgress),
    {
        let today = self.clock.today();
        self.repo.update(PROGRESS_KEY, |progress: &mut UserProgress| {
            change(progress);
            touch(progress, today);
            Ok::<_, ProgressError>(())
        })
    }
}

fn check_score(what: &str, value: f64) -> Result<()> {
    check_percentage(what, value).map_err(ProgressError::InvalidInput)
}

fn touch(progress: &mut UserProgress, today: NaiveDate) {
    progress.statistics.last_active_date = Some(today);
    refresh_statistics(progress, today);
    prune_sessions(progress, today);
}

/// Drop closed sessions past the retention window that lie before the
/// current streak run. Open sessions are always kept.
fn prune_sessions(progress: &mut UserProgress, today: NaiveDate) {
    let run_floor = today - Duration::days(i64::from(progress.statistics.streak) + 1);
    let cutoff = run_floor.min(today - Duration::days(SESSION_RETENTION_DAYS));

    let before = progress.study_sessions.len();
    progress
        .study_sessions
        .retain(|s| s.is_open() || local_date(s.start_time) >= cutoff);

    let pruned = before - progress.study_sessions.len();
    if pruned > 0 {
        log::debug!("Pruned {} study sessions before {}", pruned, cutoff);
    }
}

/// Recompute every derived statistic except the running study time total
fn refresh_statistics(progress: &mut UserProgress, today: NaiveDate) {
    let stats = &mut progress.statistics;

    stats.total_quizzes_taken = progress.quizzes.len() as u32;
    stats.average_quiz_score = if progress.quizzes.is_empty() {
        0.0
    } else {
        progress.quizzes.iter().map(|q| q.score).sum::<f64>() / progress.quizzes.len() as f64
    };
    stats.chapters_completed = progress.chapters.iter().filter(|c| c.completed).count() as u32;
    stats.flashcards_mastered = progress.flashcards.iter().map(|f| f.cards_mastered).sum();
    stats.streak = calculate_streak(
        progress
            .study_sessions
            .iter()
            .map(|s| local_date(s.start_time)),
        today,
    );
}

/// Count consecutive study days ending today.
///
/// A run ending yesterday still counts, since today may not be over yet.
pub fn calculate_streak(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = dates.into_iter().collect();

    let mut check_date = if days.contains(&today) {
        today
    } else {
        let yesterday = today - Duration::days(1);
        if !days.contains(&yesterday) {
            return 0;
        }
        yesterday
    };

    // Walk backwards through the sorted dates
    let mut streak = 0;
    for day in days.range(..=check_date).rev() {
        if *day != check_date {
            break;
        }
        streak += 1;
        check_date = check_date - Duration::days(1);
    }
    streak
}
