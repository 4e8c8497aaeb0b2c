//! Learning progress data models

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Number of PCR practice attempts kept
pub const PCR_PRACTICE_CAPACITY: usize = 50;

/// Closed sessions older than this many days are dropped once they can no
/// longer affect the streak
pub const SESSION_RETENTION_DAYS: i64 = 90;

/// Kind of activity a study session brackets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityType {
    Quiz,
    Flashcards,
    Pcr,
    StudyNotes,
    Scenarios,
    Calculators,
}

impl ActivityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Flashcards => "flashcards",
            Self::Pcr => "pcr",
            Self::StudyNotes => "study-notes",
            Self::Scenarios => "scenarios",
            Self::Calculators => "calculators",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz" => Ok(Self::Quiz),
            "flashcards" => Ok(Self::Flashcards),
            "pcr" => Ok(Self::Pcr),
            "study-notes" => Ok(Self::StudyNotes),
            "scenarios" => Ok(Self::Scenarios),
            "calculators" => Ok(Self::Calculators),
            other => Err(format!("unknown activity type: {}", other)),
        }
    }
}

/// Latest attempt at a quiz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    pub quiz_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    /// Percentage, 0 - 100
    pub score: f64,
    pub correct_answers: u32,
    pub total_questions: u32,
    /// Seconds
    #[serde(default)]
    pub time_spent: u64,
    pub completed_at: DateTime<Utc>,
}

/// Flashcard mastery for one chapter's deck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardProgress {
    pub chapter_id: String,
    pub total_cards: u32,
    pub cards_studied: u32,
    pub cards_mastered: u32,
    pub last_studied: DateTime<Utc>,
}

/// One patient care report practice attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcrProgress {
    pub scenario_id: String,
    /// Percentage, 0 - 100
    pub score: f64,
    /// Seconds
    #[serde(default)]
    pub time_spent: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub chapter_id: String,
    pub completed: bool,
    /// Percentage of the chapter read, 0 - 100
    #[serde(default)]
    pub percent_complete: f64,
    /// Seconds
    #[serde(default)]
    pub time_spent: u64,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySession {
    pub session_id: String,
    pub activity_type: ActivityType,
    pub resource_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds, set when the session closes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl StudySession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Derived totals shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_quizzes_taken: u32,
    pub average_quiz_score: f64,
    /// Seconds across all closed sessions
    pub total_study_time: u64,
    /// Consecutive days with a study session
    pub streak: u32,
    pub chapters_completed: u32,
    pub flashcards_mastered: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub chapter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn points_at(&self, chapter_id: &str, section_id: Option<&str>) -> bool {
        self.chapter_id == chapter_id && self.section_id.as_deref() == section_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub favorite_chapters: Vec<String>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

/// Everything the learner has done, persisted as one blob
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    #[serde(default)]
    pub quizzes: Vec<QuizProgress>,
    #[serde(default)]
    pub flashcards: Vec<FlashcardProgress>,
    #[serde(default)]
    pub pcr_practice: Vec<PcrProgress>,
    #[serde(default)]
    pub chapters: Vec<ChapterProgress>,
    #[serde(default)]
    pub study_sessions: Vec<StudySession>,
    #[serde(default)]
    pub statistics: Statistics,
    #[serde(default)]
    pub preferences: Preferences,
}

impl UserProgress {
    /// Check the invariants every stored aggregate must satisfy
    pub fn validate(&self) -> Result<(), String> {
        let mut quiz_ids = HashSet::new();
        for quiz in &self.quizzes {
            if !quiz_ids.insert(quiz.quiz_id.as_str()) {
                return Err(format!("duplicate quiz id '{}'", quiz.quiz_id));
            }
            check_percentage("quiz score", quiz.score)?;
            if quiz.correct_answers > quiz.total_questions {
                return Err(format!(
                    "quiz '{}' has more correct answers than questions",
                    quiz.quiz_id
                ));
            }
        }

        let mut deck_ids = HashSet::new();
        for deck in &self.flashcards {
            if !deck_ids.insert(deck.chapter_id.as_str()) {
                return Err(format!("duplicate flashcard chapter '{}'", deck.chapter_id));
            }
        }

        if self.pcr_practice.len() > PCR_PRACTICE_CAPACITY {
            return Err(format!(
                "{} PCR attempts exceeds the limit of {}",
                self.pcr_practice.len(),
                PCR_PRACTICE_CAPACITY
            ));
        }
        for pcr in &self.pcr_practice {
            check_percentage("PCR score", pcr.score)?;
        }

        let mut chapter_ids = HashSet::new();
        for chapter in &self.chapters {
            if !chapter_ids.insert(chapter.chapter_id.as_str()) {
                return Err(format!("duplicate chapter '{}'", chapter.chapter_id));
            }
            check_percentage("chapter completion", chapter.percent_complete)?;
        }

        let mut session_ids = HashSet::new();
        for session in &self.study_sessions {
            if !session_ids.insert(session.session_id.as_str()) {
                return Err(format!("duplicate session id '{}'", session.session_id));
            }
            match (session.end_time, session.duration) {
                (None, None) => {}
                (Some(end), Some(_)) if end >= session.start_time => {}
                _ => {
                    return Err(format!(
                        "session '{}' has an inconsistent end time and duration",
                        session.session_id
                    ))
                }
            }
        }

        if !self.statistics.average_quiz_score.is_finite() {
            return Err("average quiz score is not a number".to_string());
        }

        Ok(())
    }
}

pub(crate) fn check_percentage(what: &str, value: f64) -> Result<(), String> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} {} is outside 0-100", what, value))
    }
}

/// Document produced by export and accepted by import
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressExport {
    pub schema_version: u32,
    pub exported_at: DateTime<Utc>,
    pub progress: UserProgress,
}
