//! Data models for the flashcard system

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::topics::TopicAggregator;

/// Number of review events kept per card
pub const HISTORY_CAPACITY: usize = 20;

/// Self-reported recall grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub const ALL: [Grade; 4] = [Grade::Again, Grade::Hard, Grade::Good, Grade::Easy];

    /// SM-2 quality (0-5 scale)
    pub fn quality(self) -> u8 {
        match self {
            Self::Again => 0,
            Self::Hard => 2,
            Self::Good => 3,
            Self::Easy => 4,
        }
    }

    /// Score recorded for analytics (0-100)
    pub fn score(self) -> u32 {
        match self {
            Self::Again => 0,
            Self::Hard => 50,
            Self::Good => 80,
            Self::Easy => 100,
        }
    }

    /// Whether the learner struggled with the card
    pub fn is_lapse(self) -> bool {
        matches!(self, Self::Again | Self::Hard)
    }

    /// Map a 1-4 rating button to a grade
    pub fn from_rating(rating: u8) -> Option<Self> {
        match rating {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

/// Spaced repetition state for one card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardScheduleState {
    pub card_id: String,
    /// Current interval in days
    pub interval: i32,
    /// SM-2 ease factor
    pub ease_factor: f64,
    /// Consecutive successful reviews
    pub repetitions: u32,
    pub next_review_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl CardScheduleState {
    /// State of a card that has never been reviewed
    pub fn new(card_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            card_id: card_id.into(),
            interval: 1,
            ease_factor: 2.5,
            repetitions: 0,
            next_review_at: now,
            last_reviewed_at: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_at <= now
    }
}

/// A single graded review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub card_id: String,
    pub topic: String,
    pub grade: Grade,
    pub score: u32,
    pub time_spent_ms: u64,
    pub previous_interval: i32,
    pub new_interval: i32,
    pub ease_factor: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReviewEvent {
    /// Build the event for a review that moved `before` to `after`
    pub fn from_transition(
        topic: impl Into<String>,
        grade: Grade,
        time_spent_ms: u64,
        before: &CardScheduleState,
        after: &CardScheduleState,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            card_id: after.card_id.clone(),
            topic: topic.into(),
            grade,
            score: grade.score(),
            time_spent_ms,
            previous_interval: before.interval,
            new_interval: after.interval,
            ease_factor: after.ease_factor,
            timestamp,
        }
    }
}

/// Review counters and recent history for one card
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    pub card_id: String,
    pub topic: String,
    #[serde(default)]
    pub reviews: u32,
    #[serde(default)]
    pub score_sum: u64,
    /// Most recent events, oldest first
    #[serde(default)]
    pub history: VecDeque<ReviewEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl CardRecord {
    pub fn new(card_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            topic: topic.into(),
            reviews: 0,
            score_sum: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            last_reviewed_at: None,
        }
    }

    /// Fold one event into the record, evicting the oldest history entry
    /// when full. The record keeps the topic it was created with.
    pub fn apply(&mut self, event: &ReviewEvent) {
        self.reviews += 1;
        self.score_sum += u64::from(event.score);
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        self.last_reviewed_at = Some(event.timestamp);
    }

    pub fn average_score(&self) -> f64 {
        if self.reviews == 0 {
            0.0
        } else {
            self.score_sum as f64 / f64::from(self.reviews)
        }
    }

    /// At least three reviews averaging 80 or better
    pub fn is_retained(&self) -> bool {
        self.reviews >= 3 && self.average_score() >= 80.0
    }

    pub fn has_lapses(&self) -> bool {
        self.history.iter().any(|e| e.grade.is_lapse())
    }
}

/// Rolled-up counters for one topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    pub topic: String,
    pub reviews: u32,
    pub score_sum: u64,
    pub card_ids: BTreeSet<String>,
}

impl TopicStats {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn average_score(&self) -> f64 {
        if self.reviews == 0 {
            0.0
        } else {
            self.score_sum as f64 / f64::from(self.reviews)
        }
    }
}

/// Schedules keyed by card ID
pub type ScheduleMap = BTreeMap<String, CardScheduleState>;

/// Everything persisted under the analytics key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardAnalyticsData {
    #[serde(default)]
    pub cards: BTreeMap<String, CardRecord>,
    #[serde(default)]
    pub topics: TopicAggregator,
}

/// Summary for a topic, used by weak-area recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub topic: String,
    pub reviews: u32,
    pub card_count: usize,
    pub average_score: f64,
}

impl From<&TopicStats> for TopicSummary {
    fn from(stats: &TopicStats) -> Self {
        Self {
            topic: stats.topic.clone(),
            reviews: stats.reviews,
            card_count: stats.card_ids.len(),
            average_score: stats.average_score(),
        }
    }
}

/// Aggregate metrics for a deck or all decks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckAnalytics {
    pub total_reviews: u32,
    pub average_score: f64,
    /// Percentage of tracked cards considered retained, 0.0 - 100.0
    pub retention_rate: f64,
    pub due_cards: usize,
    pub topics: Vec<TopicSummary>,
}

/// Add whole days to a timestamp, or `None` past the representable range
pub(crate) fn add_days(ts: DateTime<Utc>, days: i32) -> Option<DateTime<Utc>> {
    ts.checked_add_signed(Duration::days(i64::from(days)))
}
