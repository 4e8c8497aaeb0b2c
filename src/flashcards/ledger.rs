//! Durable review ledger for flashcards
//!
//! Two blobs are kept in the store:
//! ```text
//! flashcard-schedules   { cardId: CardScheduleState }
//! flashcard-analytics   { cards: { cardId: CardRecord }, topics: { topic: TopicStats } }
//! ```

use std::sync::Arc;

use thiserror::Error;

use super::algorithm::{self, ScheduleError};
use super::models::*;
use super::topics::TopicAggregator;
use crate::clock::Clock;
use crate::storage::{Repository, StorageError};

pub const SCHEDULES_KEY: &str = "flashcard-schedules";
pub const ANALYTICS_KEY: &str = "flashcard-analytics";

/// Maximum number of IDs returned by [`CardLedger::get_weakest_cards`]
pub const WEAKEST_CARDS_LIMIT: usize = 5;

#[derive(Error, Debug)]
pub enum FlashcardError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Invalid review event: {0}")]
    InvalidEvent(String),
}

pub type Result<T> = std::result::Result<T, FlashcardError>;

/// Records reviews and answers scheduling and analytics queries
pub struct CardLedger {
    repo: Repository,
    clock: Arc<dyn Clock>,
}

impl CardLedger {
    pub fn new(repo: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    // ==================== Review Operations ====================

    /// Grade a card: reschedule it and record the review.
    ///
    /// If the review cannot be recorded the card's schedule is put back, so
    /// a failed call can be retried without advancing the card twice.
    pub fn review_card(
        &self,
        card_id: &str,
        topic: &str,
        grade: Grade,
        time_spent_ms: u64,
    ) -> Result<CardScheduleState> {
        let now = self.clock.now();

        let (prior, after) = self.repo.update(SCHEDULES_KEY, |schedules: &mut ScheduleMap| {
            let prior = schedules.get(card_id).cloned();
            let before = prior
                .clone()
                .unwrap_or_else(|| CardScheduleState::new(card_id, now));
            let after = algorithm::schedule(&before, grade, now)?;
            schedules.insert(card_id.to_string(), after.clone());
            Ok::<_, FlashcardError>((prior, after))
        })?;

        let before = prior
            .clone()
            .unwrap_or_else(|| CardScheduleState::new(card_id, now));
        let event = ReviewEvent::from_transition(topic, grade, time_spent_ms, &before, &after, now);
        if let Err(e) = self.record_review(&event) {
            self.restore_schedule(card_id, prior, &after);
            return Err(e);
        }

        log::debug!(
            "Reviewed {} as {}: interval {} -> {} days",
            card_id,
            grade.name(),
            before.interval,
            after.interval
        );
        Ok(after)
    }

    /// Append a review event to its card and topic.
    ///
    /// Events carry no identity, so recording the same event twice counts it
    /// twice. A card stays in the topic of its first review; events naming
    /// another topic are rejected.
    pub fn record_review(&self, event: &ReviewEvent) -> Result<()> {
        if event.score > 100 {
            return Err(FlashcardError::InvalidEvent(format!(
                "score {} is outside 0-100",
                event.score
            )));
        }
        if event.card_id.is_empty() {
            return Err(FlashcardError::InvalidEvent("empty card id".to_string()));
        }

        self.repo
            .update(ANALYTICS_KEY, |data: &mut FlashcardAnalyticsData| {
                let record = data
                    .cards
                    .entry(event.card_id.clone())
                    .or_insert_with(|| CardRecord::new(event.card_id.clone(), event.topic.clone()));
                if record.topic != event.topic {
                    return Err(FlashcardError::InvalidEvent(format!(
                        "card {} belongs to topic '{}', not '{}'",
                        event.card_id, record.topic, event.topic
                    )));
                }
                record.apply(event);
                data.topics.apply(event);
                Ok(())
            })
    }

    /// Undo a schedule write whose review was not recorded, unless another
    /// writer has moved the card on since
    fn restore_schedule(
        &self,
        card_id: &str,
        prior: Option<CardScheduleState>,
        written: &CardScheduleState,
    ) {
        let restored = self.repo.update(SCHEDULES_KEY, |schedules: &mut ScheduleMap| {
            if schedules.get(card_id) == Some(written) {
                match &prior {
                    Some(state) => schedules.insert(card_id.to_string(), state.clone()),
                    None => schedules.remove(card_id),
                };
            }
            Ok::<_, FlashcardError>(())
        });
        if let Err(e) = restored {
            log::warn!("Failed to restore schedule for {}: {}", card_id, e);
        }
    }

    // ==================== Card Queries ====================

    /// Get the schedule for a card, if it has ever been reviewed
    pub fn schedule(&self, card_id: &str) -> Result<Option<CardScheduleState>> {
        let schedules: ScheduleMap = self.repo.load_or_default(SCHEDULES_KEY)?.value;
        Ok(schedules.get(card_id).cloned())
    }

    pub fn card_record(&self, card_id: &str) -> Result<Option<CardRecord>> {
        let data = self.load_analytics()?;
        Ok(data.cards.get(card_id).cloned())
    }

    /// Recent review events for a card, oldest first
    pub fn history(&self, card_id: &str) -> Result<Vec<ReviewEvent>> {
        Ok(self
            .card_record(card_id)?
            .map(|record| record.history.into_iter().collect())
            .unwrap_or_default())
    }

    /// IDs of due cards, most overdue first. `deck` restricts to one topic.
    pub fn due_cards(&self, deck: Option<&str>) -> Result<Vec<String>> {
        let schedules: ScheduleMap = self.repo.load_or_default(SCHEDULES_KEY)?.value;
        let data = self.load_analytics()?;
        let now = self.clock.now();

        let mut due: Vec<&CardScheduleState> = schedules
            .values()
            .filter(|s| s.is_due(now))
            .filter(|s| in_deck(&data, &s.card_id, deck))
            .collect();
        due.sort_by(|a, b| a.next_review_at.cmp(&b.next_review_at));

        Ok(due.into_iter().map(|s| s.card_id.clone()).collect())
    }

    /// Cards in `topic` that were graded again or hard recently, weakest
    /// first, at most five
    pub fn get_weakest_cards(&self, topic: &str) -> Result<Vec<String>> {
        let data = self.load_analytics()?;

        let mut struggling: Vec<&CardRecord> = data
            .cards
            .values()
            .filter(|c| c.topic == topic && c.has_lapses())
            .collect();
        struggling.sort_by(|a, b| a.average_score().total_cmp(&b.average_score()));

        Ok(struggling
            .into_iter()
            .take(WEAKEST_CARDS_LIMIT)
            .map(|c| c.card_id.clone())
            .collect())
    }

    // ==================== Analytics ====================

    /// Aggregate metrics over all tracked cards, or one topic's cards
    pub fn get_analytics(&self, deck: Option<&str>) -> Result<DeckAnalytics> {
        let data = self.load_analytics()?;
        let schedules: ScheduleMap = self.repo.load_or_default(SCHEDULES_KEY)?.value;
        let now = self.clock.now();

        let cards: Vec<&CardRecord> = data
            .cards
            .values()
            .filter(|c| deck.map_or(true, |d| c.topic == d))
            .collect();

        let total_reviews: u32 = cards.iter().map(|c| c.reviews).sum();
        let score_sum: u64 = cards.iter().map(|c| c.score_sum).sum();
        let average_score = if total_reviews == 0 {
            0.0
        } else {
            score_sum as f64 / f64::from(total_reviews)
        };

        let retained = cards.iter().filter(|c| c.is_retained()).count();
        let retention_rate = if cards.is_empty() {
            0.0
        } else {
            retained as f64 / cards.len() as f64 * 100.0
        };

        let due_cards = schedules
            .values()
            .filter(|s| s.is_due(now) && in_deck(&data, &s.card_id, deck))
            .count();

        let topics = match deck {
            Some(d) => data.topics.get(d).map(TopicSummary::from).into_iter().collect(),
            None => data.topics.rollups(),
        };

        Ok(DeckAnalytics {
            total_reviews,
            average_score,
            retention_rate,
            due_cards,
            topics,
        })
    }

    pub fn topic_stats(&self) -> Result<Vec<TopicSummary>> {
        Ok(self.load_analytics()?.topics.rollups())
    }

    /// Topics averaging below `threshold`, weakest first
    pub fn weak_topics(&self, threshold: f64) -> Result<Vec<TopicSummary>> {
        Ok(self.load_analytics()?.topics.weak_topics(threshold))
    }

    /// Recompute topic rollups from per-card counters
    pub fn rebuild_topics(&self) -> Result<()> {
        self.repo
            .update(ANALYTICS_KEY, |data: &mut FlashcardAnalyticsData| {
                data.topics = TopicAggregator::rebuild(data.cards.values());
                Ok::<_, FlashcardError>(())
            })?;
        log::info!("Rebuilt flashcard topic rollups");
        Ok(())
    }

    /// Forget all schedules and review history
    pub fn clear_all(&self) -> Result<()> {
        self.repo.remove(SCHEDULES_KEY)?;
        self.repo.remove(ANALYTICS_KEY)?;
        log::info!("Cleared flashcard schedules and analytics");
        Ok(())
    }

    fn load_analytics(&self) -> Result<FlashcardAnalyticsData> {
        Ok(self.repo.load_or_default(ANALYTICS_KEY)?.value)
    }
}

/// Cards without an analytics record only match when no deck is given
fn in_deck(data: &FlashcardAnalyticsData, card_id: &str, deck: Option<&str>) -> bool {
    match deck {
        None => true,
        Some(d) => data.cards.get(card_id).map_or(false, |c| c.topic == d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{DurableStore, MemoryStore, RecoveryPolicy};
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_ledger() -> (CardLedger, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 2, 14, 0, 0).unwrap(),
        ));
        let ledger = CardLedger::new(Repository::new(store.clone()), clock.clone());
        (ledger, clock, store)
    }

    #[test]
    fn test_review_creates_schedule_lazily() {
        let (ledger, clock, _) = create_test_ledger();
        assert!(ledger.schedule("cpr-01").unwrap().is_none());

        let state = ledger.review_card("cpr-01", "cardiology", Grade::Good, 4000).unwrap();
        assert_eq!(state.interval, 1);
        assert_eq!(state.repetitions, 1);
        assert_eq!(state.last_reviewed_at, Some(clock.now()));

        let stored = ledger.schedule("cpr-01").unwrap().unwrap();
        assert_eq!(stored, state);

        let record = ledger.card_record("cpr-01").unwrap().unwrap();
        assert_eq!(record.reviews, 1);
        assert_eq!(record.score_sum, 80);
        assert_eq!(record.last_reviewed_at, Some(clock.now()));
        assert_eq!(record.history[0].previous_interval, 1);
        assert_eq!(record.history[0].time_spent_ms, 4000);
    }

    #[test]
    fn test_history_keeps_most_recent_twenty() {
        let (ledger, clock, _) = create_test_ledger();
        let mut timestamps = Vec::new();
        for _ in 0..25 {
            timestamps.push(clock.now());
            ledger.review_card("bvm-02", "airway", Grade::Good, 1000).unwrap();
            clock.advance(Duration::minutes(5));
        }

        let history = ledger.history("bvm-02").unwrap();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        let kept: Vec<_> = history.iter().map(|e| e.timestamp).collect();
        assert_eq!(kept, timestamps[5..].to_vec());

        // Counters still reflect every review
        assert_eq!(ledger.card_record("bvm-02").unwrap().unwrap().reviews, 25);
    }

    #[test]
    fn test_replayed_event_double_counts() {
        let (ledger, clock, _) = create_test_ledger();
        let before = CardScheduleState::new("x", clock.now());
        let after = algorithm::schedule(&before, Grade::Easy, clock.now()).unwrap();
        let event = ReviewEvent::from_transition("trauma", Grade::Easy, 0, &before, &after, clock.now());

        ledger.record_review(&event).unwrap();
        ledger.record_review(&event).unwrap();

        let record = ledger.card_record("x").unwrap().unwrap();
        assert_eq!(record.reviews, 2);
        assert_eq!(record.score_sum, 200);
    }

    #[test]
    fn test_record_review_rejects_bad_score() {
        let (ledger, clock, _) = create_test_ledger();
        let state = CardScheduleState::new("x", clock.now());
        let mut event = ReviewEvent::from_transition("t", Grade::Good, 0, &state, &state, clock.now());
        event.score = 140;
        assert!(matches!(
            ledger.record_review(&event),
            Err(FlashcardError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_due_cards_follow_clock() {
        let (ledger, clock, _) = create_test_ledger();
        ledger.review_card("aed-01", "cardiology", Grade::Good, 0).unwrap();

        assert_eq!(ledger.get_analytics(None).unwrap().due_cards, 0);
        assert!(ledger.due_cards(None).unwrap().is_empty());

        clock.advance(Duration::days(1) + Duration::seconds(1));
        assert_eq!(ledger.get_analytics(None).unwrap().due_cards, 1);
        assert_eq!(ledger.due_cards(Some("cardiology")).unwrap(), vec!["aed-01"]);
        assert!(ledger.due_cards(Some("airway")).unwrap().is_empty());
    }

    #[test]
    fn test_analytics() {
        let (ledger, _, _) = create_test_ledger();

        let empty = ledger.get_analytics(None).unwrap();
        assert_eq!(empty.total_reviews, 0);
        assert_eq!(empty.average_score, 0.0);
        assert_eq!(empty.retention_rate, 0.0);

        // Retained: three reviews averaging 80+
        for grade in [Grade::Good, Grade::Easy, Grade::Good] {
            ledger.review_card("a", "airway", grade, 0).unwrap();
        }
        // Not retained: only two reviews
        for grade in [Grade::Easy, Grade::Easy] {
            ledger.review_card("b", "airway", grade, 0).unwrap();
        }
        // Not retained: low average
        for grade in [Grade::Again, Grade::Hard, Grade::Good, Grade::Good] {
            ledger.review_card("c", "trauma", grade, 0).unwrap();
        }

        let all = ledger.get_analytics(None).unwrap();
        assert_eq!(all.total_reviews, 9);
        assert!((all.average_score - 670.0 / 9.0).abs() < 1e-9);
        assert!((all.retention_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(all.topics.len(), 2);

        let airway = ledger.get_analytics(Some("airway")).unwrap();
        assert_eq!(airway.total_reviews, 5);
        assert!((airway.retention_rate - 50.0).abs() < 1e-9);
        assert_eq!(airway.topics.len(), 1);
        assert_eq!(airway.topics[0].card_count, 2);
    }

    #[test]
    fn test_weakest_cards() {
        let (ledger, _, _) = create_test_ledger();

        // Only cards with an again/hard in their history qualify
        ledger.review_card("solid", "medical", Grade::Easy, 0).unwrap();
        for i in 0..7 {
            let id = format!("weak-{}", i);
            ledger.review_card(&id, "medical", Grade::Hard, 0).unwrap();
            for _ in 0..i {
                ledger.review_card(&id, "medical", Grade::Easy, 0).unwrap();
            }
        }
        ledger.review_card("other-topic", "trauma", Grade::Again, 0).unwrap();

        let weakest = ledger.get_weakest_cards("medical").unwrap();
        assert_eq!(weakest, vec!["weak-0", "weak-1", "weak-2", "weak-3", "weak-4"]);
        assert!(ledger.get_weakest_cards("pediatrics").unwrap().is_empty());
    }

    #[test]
    fn test_weak_topics_and_rebuild() {
        let (ledger, _, store) = create_test_ledger();
        ledger.review_card("a", "airway", Grade::Again, 0).unwrap();
        ledger.review_card("b", "cardiology", Grade::Easy, 0).unwrap();

        let weak = ledger.weak_topics(70.0).unwrap();
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].topic, "airway");

        // Drop the topic rollups and rebuild them from card counters
        let raw = store.get(ANALYTICS_KEY).unwrap().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        value["data"]["topics"] = serde_json::json!({});
        store.set(ANALYTICS_KEY, &value.to_string()).unwrap();
        assert!(ledger.topic_stats().unwrap().is_empty());

        ledger.rebuild_topics().unwrap();
        let topics = ledger.topic_stats().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].topic, "airway");
        assert_eq!(topics[0].reviews, 1);
    }

    #[test]
    fn test_corrupt_analytics_is_observable() {
        let (ledger, clock, store) = create_test_ledger();
        store.set(ANALYTICS_KEY, "{\"schemaVersion\":1,\"revision\":1,\"data\":42}").unwrap();

        let strict = CardLedger::new(
            Repository::new(store.clone()).with_policy(RecoveryPolicy::Strict),
            clock.clone(),
        );
        assert!(matches!(
            strict.get_analytics(None),
            Err(FlashcardError::Storage(StorageError::CorruptState { .. }))
        ));

        // The default policy starts over
        assert_eq!(ledger.get_analytics(None).unwrap().total_reviews, 0);
        ledger.review_card("a", "airway", Grade::Good, 0).unwrap();
        assert_eq!(ledger.get_analytics(None).unwrap().total_reviews, 1);
    }

    #[test]
    fn test_failed_review_leaves_schedule_untouched() {
        let (ledger, clock, store) = create_test_ledger();
        ledger.review_card("c", "airway", Grade::Good, 0).unwrap();
        let scheduled = ledger.schedule("c").unwrap().unwrap();

        store.set(ANALYTICS_KEY, "{\"schemaVersion\":1,\"revision\":1,\"data\":42}").unwrap();
        let strict = CardLedger::new(
            Repository::new(store.clone()).with_policy(RecoveryPolicy::Strict),
            clock.clone(),
        );

        assert!(strict.review_card("c", "airway", Grade::Good, 0).is_err());
        assert_eq!(strict.schedule("c").unwrap(), Some(scheduled));

        // A card that was never scheduled stays unscheduled
        assert!(strict.review_card("new", "airway", Grade::Easy, 0).is_err());
        assert!(strict.schedule("new").unwrap().is_none());
    }

    #[test]
    fn test_card_keeps_its_topic() {
        let (ledger, _, _) = create_test_ledger();
        ledger.review_card("c", "airway", Grade::Good, 0).unwrap();
        let scheduled = ledger.schedule("c").unwrap().unwrap();

        assert!(matches!(
            ledger.review_card("c", "trauma", Grade::Again, 0),
            Err(FlashcardError::InvalidEvent(_))
        ));
        assert_eq!(ledger.schedule("c").unwrap(), Some(scheduled));

        let record = ledger.card_record("c").unwrap().unwrap();
        assert_eq!(record.topic, "airway");
        assert_eq!(record.reviews, 1);
        assert!(ledger.get_analytics(Some("trauma")).unwrap().topics.is_empty());

        let incremental = ledger.topic_stats().unwrap();
        ledger.rebuild_topics().unwrap();
        assert_eq!(ledger.topic_stats().unwrap(), incremental);
    }

    #[test]
    fn test_repeated_easy_reviews_stay_bounded() {
        let (ledger, _, _) = create_test_ledger();
        let mut state = None;
        for _ in 0..40 {
            state = Some(ledger.review_card("c", "airway", Grade::Easy, 0).unwrap());
        }
        let state = state.unwrap();
        assert_eq!(state.interval, algorithm::MAX_INTERVAL_DAYS);
        assert_eq!(ledger.card_record("c").unwrap().unwrap().reviews, 40);
    }

    #[test]
    fn test_clear_all() {
        let (ledger, _, _) = create_test_ledger();
        ledger.review_card("a", "airway", Grade::Good, 0).unwrap();
        ledger.clear_all().unwrap();
        assert!(ledger.schedule("a").unwrap().is_none());
        assert!(ledger.history("a").unwrap().is_empty());
    }
}
