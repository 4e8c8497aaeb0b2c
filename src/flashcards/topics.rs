//! Per-topic rollups of review events.
//!
//! Topic counters are derived data: they are only ever advanced by
//! [`TopicAggregator::apply`] while a review is recorded, and can be rebuilt
//! from the per-card counters at any time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::models::{CardRecord, ReviewEvent, TopicStats, TopicSummary};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicAggregator {
    topics: BTreeMap<String, TopicStats>,
}

impl TopicAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a review event into its topic
    pub(crate) fn apply(&mut self, event: &ReviewEvent) {
        let stats = self
            .topics
            .entry(event.topic.clone())
            .or_insert_with(|| TopicStats::new(event.topic.clone()));
        stats.reviews += 1;
        stats.score_sum += u64::from(event.score);
        stats.card_ids.insert(event.card_id.clone());
    }

    /// Recompute every topic from per-card counters
    pub fn rebuild<'a>(cards: impl IntoIterator<Item = &'a CardRecord>) -> Self {
        let mut aggregator = Self::new();
        for card in cards {
            let stats = aggregator
                .topics
                .entry(card.topic.clone())
                .or_insert_with(|| TopicStats::new(card.topic.clone()));
            stats.reviews += card.reviews;
            stats.score_sum += card.score_sum;
            stats.card_ids.insert(card.card_id.clone());
        }
        aggregator
    }

    pub fn get(&self, topic: &str) -> Option<&TopicStats> {
        self.topics.get(topic)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Summaries for every topic, in topic name order
    pub fn rollups(&self) -> Vec<TopicSummary> {
        self.topics.values().map(TopicSummary::from).collect()
    }

    /// Reviewed topics whose average score is below `threshold`, weakest first
    pub fn weak_topics(&self, threshold: f64) -> Vec<TopicSummary> {
        let mut weak: Vec<TopicSummary> = self
            .topics
            .values()
            .filter(|s| s.reviews > 0 && s.average_score() < threshold)
            .map(TopicSummary::from)
            .collect();
        weak.sort_by(|a, b| a.average_score.total_cmp(&b.average_score));
        weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flashcards::models::Grade;
    use chrono::{TimeZone, Utc};

    fn event(card_id: &str, topic: &str, grade: Grade) -> ReviewEvent {
        ReviewEvent {
            card_id: card_id.to_string(),
            topic: topic.to_string(),
            grade,
            score: grade.score(),
            time_spent_ms: 1500,
            previous_interval: 1,
            new_interval: 1,
            ease_factor: 2.5,
            timestamp: Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_apply_accumulates() {
        let mut topics = TopicAggregator::new();
        topics.apply(&event("c1", "airway", Grade::Good));
        topics.apply(&event("c1", "airway", Grade::Easy));
        topics.apply(&event("c2", "airway", Grade::Again));

        let airway = topics.get("airway").unwrap();
        assert_eq!(airway.reviews, 3);
        assert_eq!(airway.score_sum, 180);
        assert_eq!(airway.card_ids.len(), 2);
        assert!((airway.average_score() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_weak_topics_sorted() {
        let mut topics = TopicAggregator::new();
        topics.apply(&event("c1", "cardiology", Grade::Hard));
        topics.apply(&event("c2", "trauma", Grade::Again));
        topics.apply(&event("c3", "airway", Grade::Easy));

        let weak = topics.weak_topics(70.0);
        let names: Vec<_> = weak.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["trauma", "cardiology"]);
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let events = [
            event("c1", "airway", Grade::Good),
            event("c1", "airway", Grade::Hard),
            event("c2", "medical", Grade::Easy),
        ];

        let mut incremental = TopicAggregator::new();
        let mut cards: BTreeMap<String, CardRecord> = BTreeMap::new();
        for e in &events {
            incremental.apply(e);
            cards
                .entry(e.card_id.clone())
                .or_insert_with(|| CardRecord::new(e.card_id.clone(), e.topic.clone()))
                .apply(e);
        }

        let rebuilt = TopicAggregator::rebuild(cards.values());
        assert_eq!(rebuilt.rollups(), incremental.rollups());
    }
}
