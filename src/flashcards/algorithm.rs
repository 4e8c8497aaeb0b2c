//! SM-2 Spaced Repetition Algorithm
//!
//! Implementation of the SuperMemo 2 algorithm for calculating
//! review intervals from the learner's self-reported recall.
//!
//! Grades map to SM-2 quality as:
//! - again: 0
//! - hard: 2
//! - good: 3
//! - easy: 4
//!
//! Any quality below 3 resets the card to a one-day interval.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::models::{add_days, CardScheduleState, Grade};

/// Minimum ease factor allowed
pub const MIN_EASE_FACTOR: f64 = 1.3;

/// Longest interval a card can be scheduled out, about a hundred years
pub const MAX_INTERVAL_DAYS: i32 = 36_500;

#[derive(Error, Debug, PartialEq)]
pub enum ScheduleError {
    #[error("Invalid schedule state for card {card_id}: {reason}")]
    InvalidScheduleState { card_id: String, reason: String },

    #[error("Next review for card {card_id} falls outside the supported date range")]
    DateOutOfRange { card_id: String },
}

/// Compute a card's schedule after a review graded `grade` at `now`.
///
/// Fails if the prior state breaks the schedule invariants (interval of at
/// least one day, finite ease factor no lower than [`MIN_EASE_FACTOR`]).
pub fn schedule(
    state: &CardScheduleState,
    grade: Grade,
    now: DateTime<Utc>,
) -> Result<CardScheduleState, ScheduleError> {
    validate(state)?;

    let quality = f64::from(grade.quality());
    let lapse = 5.0 - quality;

    // EF' = EF + (0.1 - (5-q) * (0.08 + (5-q) * 0.02))
    let ease_factor =
        (state.ease_factor + (0.1 - lapse * (0.08 + lapse * 0.02))).max(MIN_EASE_FACTOR);

    let (repetitions, interval) = if grade.quality() < 3 {
        (0, 1)
    } else {
        let repetitions = state.repetitions + 1;
        let interval = match repetitions {
            1 => 1,
            2 => 6,
            // The interval grows by the ease the card carried into this review
            _ => (f64::from(state.interval) * state.ease_factor)
                .round()
                .min(f64::from(MAX_INTERVAL_DAYS)) as i32,
        };
        (repetitions, interval.clamp(1, MAX_INTERVAL_DAYS))
    };

    let next_review_at =
        add_days(now, interval).ok_or_else(|| ScheduleError::DateOutOfRange {
            card_id: state.card_id.clone(),
        })?;

    Ok(CardScheduleState {
        card_id: state.card_id.clone(),
        interval,
        ease_factor,
        repetitions,
        next_review_at,
        last_reviewed_at: Some(now),
    })
}

fn validate(state: &CardScheduleState) -> Result<(), ScheduleError> {
    let reason = if state.interval < 1 {
        Some(format!("interval must be at least 1 day, got {}", state.interval))
    } else if !state.ease_factor.is_finite() {
        Some(format!("ease factor must be finite, got {}", state.ease_factor))
    } else if state.ease_factor < MIN_EASE_FACTOR {
        Some(format!(
            "ease factor must be at least {}, got {}",
            MIN_EASE_FACTOR, state.ease_factor
        ))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ScheduleError::InvalidScheduleState {
            card_id: state.card_id.clone(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Calculate the interval each grade would produce.
/// Used to label the rating buttons: [again, hard, good, easy]
pub fn preview_intervals(
    state: &CardScheduleState,
    now: DateTime<Utc>,
) -> Result<[i32; 4], ScheduleError> {
    let mut intervals = [0; 4];
    for (slot, grade) in intervals.iter_mut().zip(Grade::ALL) {
        *slot = schedule(state, grade, now)?.interval;
    }
    Ok(intervals)
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: i32) -> String {
    if days <= 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap()
    }

    fn new_card_state() -> CardScheduleState {
        CardScheduleState::new("airway-01", now())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_three_good_reviews_from_new() {
        let first = schedule(&new_card_state(), Grade::Good, now()).unwrap();
        assert_close(first.ease_factor, 2.36);
        assert_eq!(first.interval, 1);
        assert_eq!(first.repetitions, 1);

        let second = schedule(&first, Grade::Good, now()).unwrap();
        assert_close(second.ease_factor, 2.22);
        assert_eq!(second.interval, 6);

        let third = schedule(&second, Grade::Good, now()).unwrap();
        assert_close(third.ease_factor, 2.08);
        assert_eq!(third.interval, 13);
        assert_eq!(third.repetitions, 3);
    }

    #[test]
    fn test_again_resets() {
        let mut state = new_card_state();
        state.repetitions = 7;
        state.interval = 45;
        state.ease_factor = 2.9;

        let result = schedule(&state, Grade::Again, now()).unwrap();
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
    }

    #[test]
    fn test_hard_also_resets() {
        let mut state = new_card_state();
        state.repetitions = 3;
        state.interval = 12;

        let result = schedule(&state, Grade::Hard, now()).unwrap();
        assert_eq!(result.repetitions, 0);
        assert_eq!(result.interval, 1);
        assert_close(result.ease_factor, 2.5 - 0.32);
    }

    #[test]
    fn test_easy_keeps_ease() {
        let result = schedule(&new_card_state(), Grade::Easy, now()).unwrap();
        assert_close(result.ease_factor, 2.5);
    }

    #[test]
    fn test_ease_factor_minimum() {
        let mut state = new_card_state();
        for i in 0..30 {
            let grade = if i % 2 == 0 { Grade::Again } else { Grade::Hard };
            state = schedule(&state, grade, now()).unwrap();
            assert!(state.ease_factor >= MIN_EASE_FACTOR);
        }
        assert_close(state.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn test_next_review_follows_interval() {
        let mut state = new_card_state();
        for _ in 0..4 {
            state = schedule(&state, Grade::Good, now()).unwrap();
            assert_eq!(state.last_reviewed_at, Some(now()));
            assert_eq!(
                state.next_review_at,
                now() + Duration::days(i64::from(state.interval))
            );
        }
    }

    #[test]
    fn test_interval_capped_under_repeated_easy() {
        let mut state = new_card_state();
        for _ in 0..40 {
            state = schedule(&state, Grade::Easy, now()).unwrap();
            assert!(state.interval >= 1 && state.interval <= MAX_INTERVAL_DAYS);
        }
        assert_eq!(state.interval, MAX_INTERVAL_DAYS);
        assert_eq!(
            state.next_review_at,
            now() + Duration::days(i64::from(MAX_INTERVAL_DAYS))
        );
    }

    #[test]
    fn test_unrepresentable_date_is_an_error() {
        let mut state = new_card_state();
        state.repetitions = 5;
        state.interval = 400;
        let near_end = DateTime::<Utc>::MAX_UTC - Duration::days(10);
        assert!(matches!(
            schedule(&state, Grade::Good, near_end),
            Err(ScheduleError::DateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_rejects_invalid_state() {
        let mut state = new_card_state();
        state.interval = -3;
        assert!(matches!(
            schedule(&state, Grade::Good, now()),
            Err(ScheduleError::InvalidScheduleState { .. })
        ));

        let mut state = new_card_state();
        state.ease_factor = f64::NAN;
        assert!(schedule(&state, Grade::Good, now()).is_err());

        let mut state = new_card_state();
        state.ease_factor = f64::INFINITY;
        assert!(schedule(&state, Grade::Easy, now()).is_err());
    }

    #[test]
    fn test_preview_intervals() {
        let mut state = new_card_state();
        state.repetitions = 2;
        state.interval = 6;
        state.ease_factor = 2.5;

        let preview = preview_intervals(&state, now()).unwrap();
        assert_eq!(preview, [1, 1, 15, 15]);
    }

    #[test]
    fn test_format_interval() {
        assert_eq!(format_interval(0), "now");
        assert_eq!(format_interval(1), "1d");
        assert_eq!(format_interval(5), "5d");
        assert_eq!(format_interval(7), "1w");
        assert_eq!(format_interval(14), "2w");
        assert_eq!(format_interval(30), "1mo");
        assert_eq!(format_interval(90), "3mo");
        assert_eq!(format_interval(365), "1y");
        assert_eq!(format_interval(730), "2y");
    }
}
