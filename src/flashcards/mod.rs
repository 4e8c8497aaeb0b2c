//! Flashcard spaced repetition and mastery analytics
//!
//! This module provides:
//! - SM-2 scheduling from a recall grade
//! - A durable per-card review ledger with bounded history
//! - Per-topic rollups for weak-area detection

pub mod algorithm;
pub mod ledger;
pub mod models;
pub mod topics;

pub use algorithm::ScheduleError;
pub use ledger::{CardLedger, FlashcardError};
pub use models::*;
pub use topics::TopicAggregator;
