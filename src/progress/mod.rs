//! Learner progress tracking
//!
//! Quiz results, flashcard deck mastery, PCR practice, chapter reading,
//! study sessions and the dashboard statistics derived from them.

pub mod models;
pub mod session;
pub mod storage;

pub use models::*;
pub use session::SessionTracker;
pub use storage::{calculate_streak, ProgressError, ProgressStore, PROGRESS_KEY};
