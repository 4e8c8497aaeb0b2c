//! Study progress and spaced repetition for EMT-B exam preparation.

use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod flashcards;
pub mod progress;
pub mod storage;

use clock::{Clock, SystemClock};
use config::Config;
use flashcards::CardLedger;
use progress::ProgressStore;
use storage::{DurableStore, FileStore, StorageError};

/// The stores a front end needs, sharing one backing store and clock
pub struct AppState {
    pub ledger: CardLedger,
    pub progress: ProgressStore,
}

impl AppState {
    /// Open file-backed stores in the configured data directory
    pub fn open(config: &Config) -> Result<Self, StorageError> {
        let data_dir = config.resolved_data_dir()?;
        log::info!("Using data directory {:?}", data_dir);
        let store = Arc::new(FileStore::new(data_dir)?);
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    pub fn with_store(
        config: &Config,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let repo = config.repository(store);
        Self {
            ledger: CardLedger::new(repo.clone(), clock.clone()),
            progress: ProgressStore::new(repo, clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::flashcards::Grade;
    use crate::progress::ActivityType;
    use crate::storage::MemoryStore;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_stores_share_backing_store() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 2, 9, 0, 0).unwrap(),
        ));
        let state = AppState::with_store(&Config::default(), store.clone(), clock);

        state
            .ledger
            .review_card("card-1", "airway", Grade::Good, 4000)
            .unwrap();
        state
            .progress
            .start_session(ActivityType::Flashcards, "airway")
            .unwrap();

        for key in ["flashcard-schedules", "flashcard-analytics", "user-progress"] {
            assert!(store.get(key).unwrap().is_some(), "missing {}", key);
        }
    }
}
