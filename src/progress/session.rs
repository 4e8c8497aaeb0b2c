//! Study session bracketing

use super::models::{ActivityType, StudySession};
use super::storage::{ProgressError, ProgressStore, Result};

/// Opens and closes study sessions against a [`ProgressStore`].
///
/// Several sessions may be open at once; each is closed by its own ID.
pub struct SessionTracker<'a> {
    store: &'a ProgressStore,
}

impl<'a> SessionTracker<'a> {
    pub fn new(store: &'a ProgressStore) -> Self {
        Self { store }
    }

    pub fn start(&self, activity_type: ActivityType, resource_id: &str) -> Result<String> {
        self.store.start_session(activity_type, resource_id)
    }

    /// Close a session. Unknown or already closed IDs are ignored.
    pub fn end(&self, session_id: &str) -> Result<Option<StudySession>> {
        self.store.end_session(session_id)
    }

    pub fn open_sessions(&self) -> Result<Vec<StudySession>> {
        self.store.open_sessions()
    }

    /// Run `work` inside a session that is closed however `work` returns.
    pub fn track<T, E, F>(
        &self,
        activity_type: ActivityType,
        resource_id: &str,
        work: F,
    ) -> std::result::Result<T, E>
    where
        E: From<ProgressError>,
        F: FnOnce(&str) -> std::result::Result<T, E>,
    {
        let session_id = self.start(activity_type, resource_id)?;
        let outcome = work(&session_id);
        match self.end(&session_id) {
            Ok(_) => outcome,
            Err(e) => {
                log::warn!("Failed to close session {}: {}", session_id, e);
                match outcome {
                    Ok(_) => Err(e.into()),
                    Err(work_err) => Err(work_err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::{MemoryStore, Repository};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn create_test_store() -> (ProgressStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 9, 1, 18, 30, 0).unwrap(),
        ));
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        (ProgressStore::new(repo, clock.clone()), clock)
    }

    #[test]
    fn test_start_and_end() {
        let (store, clock) = create_test_store();
        let tracker = SessionTracker::new(&store);

        let id = tracker.start(ActivityType::Pcr, "pcr-chest-pain").unwrap();
        assert_eq!(tracker.open_sessions().unwrap().len(), 1);

        clock.advance(Duration::seconds(95));
        let closed = tracker.end(&id).unwrap().unwrap();
        assert_eq!(closed.duration, Some(95));
        assert_eq!(closed.resource_id, "pcr-chest-pain");
        assert!(tracker.open_sessions().unwrap().is_empty());
    }

    #[test]
    fn test_track_closes_on_success() {
        let (store, clock) = create_test_store();
        let tracker = SessionTracker::new(&store);

        let answer = tracker
            .track(ActivityType::Calculators, "apgar", |_| {
                clock.advance(Duration::minutes(2));
                Ok::<_, ProgressError>(7)
            })
            .unwrap();

        assert_eq!(answer, 7);
        assert!(tracker.open_sessions().unwrap().is_empty());
        assert_eq!(store.get_statistics().unwrap().total_study_time, 120);
    }

    #[test]
    fn test_track_closes_on_error() {
        let (store, clock) = create_test_store();
        let tracker = SessionTracker::new(&store);
        let started = clock.now();

        let result: std::result::Result<(), ProgressError> =
            tracker.track(ActivityType::Quiz, "q-obstetrics", |_| {
                clock.advance(Duration::seconds(30));
                Err(ProgressError::InvalidInput("abandoned".to_string()))
            });

        assert!(matches!(result, Err(ProgressError::InvalidInput(_))));
        let session = &store.get_progress().unwrap().study_sessions[0];
        assert!(!session.is_open());
        assert_eq!(session.start_time, started);
        assert_eq!(session.duration, Some(30));
    }
}
