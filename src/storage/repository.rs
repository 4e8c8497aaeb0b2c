//! Typed, versioned access to a [`DurableStore`].
//!
//! Every blob is stored as
//! ```json
//! { "schemaVersion": 1, "revision": 12, "data": { ... } }
//! ```
//! `revision` increases by one on every write. Writers pass the revision they
//! read; a mismatch means another writer got there first and the write is
//! refused with [`StorageError::VersionConflict`]. The check and the write
//! are one [`DurableStore::compare_and_set`], so the guarantee is only as
//! strong as the store's: see [`super::FileStore`] for its limits.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::migration::{self, CURRENT_SCHEMA_VERSION};
use super::store::{DurableStore, Result, StorageError};

/// Default number of attempts for [`Repository::update`].
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 3;

/// What to do when a stored blob cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryPolicy {
    /// Surface [`StorageError::CorruptState`] to the caller
    Strict,
    /// Log a warning and continue from defaults
    ResetOnCorrupt,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::ResetOnCorrupt
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    schema_version: u32,
    revision: u64,
    data: T,
}

/// A decoded value together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub revision: u64,
    pub value: T,
}

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DurableStore>,
    policy: RecoveryPolicy,
    max_update_attempts: u32,
}

impl Repository {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            policy: RecoveryPolicy::default(),
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }

    pub fn policy(&self) -> RecoveryPolicy {
        self.policy
    }

    /// Load and decode the value under `key`.
    ///
    /// Returns `None` when nothing is stored. Decoding failures are always
    /// reported, regardless of the recovery policy. Legacy blobs are
    /// rewritten in the current envelope as a side effect.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Stamped<T>>> {
        let raw = match self.store.get(key)? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        let upgraded = migration::upgrade(key, &raw)?;
        let envelope: Envelope<T> =
            serde_json::from_value(upgraded.envelope.clone()).map_err(|e| {
                StorageError::CorruptState {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?;

        if upgraded.migrated {
            let json = serde_json::to_string_pretty(&upgraded.envelope)?;
            self.store.set(key, &json)?;
        }

        Ok(Some(Stamped {
            revision: envelope.revision,
            value: envelope.data,
        }))
    }

    /// Load the value under `key`, falling back to `T::default()` when it is
    /// missing, or when it is corrupt and the policy allows a reset.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<Stamped<T>> {
        match self.load(key) {
            Ok(Some(stamped)) => Ok(stamped),
            Ok(None) => Ok(Stamped {
                revision: 0,
                value: T::default(),
            }),
            Err(StorageError::CorruptState { key: k, reason })
                if self.policy == RecoveryPolicy::ResetOnCorrupt =>
            {
                log::warn!("Discarding corrupt state under '{}': {}", k, reason);
                Ok(Stamped {
                    revision: self.current_revision(key)?,
                    value: T::default(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Write `value` if the stored revision still equals `expected_revision`.
    ///
    /// Returns the new revision.
    pub fn save<T: Serialize>(&self, key: &str, value: &T, expected_revision: u64) -> Result<u64> {
        let raw = self.store.get(key)?;
        let found = raw.as_deref().map(migration::peek_revision).unwrap_or(0);
        if found != expected_revision {
            return Err(self.conflict(key, expected_revision, found));
        }

        let revision = found + 1;
        let json = encode(value, revision)?;
        if !self.store.compare_and_set(key, raw.as_deref(), &json)? {
            // Changed between our read and our write
            let found = self.current_revision(key)?;
            return Err(self.conflict(key, expected_revision, found));
        }
        Ok(revision)
    }

    /// Write `value` unconditionally, bumping the revision.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<u64> {
        let revision = self.current_revision(key)? + 1;
        self.store.set(key, &encode(value, revision)?)?;
        Ok(revision)
    }

    /// Read-modify-write under optimistic concurrency.
    ///
    /// `mutate` may run more than once if another writer changes the blob
    /// between our read and our write.
    pub fn update<T, R, E, F>(&self, key: &str, mut mutate: F) -> std::result::Result<R, E>
    where
        T: DeserializeOwned + Serialize + Default,
        E: From<StorageError>,
        F: FnMut(&mut T) -> std::result::Result<R, E>,
    {
        let mut attempt = 1;
        loop {
            let Stamped { revision, mut value } = self.load_or_default::<T>(key)?;
            let result = mutate(&mut value)?;
            match self.save(key, &value, revision) {
                Ok(_) => return Ok(result),
                Err(StorageError::VersionConflict { expected, found, .. })
                    if attempt < self.max_update_attempts =>
                {
                    log::warn!(
                        "Write conflict on '{}' (expected revision {}, found {}), retrying",
                        key,
                        expected,
                        found
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    fn current_revision(&self, key: &str) -> Result<u64> {
        Ok(self
            .store
            .get(key)?
            .map(|raw| migration::peek_revision(&raw))
            .unwrap_or(0))
    }

    fn conflict(&self, key: &str, expected: u64, found: u64) -> StorageError {
        StorageError::VersionConflict {
            key: key.to_string(),
            expected,
            found,
        }
    }
}

fn encode<T: Serialize>(value: &T, revision: u64) -> Result<String> {
    let envelope = Envelope {
        schema_version: CURRENT_SCHEMA_VERSION,
        revision,
        data: value,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}
