//! Durable key-value persistence
//!
//! A [`DurableStore`] holds opaque string blobs by key. [`Repository`] layers
//! typed, versioned envelopes with optimistic concurrency on top of it.

mod migration;
pub mod repository;
pub mod store;

pub use migration::CURRENT_SCHEMA_VERSION;
pub use repository::{Repository, RecoveryPolicy, Stamped, DEFAULT_MAX_UPDATE_ATTEMPTS};
pub use store::{DurableStore, FileStore, MemoryStore, StorageError};
