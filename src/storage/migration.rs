//! Schema upgrades for stored blobs.
//!
//! Blobs written before the envelope existed are bare JSON documents (the
//! aggregate itself). They are treated as schema version 0 and wrapped into
//! the current envelope on first read. Blobs stamped with a version newer
//! than this build understands are rejected rather than overwritten.

use serde_json::{json, Map, Value};

use super::store::{Result, StorageError};

/// Version written into every envelope by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

pub(crate) const SCHEMA_VERSION_FIELD: &str = "schemaVersion";
pub(crate) const REVISION_FIELD: &str = "revision";
pub(crate) const DATA_FIELD: &str = "data";

/// Result of reading a raw blob.
pub struct Upgraded {
    /// A JSON object shaped like the current envelope
    pub envelope: Value,
    /// Whether the blob had to be migrated to get there
    pub migrated: bool,
}

/// Bring a raw stored blob up to [`CURRENT_SCHEMA_VERSION`].
pub fn upgrade(key: &str, raw: &str) -> Result<Upgraded> {
    let value: Value = serde_json::from_str(raw).map_err(|e| StorageError::CorruptState {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    let version = match &value {
        Value::Object(map) if map.contains_key(SCHEMA_VERSION_FIELD) => {
            Some(read_version(key, map)?)
        }
        _ => None,
    };

    match version {
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(Upgraded {
            envelope: value,
            migrated: false,
        }),
        Some(v) if v > CURRENT_SCHEMA_VERSION => Err(StorageError::UnsupportedVersion {
            key: key.to_string(),
            found: v,
        }),
        Some(_) => {
            // Explicit version 0: an envelope whose data predates versioning
            let data = match value {
                Value::Object(mut map) => map.remove(DATA_FIELD).unwrap_or(Value::Null),
                other => other,
            };
            log::info!("Migration: upgrading '{}' from schema version 0", key);
            Ok(Upgraded {
                envelope: wrap_legacy(data),
                migrated: true,
            })
        }
        None => {
            log::info!("Migration: wrapping unversioned blob under '{}'", key);
            Ok(Upgraded {
                envelope: wrap_legacy(value),
                migrated: true,
            })
        }
    }
}

/// Read the revision stamp of a raw blob without decoding its data.
///
/// Missing, legacy and unreadable blobs all count as revision 0.
pub fn peek_revision(raw: &str) -> u64 {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| v.get(REVISION_FIELD).and_then(Value::as_u64))
        .unwrap_or(0)
}

fn read_version(key: &str, map: &Map<String, Value>) -> Result<u32> {
    map.get(SCHEMA_VERSION_FIELD)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| StorageError::CorruptState {
            key: key.to_string(),
            reason: format!("'{}' is not a non-negative integer", SCHEMA_VERSION_FIELD),
        })
}

fn wrap_legacy(data: Value) -> Value {
    json!({
        SCHEMA_VERSION_FIELD: CURRENT_SCHEMA_VERSION,
        REVISION_FIELD: 0,
        DATA_FIELD: data,
    })
}
