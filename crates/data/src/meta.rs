use keepsake_common::SaveVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Checksum recorded for a persisted payload: algorithm name plus the
/// hex-encoded digest of the final (post-encryption) bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub algorithm: String,
    pub digest: String,
}

/// Sidecar metadata written next to, never inside, a payload file.
///
/// Cheap to read on its own, so saves can be listed and browsed without
/// deserializing payloads. The version field gates whether the payload is
/// even attempted to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetaData {
    pub version: SaveVersion,
    /// Last modification time, seconds since the Unix epoch.
    pub modified_unix: u64,
    /// Free-form host key/value bag (save name, playtime, thumbnail id, ...).
    pub custom: BTreeMap<String, String>,
    pub checksum: Option<ChecksumRecord>,
}

impl SaveMetaData {
    /// Metadata stamped with the current time and format version.
    pub fn now(custom: BTreeMap<String, String>, checksum: Option<ChecksumRecord>) -> Self {
        let modified_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: keepsake_common::FORMAT_VERSION,
            modified_unix,
            custom,
            checksum,
        }
    }
}
