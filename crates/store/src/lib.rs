//! File-backed persistence for save slots.
//!
//! Layout inside the store directory, one pair per slot:
//! ```text
//! <slot>.meta.json - version, timestamp, custom bag, checksum (plain JSON)
//! <slot>.save      - pipeline output (CBOR, possibly compressed/encrypted)
//! ```
//!
//! Metadata is always readable on its own, so saves can be listed and
//! browsed without touching payloads. Writes commit via temp file + rename;
//! a failed pipeline stage leaves the previous pair untouched.

use keepsake_common::FORMAT_VERSION;
use keepsake_data::{RootSaveData, SaveMetaData};
use keepsake_pipeline::{Pipeline, PipelineError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const META_SUFFIX: &str = ".meta.json";
const PAYLOAD_SUFFIX: &str = ".save";

/// Errors from file-backed save-slot operations. A missing slot and a
/// version mismatch are not errors; [`SaveStore::read`] reports them as
/// `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata error: {0}")]
    Meta(#[from] serde_json::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("invalid slot name `{0}`")]
    InvalidSlot(String),
}

/// A directory of save slots, written and read through one pipeline
/// configuration.
pub struct SaveStore {
    root: PathBuf,
    pipeline: Pipeline,
}

impl SaveStore {
    /// Open or create a store with the default pipeline.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::with_pipeline(dir, Pipeline::default())
    }

    /// Open or create a store with an explicit transform chain.
    pub fn with_pipeline(dir: impl AsRef<Path>, pipeline: Pipeline) -> Result<Self, StoreError> {
        let root = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, pipeline })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a document under a slot name. Encodes to memory first, then
    /// commits payload and metadata via rename, so a failure at any stage
    /// leaves the existing pair intact.
    pub fn write(
        &self,
        slot: &str,
        data: &RootSaveData,
        custom: BTreeMap<String, String>,
    ) -> Result<SaveMetaData, StoreError> {
        validate_slot(slot)?;
        let (payload, checksum) = self.pipeline.encode(data)?;
        let meta = SaveMetaData::now(custom, checksum);

        commit(&self.payload_path(slot), &payload)?;
        commit(&self.meta_path(slot), serde_json::to_vec_pretty(&meta)?.as_slice())?;
        debug!(slot, bytes = payload.len(), "save slot written");
        Ok(meta)
    }

    /// Load a slot. `Ok(None)` when no save exists or the metadata version
    /// does not exactly match the running format version; in the version
    /// case the payload is never touched. Corruption and tampering surface
    /// as errors.
    pub fn read(&self, slot: &str) -> Result<Option<RootSaveData>, StoreError> {
        validate_slot(slot)?;
        let Some(meta) = self.read_meta(slot)? else {
            return Ok(None);
        };
        if meta.version != FORMAT_VERSION {
            warn!(
                slot,
                file_version = %meta.version,
                running_version = %FORMAT_VERSION,
                "save version mismatch, not loading"
            );
            return Ok(None);
        }
        let payload_path = self.payload_path(slot);
        if !payload_path.exists() {
            warn!(slot, "metadata present but payload file missing");
            return Ok(None);
        }
        let bytes = std::fs::read(&payload_path)?;
        let data = self.pipeline.decode(&bytes, meta.checksum.as_ref())?;
        Ok(Some(data))
    }

    /// Read a slot's metadata without deserializing the payload.
    pub fn read_meta(&self, slot: &str) -> Result<Option<SaveMetaData>, StoreError> {
        validate_slot(slot)?;
        let path = self.meta_path(slot);
        if !path.exists() {
            return Ok(None);
        }
        let meta = serde_json::from_slice(&std::fs::read(&path)?)?;
        Ok(Some(meta))
    }

    /// Whether a complete slot (both files) exists.
    pub fn exists(&self, slot: &str) -> bool {
        self.meta_path(slot).exists() && self.payload_path(slot).exists()
    }

    /// Slot names with a metadata file, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut slots = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(slot) = name.strip_suffix(META_SUFFIX) {
                slots.push(slot.to_string());
            }
        }
        slots.sort();
        Ok(slots)
    }

    /// Remove a slot's file pair. Missing files are not an error.
    pub fn delete(&self, slot: &str) -> Result<(), StoreError> {
        validate_slot(slot)?;
        for path in [self.meta_path(slot), self.payload_path(slot)] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn meta_path(&self, slot: &str) -> PathBuf {
        self.root.join(format!("{slot}{META_SUFFIX}"))
    }

    fn payload_path(&self, slot: &str) -> PathBuf {
        self.root.join(format!("{slot}{PAYLOAD_SUFFIX}"))
    }
}

/// Slot names become file names; keep them to one path component.
fn validate_slot(slot: &str) -> Result<(), StoreError> {
    if slot.is_empty()
        || slot.contains(['/', '\\'])
        || slot.contains("..")
        || slot.starts_with('.')
    {
        return Err(StoreError::InvalidSlot(slot.to_string()));
    }
    Ok(())
}

/// Write-to-temp then rename, so readers never observe a half-written file.
fn commit(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
