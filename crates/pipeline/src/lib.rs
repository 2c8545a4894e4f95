//! Byte-transform pipeline for persisted payloads.
//!
//! Write path: CBOR-serialize, compress, encrypt, then checksum the final
//! bytes into a metadata record. Read path strictly inverts and verifies the
//! checksum before decrypting, so tampered or corrupted payloads are
//! rejected without spending cycles on decryption or deserialization.
//!
//! Stages are strictly sequential: each stage's output is the next stage's
//! entire input.

mod compress;
mod encrypt;
mod integrity;

pub use compress::{Compressor, NoCompression, ZstdCompression};
pub use encrypt::{AesGcmEncryption, Encryptor, NoEncryption};
pub use integrity::ChecksumAlgo;

use keepsake_data::ChecksumRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors from the byte-transform pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("payload serialization failed: {0}")]
    Encode(String),
    #[error("payload deserialization failed: {0}")]
    Decode(String),
    #[error("compression stage failed: {0}")]
    Compression(String),
    #[error("encryption stage failed: {0}")]
    Encryption(String),
    #[error("unknown checksum algorithm `{0}`")]
    UnknownAlgorithm(String),
    #[error("integrity check failed ({algorithm}): expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        algorithm: String,
        expected: String,
        actual: String,
    },
}

/// The ordered transform chain. Each stage is an independently swappable
/// strategy; the default chain is zstd + no encryption + SHA-256.
pub struct Pipeline {
    compressor: Box<dyn Compressor>,
    encryptor: Box<dyn Encryptor>,
    checksum: ChecksumAlgo,
}

impl Pipeline {
    pub fn new(
        compressor: Box<dyn Compressor>,
        encryptor: Box<dyn Encryptor>,
        checksum: ChecksumAlgo,
    ) -> Self {
        Self {
            compressor,
            encryptor,
            checksum,
        }
    }

    /// Pass-through on every stage, for tests and debugging.
    pub fn plain() -> Self {
        Self::new(
            Box::new(NoCompression),
            Box::new(NoEncryption),
            ChecksumAlgo::None,
        )
    }

    /// Transform a value into final payload bytes plus the checksum record
    /// to persist in the metadata file.
    pub fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<(Vec<u8>, Option<ChecksumRecord>), PipelineError> {
        let mut serialized = Vec::new();
        ciborium::into_writer(value, &mut serialized)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        let compressed = self.compressor.compress(&serialized)?;
        let encrypted = self.encryptor.encrypt(&compressed)?;
        let checksum = self.checksum.digest(&encrypted);
        Ok((encrypted, checksum))
    }

    /// Invert [`Pipeline::encode`]. The checksum recorded at write time is
    /// verified against the raw bytes first; on mismatch nothing is
    /// decrypted or deserialized.
    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        checksum: Option<&ChecksumRecord>,
    ) -> Result<T, PipelineError> {
        if let Some(record) = checksum {
            integrity::verify(record, bytes)?;
        }
        let decrypted = self.encryptor.decrypt(bytes)?;
        let decompressed = self.compressor.decompress(&decrypted)?;
        ciborium::from_reader(decompressed.as_slice())
            .map_err(|e| PipelineError::Decode(e.to_string()))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(
            Box::new(ZstdCompression::default()),
            Box::new(NoEncryption),
            ChecksumAlgo::Sha256,
        )
    }
}
