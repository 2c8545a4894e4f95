use crate::PipelineError;
use keepsake_data::ChecksumRecord;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Integrity stage: which digest to record over the final payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgo {
    None,
    Crc32,
    Adler32,
    #[default]
    Sha256,
}

impl ChecksumAlgo {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Crc32 => "crc32",
            Self::Adler32 => "adler32",
            Self::Sha256 => "sha256",
        }
    }

    /// Digest the payload into a metadata record. `None` for the no-op algo.
    pub fn digest(&self, data: &[u8]) -> Option<ChecksumRecord> {
        let digest = match self {
            Self::None => return None,
            Self::Crc32 => format!("{:08x}", crc32fast::hash(data)),
            Self::Adler32 => {
                let mut adler = adler2::Adler32::new();
                adler.write_slice(data);
                format!("{:08x}", adler.checksum())
            }
            Self::Sha256 => format!("{:x}", Sha256::digest(data)),
        };
        Some(ChecksumRecord {
            algorithm: self.name().to_string(),
            digest,
        })
    }
}

impl FromStr for ChecksumAlgo {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "crc32" => Ok(Self::Crc32),
            "adler32" => Ok(Self::Adler32),
            "sha256" => Ok(Self::Sha256),
            other => Err(PipelineError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Verify stored record against raw payload bytes. The algorithm comes from
/// the record, so a reader can verify whatever the writer used.
pub(crate) fn verify(record: &ChecksumRecord, data: &[u8]) -> Result<(), PipelineError> {
    let algo: ChecksumAlgo = record.algorithm.parse()?;
    let Some(actual) = algo.digest(data) else {
        return Ok(());
    };
    if actual.digest != record.digest {
        return Err(PipelineError::IntegrityCheckFailed {
            algorithm: record.algorithm.clone(),
            expected: record.digest.clone(),
            actual: actual.digest,
        });
    }
    Ok(())
}
