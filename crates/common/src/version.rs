use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format version of the running engine. Persisted into every metadata file
/// and compared exact-match before a payload is touched.
pub const FORMAT_VERSION: SaveVersion = SaveVersion::new(1, 0, 0);

/// Semantic version triple for persisted save data.
///
/// The load gate requires an exact match: both older and newer files are
/// rejected, there is no migration path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl SaveVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for SaveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Error parsing a `major.minor.patch` string.
#[derive(Debug, thiserror::Error)]
#[error("invalid save version `{input}`")]
pub struct VersionParseError {
    pub input: String,
}

impl FromStr for SaveVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError {
            input: s.to_string(),
        };
        let mut parts = s.split('.');
        let mut next = || -> Result<u16, VersionParseError> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };
        let version = Self::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}
