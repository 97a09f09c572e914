//! Content checksums for generated artifacts
//!
//! The writer compares the checksum of freshly rendered output with the file
//! already on disk and leaves unchanged files alone.

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;

/// SHA-256 of rendered text, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(data)))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Checksum of a file's bytes; `None` when the file does not exist
    pub fn of_file(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(Self::from_bytes(&bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `content` hashes to this checksum
    pub fn matches(&self, content: &str) -> bool {
        *self == Self::from_str(content)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
