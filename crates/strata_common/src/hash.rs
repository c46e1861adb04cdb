//! Content fingerprinting for source identity and staleness tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 128-bit XXH3 content fingerprint.
///
/// Two byte sequences with the same `ContentHash` are assumed identical.
/// Fingerprints identify text sources, track URL content for staleness, and
/// summarize whole source sets so that membership or modification changes
/// are detectable with a single comparison.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Fingerprints a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(data).to_le_bytes())
    }

    /// Fingerprints a string slice.
    pub fn of_str(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Returns the raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({self})")
    }
}
