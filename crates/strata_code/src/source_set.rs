//! Deduplicated, deterministically ordered collections of sources.

use crate::source::Source;
use std::collections::BTreeMap;
use std::sync::Arc;

use strata_common::ContentHash;

/// A set of sources, deduplicated by id and iterated in id order.
///
/// Inserting a source whose id is already present replaces the previous
/// entry. The deterministic ordering makes set fingerprints reproducible,
/// which is what the staleness trackers compare across latency windows.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: BTreeMap<String, Arc<dyn Source>>,
}

impl SourceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from an iterator of sources, deduplicating by id.
    pub fn from_sources<I: IntoIterator<Item = Arc<dyn Source>>>(sources: I) -> Self {
        let mut set = Self::new();
        for source in sources {
            set.insert(source);
        }
        set
    }

    /// Inserts a source, replacing any previous source with the same id.
    pub fn insert(&mut self, source: Arc<dyn Source>) {
        self.sources.insert(source.id().to_string(), source);
    }

    /// Looks up a source by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.get(id)
    }

    /// Returns `true` if a source with the given id is present.
    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Returns the number of sources in the set.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Iterates the sources in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.values()
    }

    /// Fingerprints the set's (id, last_modified) pairs.
    ///
    /// The fingerprint changes when membership changes or when any member's
    /// staleness marker moves, which is exactly the signal the aggregate
    /// change trackers need.
    pub fn fingerprint(&self) -> ContentHash {
        let mut buf = Vec::with_capacity(self.sources.len() * 32);
        for source in self.sources.values() {
            buf.extend_from_slice(source.id().as_bytes());
            buf.push(0);
            buf.extend_from_slice(&source.last_modified().to_le_bytes());
            buf.push(b'\n');
        }
        ContentHash::from_bytes(&buf)
    }
}
