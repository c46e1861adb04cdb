//! Error types for resolution and conflict checking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use strata_code::ArtifactSet;

/// A name/unit inconsistency discovered at resolution time.
///
/// Always thrown synchronously to the caller that triggered it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    /// The source is unknown to every scope in the chain.
    #[error("source '{source_id}' not found in any scope of the chain")]
    SourceNotFound {
        /// Id of the unknown source.
        source_id: String,
        /// When the failure was captured.
        timestamp: SystemTime,
    },

    /// The requested unit name is not among the source's compiled units.
    #[error("unit '{name}' not found for source '{source_id}'")]
    UnitNotForSource {
        /// The requested unit name.
        name: String,
        /// Id of the source the request was routed by.
        source_id: String,
        /// When the failure was captured.
        timestamp: SystemTime,
    },

    /// An artifact set claims to cover a source but lacks one of its units.
    #[error(
        "inconsistent artifact set '{sources_name}': unit '{name}' missing for source '{source_id}'"
    )]
    InconsistentArtifactSet {
        /// Name of the sources the set was compiled from.
        sources_name: String,
        /// The missing unit name.
        name: String,
        /// Id of the covered source.
        source_id: String,
        /// When the failure was captured.
        timestamp: SystemTime,
    },
}

impl LoadError {
    /// Creates a [`LoadError::SourceNotFound`] captured now.
    pub fn source_not_found(source_id: impl Into<String>) -> Self {
        Self::SourceNotFound {
            source_id: source_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a [`LoadError::UnitNotForSource`] captured now.
    pub fn unit_not_for_source(name: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self::UnitNotForSource {
            name: name.into(),
            source_id: source_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// Creates a [`LoadError::InconsistentArtifactSet`] captured now.
    pub fn inconsistent(
        sources_name: impl Into<String>,
        name: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Self {
        Self::InconsistentArtifactSet {
            sources_name: sources_name.into(),
            name: name.into(),
            source_id: source_id.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// When the failure was captured.
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::SourceNotFound { timestamp, .. }
            | Self::UnitNotForSource { timestamp, .. }
            | Self::InconsistentArtifactSet { timestamp, .. } => *timestamp,
        }
    }
}

/// Duplicate unit names across layers or against the fallback scope.
///
/// Raised only when conflict checking is enabled; the offending snapshot is
/// rejected rather than installed.
#[derive(Debug, Clone)]
pub struct ConflictError {
    /// Unit names occurring in more than one layer, with the names of the
    /// sources collections containing them.
    pub duplicate_names: BTreeMap<String, Vec<String>>,
    /// Unit names that also resolve through the designated fallback scope.
    pub fallback_names: BTreeMap<String, Vec<String>>,
    /// When the conflict was captured.
    pub timestamp: SystemTime,
}

impl ConflictError {
    /// Builds a conflict error from the analyzer's layer maps.
    pub fn from_maps(
        duplicates: &BTreeMap<String, Vec<Arc<ArtifactSet>>>,
        fallback: &BTreeMap<String, Vec<Arc<ArtifactSet>>>,
    ) -> Self {
        let name_layers = |map: &BTreeMap<String, Vec<Arc<ArtifactSet>>>| -> BTreeMap<String, Vec<String>> {
            map.iter()
                .map(|(name, layers)| {
                    (
                        name.clone(),
                        layers
                            .iter()
                            .map(|layer| layer.sources_name().to_string())
                            .collect(),
                    )
                })
                .collect()
        };
        Self {
            duplicate_names: name_layers(duplicates),
            fallback_names: name_layers(fallback),
            timestamp: SystemTime::now(),
        }
    }

    /// Returns `true` if neither map holds a conflict.
    pub fn is_empty(&self) -> bool {
        self.duplicate_names.is_empty() && self.fallback_names.is_empty()
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |names: &BTreeMap<String, Vec<String>>| {
            names.keys().cloned().collect::<Vec<_>>().join(", ")
        };
        write!(
            f,
            "conflicting unit names: duplicates across layers: [{}], also in fallback scope: [{}]",
            list(&self.duplicate_names),
            list(&self.fallback_names)
        )
    }
}

impl std::error::Error for ConflictError {}
