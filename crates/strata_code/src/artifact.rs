//! Compiled artifacts and the immutable result of compiling one snapshot.

use crate::source::Source;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One compiled, named, runnable payload.
///
/// The payload is opaque to this core; the host's execution layer knows how
/// to run it.
#[derive(Debug, Clone)]
pub struct Artifact {
    name: String,
    payload: Arc<[u8]>,
}

impl Artifact {
    /// Creates an artifact from a unit name and its compiled payload.
    pub fn new(name: impl Into<String>, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Returns the unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the compiled payload.
    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }
}

/// The units a single source contributed to an [`ArtifactSet`].
#[derive(Debug, Clone)]
pub struct SourceUnits {
    /// The unit used when the source is addressed by origin alone.
    pub main_unit: String,
    /// All unit names the source compiled into, main unit included.
    pub unit_names: Vec<String>,
}

/// The immutable result of compiling one `Sources` snapshot.
///
/// Maps unit names to artifacts and each contained source to its units,
/// and records the `Sources` name together with the `last_modified` value
/// observed at compile time. The engine compares that token against the
/// live value to decide whether this set is stale. Identity is per set:
/// equal content compiled in two snapshots yields two independent sets.
#[derive(Debug)]
pub struct ArtifactSet {
    sources_name: String,
    sources_last_modified: i64,
    artifacts: BTreeMap<String, Artifact>,
    source_units: BTreeMap<String, SourceUnits>,
}

impl ArtifactSet {
    /// Starts building a set for the named sources snapshot.
    pub fn builder(
        sources_name: impl Into<String>,
        sources_last_modified: i64,
    ) -> ArtifactSetBuilder {
        ArtifactSetBuilder {
            set: ArtifactSet {
                sources_name: sources_name.into(),
                sources_last_modified,
                artifacts: BTreeMap::new(),
                source_units: BTreeMap::new(),
            },
        }
    }

    /// Creates a set containing no units, for the zero-layer stack.
    pub fn empty(sources_name: impl Into<String>) -> Self {
        Self::builder(sources_name, 0).build()
    }

    /// Returns the name of the sources this set was compiled from.
    pub fn sources_name(&self) -> &str {
        &self.sources_name
    }

    /// Returns the sources' `last_modified` observed at compile time.
    pub fn sources_last_modified(&self) -> i64 {
        self.sources_last_modified
    }

    /// Returns `true` if this set was compiled from the given source.
    pub fn is_for_source(&self, source: &dyn Source) -> bool {
        self.is_for_source_id(source.id())
    }

    /// Returns `true` if this set was compiled from a source with this id.
    pub fn is_for_source_id(&self, source_id: &str) -> bool {
        self.source_units.contains_key(source_id)
    }

    /// Returns the main unit name of the given source, if covered here.
    pub fn main_unit_name(&self, source: &dyn Source) -> Option<&str> {
        self.source_units
            .get(source.id())
            .map(|units| units.main_unit.as_str())
    }

    /// Returns all unit names the given source compiled into.
    pub fn unit_names(&self, source: &dyn Source) -> Option<&[String]> {
        self.source_units
            .get(source.id())
            .map(|units| units.unit_names.as_slice())
    }

    /// Looks up an artifact by unit name.
    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Iterates every unit name in the set, in name order.
    pub fn all_unit_names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Returns the number of units in the set.
    pub fn unit_count(&self) -> usize {
        self.artifacts.len()
    }
}

/// Builder for [`ArtifactSet`]; used by `Compiler` implementations.
pub struct ArtifactSetBuilder {
    set: ArtifactSet,
}

impl ArtifactSetBuilder {
    /// Adds one compiled artifact, replacing any previous unit of that name.
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.set.artifacts.insert(artifact.name.clone(), artifact);
        self
    }

    /// Records which units a source compiled into.
    pub fn source_units(
        mut self,
        source_id: impl Into<String>,
        main_unit: impl Into<String>,
        unit_names: Vec<String>,
    ) -> Self {
        self.set.source_units.insert(
            source_id.into(),
            SourceUnits {
                main_unit: main_unit.into(),
                unit_names,
            },
        );
        self
    }

    /// Finishes the set.
    pub fn build(self) -> ArtifactSet {
        self.set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::MockSource;

    fn sample_set() -> ArtifactSet {
        ArtifactSet::builder("layer0", 1000)
            .artifact(Artifact::new("Greeter", b"payload-greeter".as_slice()))
            .artifact(Artifact::new("Helper", b"payload-helper".as_slice()))
            .source_units(
                "s1",
                "Greeter",
                vec!["Greeter".to_string(), "Helper".to_string()],
            )
            .build()
    }

    #[test]
    fn lookups_over_built_set() {
        let set = sample_set();
        assert_eq!(set.sources_name(), "layer0");
        assert_eq!(set.sources_last_modified(), 1000);
        assert_eq!(set.unit_count(), 2);
        assert!(set.artifact("Greeter").is_some());
        assert!(set.artifact("Missing").is_none());
    }

    #[test]
    fn source_coverage() {
        let set = sample_set();
        let covered = MockSource::new("s1", "");
        let other = MockSource::new("s2", "");
        assert!(set.is_for_source(covered.as_ref()));
        assert!(!set.is_for_source(other.as_ref()));
        assert_eq!(set.main_unit_name(covered.as_ref()), Some("Greeter"));
        assert_eq!(set.unit_names(covered.as_ref()).unwrap().len(), 2);
        assert!(set.main_unit_name(other.as_ref()).is_none());
    }

    #[test]
    fn unit_names_are_ordered() {
        let set = sample_set();
        let names: Vec<&str> = set.all_unit_names().collect();
        assert_eq!(names, vec!["Greeter", "Helper"]);
    }

    #[test]
    fn empty_set_has_no_units() {
        let set = ArtifactSet::empty("none");
        assert_eq!(set.unit_count(), 0);
        assert_eq!(set.sources_last_modified(), 0);
        assert!(!set.is_for_source_id("anything"));
    }

    #[test]
    fn artifact_payload_is_shared() {
        let a = Artifact::new("A", b"bytes".as_slice());
        let b = a.clone();
        assert!(Arc::ptr_eq(a.payload(), b.payload()));
    }
}
