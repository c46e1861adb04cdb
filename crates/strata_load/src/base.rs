//! The externally supplied scope below the bottom layer.

use crate::unit::Unit;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Resolves names below layer 0 of a stack.
///
/// This is the host's pre-existing namespace: the stack delegates to it
/// when no layer covers a name, and the conflict analyzer probes it for
/// names that would shadow or be shadowed by compiled layers. Must be safe
/// to query from multiple threads.
pub trait BaseResolver: fmt::Debug + Send + Sync {
    /// Resolves a unit by name, or reports it absent.
    fn resolve(&self, name: &str) -> Option<Arc<Unit>>;

    /// Existence probe used by conflict checking.
    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// A fixed, map-backed base resolver.
#[derive(Debug, Default)]
pub struct StaticBase {
    units: BTreeMap<String, Arc<Unit>>,
}

impl StaticBase {
    /// Creates an empty base.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unit with the given name and payload.
    pub fn with_unit(mut self, name: impl Into<String>, payload: &[u8]) -> Self {
        let name = name.into();
        self.units.insert(
            name.clone(),
            Arc::new(Unit::from_artifact(&strata_code::Artifact::new(
                name, payload,
            ))),
        );
        self
    }
}

impl BaseResolver for StaticBase {
    fn resolve(&self, name: &str) -> Option<Arc<Unit>> {
        self.units.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_units() {
        let base = StaticBase::new().with_unit("io.File", b"base-io-file");
        assert!(base.resolve("io.File").is_some());
        assert!(base.resolve("Missing").is_none());
        assert!(base.contains("io.File"));
        assert!(!base.contains("Missing"));
    }

    #[test]
    fn same_name_resolves_to_same_unit() {
        let base = StaticBase::new().with_unit("A", b"x");
        let first = base.resolve("A").unwrap();
        let second = base.resolve("A").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
