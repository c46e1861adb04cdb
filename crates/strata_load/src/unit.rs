//! Defined units and the cleanup strategy applied at disposal.

use std::sync::Arc;

use strata_code::Artifact;

/// One defined, runnable unit: the result of materializing an
/// [`Artifact`] inside a scope.
///
/// All resolvers racing on the same (scope, name) observe the same
/// `Arc<Unit>`; the payload is shared with the originating artifact.
#[derive(Debug)]
pub struct Unit {
    name: String,
    payload: Arc<[u8]>,
}

impl Unit {
    /// Materializes a unit from a compiled artifact.
    pub fn from_artifact(artifact: &Artifact) -> Self {
        Self {
            name: artifact.name().to_string(),
            payload: Arc::clone(artifact.payload()),
        }
    }

    /// Returns the unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the runnable payload.
    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }
}

/// An individual cleanup call failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to release unit '{unit_name}': {reason}")]
pub struct ReleaseError {
    /// The unit whose cleanup failed.
    pub unit_name: String,
    /// Description of the failure.
    pub reason: String,
}

/// Cleanup strategy invoked once per ever-defined unit at disposal.
///
/// Cleanup is advisory, not transactional: callers swallow individual
/// failures and keep releasing the remaining units.
pub trait UnitReleaser: std::fmt::Debug + Send + Sync {
    /// Releases whatever the host associated with a defined unit.
    fn release(&self, unit: &Unit) -> Result<(), ReleaseError>;
}

/// A releaser that does nothing; the default when the host has no
/// per-unit cleanup.
#[derive(Debug, Default)]
pub struct NoopReleaser;

impl UnitReleaser for NoopReleaser {
    fn release(&self, _unit: &Unit) -> Result<(), ReleaseError> {
        Ok(())
    }
}
