//! The external compiler contract.

use crate::artifact::ArtifactSet;
use crate::error::CompileError;
use crate::sources::Sources;
use std::fmt;

/// Turns one consistent `Sources` snapshot into an [`ArtifactSet`].
///
/// Implementations are external collaborators. The contract:
///
/// - the returned set covers every source in the snapshot, and each
///   source's main unit resolves inside the same set;
/// - the set records `sources.last_modified()` as observed for the
///   compiled snapshot, so staleness can later be decided by comparing
///   that token against the live value;
/// - a failure names the offending sources and carries the underlying
///   cause.
///
/// Implementations must be callable from multiple threads; bounding
/// compilation latency is the implementation's responsibility, not this
/// core's.
pub trait Compiler: fmt::Debug + Send + Sync {
    /// Compiles a snapshot of the given sources.
    fn compile(&self, sources: &dyn Sources) -> Result<ArtifactSet, CompileError>;
}
