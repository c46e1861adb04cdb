//! Name-resolution precedence.

use serde::{Deserialize, Serialize};

/// Governs precedence when the same unit name exists both in a scope's own
/// artifact set and somewhere in its parent chain.
///
/// `ParentFirst` always prefers the farther (ancestor) definition, forcing
/// it if necessary; `CurrentFirst` always prefers the nearer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvePolicy {
    /// Delegate to the parent chain before this scope's own artifacts.
    ParentFirst,
    /// Define from this scope's own artifacts before delegating.
    CurrentFirst,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        ResolvePolicy::ParentFirst
    }
}
