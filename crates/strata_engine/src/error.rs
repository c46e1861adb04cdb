//! The engine-facing error taxonomy.

use crate::config::ConfigError;
use std::time::SystemTime;

use strata_code::CompileError;
use strata_load::{ConflictError, LoadError};

/// A loader handle was used against an engine that did not issue it.
///
/// This is an authorization failure, not a data error: the handle may be
/// perfectly valid for its own engine.
#[derive(Debug, Clone, thiserror::Error)]
#[error(
    "loader handle #{handle_number} was issued by engine #{issuing_engine_id}, not engine #{engine_id}"
)]
pub struct AuthorizationError {
    /// The engine that rejected the handle.
    pub engine_id: u64,
    /// The engine that issued the handle.
    pub issuing_engine_id: u64,
    /// The handle's sequence number within its issuing engine.
    pub handle_number: u64,
    /// When the failure was captured.
    pub timestamp: SystemTime,
}

impl AuthorizationError {
    /// Creates an authorization error captured now.
    pub fn new(engine_id: u64, issuing_engine_id: u64, handle_number: u64) -> Self {
        Self {
            engine_id,
            issuing_engine_id,
            handle_number,
            timestamp: SystemTime::now(),
        }
    }
}

/// Any failure surfaced by the engine's public operations.
///
/// Resolution-time errors are thrown synchronously to the caller that
/// triggered them; update-time compile and conflict failures are instead
/// recorded as the engine's last update error while the previous snapshot
/// keeps serving.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The engine configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A sources layer failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A name/unit inconsistency at resolution time.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Duplicate unit names across layers or against the fallback scope.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// A handle used against the wrong engine.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl EngineError {
    /// When the underlying failure was captured.
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::Config(e) => e.timestamp(),
            Self::Compile(e) => e.timestamp,
            Self::Load(e) => e.timestamp(),
            Self::Conflict(e) => e.timestamp,
            Self::Authorization(e) => e.timestamp,
        }
    }
}
