//! Error types for source access and compilation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Errors raised while obtaining source text or staleness signals.
///
/// These surface through [`Source::read`](crate::Source::read) and through
/// compilation as the underlying cause of a [`CompileError`]. Staleness
/// queries themselves never fail; an unreadable origin degrades to an
/// unchanged or empty observation instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// A source file could not be read.
    #[error("failed to read source file {path}: {source}")]
    FileRead {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: Arc<std::io::Error>,
    },

    /// URL content could not be fetched.
    #[error("failed to fetch url '{url}': {reason}")]
    UrlFetch {
        /// The URL that could not be fetched.
        url: String,
        /// Description of the fetch failure.
        reason: String,
    },

    /// A URL source was requested but no fetcher is configured.
    #[error("no url fetcher configured for url '{url}'")]
    NoFetcher {
        /// The URL that was requested.
        url: String,
    },
}

/// A source collection failed to compile.
///
/// Carries the name of the offending [`Sources`](crate::Sources), a
/// description of the failure, an optional shared underlying cause, and the
/// time the failure was captured. Cheaply cloneable so the engine can keep
/// it as last-update-error state while the previous snapshot keeps serving.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to compile sources '{sources_name}': {detail}")]
pub struct CompileError {
    /// Name of the sources collection that failed to compile.
    pub sources_name: String,
    /// Description of the compilation failure.
    pub detail: String,
    /// The underlying cause, when one exists.
    pub cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// When the failure was captured.
    pub timestamp: SystemTime,
}

impl CompileError {
    /// Creates a compile error captured now.
    pub fn new(sources_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            sources_name: sources_name.into(),
            detail: detail.into(),
            cause: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Attaches an underlying cause.
    pub fn with_cause(mut self, cause: Arc<dyn std::error::Error + Send + Sync>) -> Self {
        self.cause = Some(cause);
        self
    }
}
