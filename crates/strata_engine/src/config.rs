//! Engine configuration: TOML-loadable settings plus injected
//! collaborators, validated once and then frozen.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use strata_code::Compiler;
use strata_load::{BaseResolver, NoopReleaser, ResolvePolicy, UnitReleaser};

/// Upper bound on the update latency; beyond a day it is a configuration
/// mistake, not a tuning choice.
const MAX_UPDATE_LATENCY_MS: u64 = 86_400_000;

/// Errors raised while loading or validating engine configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read engine config {path}: {source}")]
    Io {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: Arc<std::io::Error>,
        /// When the failure was captured.
        timestamp: SystemTime,
    },

    /// The configuration could not be parsed as TOML.
    #[error("failed to parse engine config: {reason}")]
    Parse {
        /// Description of the parse failure.
        reason: String,
        /// When the failure was captured.
        timestamp: SystemTime,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid engine config: {reason}")]
    Invalid {
        /// Description of the invalid value.
        reason: String,
        /// When the failure was captured.
        timestamp: SystemTime,
    },
}

impl ConfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
            timestamp: SystemTime::now(),
        }
    }

    /// When the failure was captured.
    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::Io { timestamp, .. }
            | Self::Parse { timestamp, .. }
            | Self::Invalid { timestamp, .. } => *timestamp,
        }
    }
}

/// Declarative engine knobs, deserializable from TOML.
///
/// ```toml
/// update_latency_ms = 1000
/// layer_policy = "parent-first"
/// top_policy = "parent-first"
/// top_cache = true
/// check_layer_conflicts = false
/// check_fallback_conflicts = false
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Minimum interval between staleness sweeps across the layers, in
    /// milliseconds. Zero checks on every access.
    pub update_latency_ms: u64,

    /// Resolution policy chained through the static layers.
    pub layer_policy: ResolvePolicy,

    /// Precedence between the static layers and the on-demand cache.
    /// `parent-first` means precompiled layers win over ad hoc compiles.
    pub top_policy: ResolvePolicy,

    /// Whether sources unknown to the layers are compiled on demand.
    pub top_cache: bool,

    /// Reject snapshots with a unit name duplicated across layers.
    pub check_layer_conflicts: bool,

    /// Reject snapshots with a unit name also resolvable through the
    /// designated fallback scope.
    pub check_fallback_conflicts: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            update_latency_ms: 0,
            layer_policy: ResolvePolicy::ParentFirst,
            top_policy: ResolvePolicy::ParentFirst,
            top_cache: true,
            check_layer_conflicts: false,
            check_fallback_conflicts: false,
        }
    }
}

impl EngineSettings {
    /// Loads and validates settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: Arc::new(e),
            timestamp: SystemTime::now(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates settings from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: EngineSettings = toml::from_str(content).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
            timestamp: SystemTime::now(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges and internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_latency_ms > MAX_UPDATE_LATENCY_MS {
            return Err(ConfigError::invalid(format!(
                "update_latency_ms {} exceeds the maximum of {MAX_UPDATE_LATENCY_MS}",
                self.update_latency_ms
            )));
        }
        Ok(())
    }

    /// The update latency as a [`Duration`].
    pub fn update_latency(&self) -> Duration {
        Duration::from_millis(self.update_latency_ms)
    }
}

/// A frozen engine configuration: validated settings plus the injected
/// collaborators.
#[derive(Debug)]
pub struct EngineConfig {
    /// Declarative knobs.
    pub settings: EngineSettings,
    /// Compiler for on-demand single-source compilation. Required while
    /// `settings.top_cache` is enabled.
    pub top_compiler: Option<Arc<dyn Compiler>>,
    /// The namespace below layer 0.
    pub base: Option<Arc<dyn BaseResolver>>,
    /// Probe target for fallback conflict checking.
    pub fallback: Option<Arc<dyn BaseResolver>>,
    /// Cleanup strategy applied when handles are disposed.
    pub releaser: Arc<dyn UnitReleaser>,
}

impl EngineConfig {
    /// Creates a configuration with the given settings and no
    /// collaborators beyond the no-op releaser.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            top_compiler: None,
            base: None,
            fallback: None,
            releaser: Arc::new(NoopReleaser),
        }
    }

    /// Sets the compiler used by the on-demand cache.
    pub fn with_top_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.top_compiler = Some(compiler);
        self
    }

    /// Sets the base resolver below layer 0.
    pub fn with_base(mut self, base: Arc<dyn BaseResolver>) -> Self {
        self.base = Some(base);
        self
    }

    /// Sets the fallback probe target for conflict checking.
    pub fn with_fallback(mut self, fallback: Arc<dyn BaseResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets the unit releaser applied at disposal.
    pub fn with_releaser(mut self, releaser: Arc<dyn UnitReleaser>) -> Self {
        self.releaser = releaser;
        self
    }

    /// Checks that the settings and collaborators form a usable whole.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if self.settings.top_cache && self.top_compiler.is_none() {
            return Err(ConfigError::invalid(
                "top_cache is enabled but no top compiler is configured",
            ));
        }
        if self.settings.check_fallback_conflicts && self.fallback.is_none() {
            return Err(ConfigError::invalid(
                "check_fallback_conflicts is enabled but no fallback scope is configured",
            ));
        }
        Ok(())
    }
}
