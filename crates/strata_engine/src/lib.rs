//! The Strata engine: orchestration of layer stacks, on-demand caches, and
//! loader handles.
//!
//! An [`Engine`] owns an ordered set of sources layers, compiles them into
//! a [`LayerStack`](strata_load::LayerStack) snapshot at construction, and
//! on every access decides, within a configured latency budget, whether
//! the snapshot is stale and must be recompiled. Callers resolve units
//! through [`Handle`]s, each carrying its own view (cloned stack plus
//! on-demand cache) so per-handle disposal never touches another's
//! bookkeeping.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod handle;

pub use config::{ConfigError, EngineConfig, EngineSettings};
pub use engine::Engine;
pub use error::{AuthorizationError, EngineError};
pub use handle::Handle;
