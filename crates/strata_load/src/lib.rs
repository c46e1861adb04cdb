//! The Strata resolution engine: scopes, layer stacks, and the on-demand
//! top cache.
//!
//! A [`Scope`] turns compiled artifacts into defined [`Unit`]s lazily,
//! idempotently, and concurrently-safely, delegating along a parent chain
//! according to a [`ResolvePolicy`]. A [`LayerStack`] chains one scope per
//! compiled sources layer above an optional [`BaseResolver`], and a
//! [`TopCache`] compiles individual sources on demand above the stack.

#![warn(missing_docs)]

pub mod base;
pub mod error;
pub mod policy;
pub mod scope;
pub mod stack;
pub mod top_cache;
pub mod unit;

pub use base::{BaseResolver, StaticBase};
pub use error::{ConflictError, LoadError};
pub use policy::ResolvePolicy;
pub use scope::{Scope, ScopeParent};
pub use stack::LayerStack;
pub use top_cache::TopCache;
pub use unit::{NoopReleaser, ReleaseError, Unit, UnitReleaser};
