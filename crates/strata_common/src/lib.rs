//! Shared foundational types for the Strata script engine.
//!
//! This crate provides content fingerprinting, wall-clock helpers, and the
//! latency-throttling primitives that bound how often staleness signals are
//! recomputed throughout the engine.

#![warn(missing_docs)]

pub mod hash;
pub mod throttle;

pub use hash::ContentHash;
pub use throttle::{now_millis, ChangeTracker, Throttled};
