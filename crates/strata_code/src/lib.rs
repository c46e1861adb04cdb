//! Script sources, compiled artifact sets, and conflict analysis.
//!
//! This crate defines the input side of the Strata engine: the [`Source`]
//! identity/staleness primitives for text, file, and URL origins, the
//! [`Sources`] collections they are grouped into, the external [`Compiler`]
//! contract, and the immutable [`ArtifactSet`] a compilation produces.
//! The [`conflict`] module detects unit names duplicated across layers.

#![warn(missing_docs)]

pub mod artifact;
pub mod compiler;
pub mod conflict;
pub mod error;
pub mod factory;
pub mod source;
pub mod source_set;
pub mod sources;
pub mod testkit;

pub use artifact::{Artifact, ArtifactSet, ArtifactSetBuilder, SourceUnits};
pub use compiler::Compiler;
pub use error::{CompileError, SourceError};
pub use factory::{SourceFactory, SourceFactoryConfig};
pub use source::{FileSource, Source, TextSource, UrlFetcher, UrlSource};
pub use source_set::SourceSet;
pub use sources::{DirMode, DirSources, FixedSetSources, SingleSources, Sources};
