//! Test support: controllable in-memory sources and a directive-driven
//! compiler.
//!
//! These doubles are used by this workspace's own tests and are exported
//! for embedders who need deterministic fixtures: a [`MockSource`] whose
//! staleness marker and content are settable at runtime, and a
//! [`MockCompiler`] that "compiles" each source's text into one or more
//! named units.

use crate::artifact::{Artifact, ArtifactSet};
use crate::compiler::Compiler;
use crate::error::{CompileError, SourceError};
use crate::source::Source;
use crate::sources::Sources;
use std::sync::{Arc, Mutex};

use strata_common::now_millis;

/// An in-memory source with a settable staleness marker.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    state: Mutex<MockState>,
}

#[derive(Debug)]
struct MockState {
    last_modified: i64,
    content: String,
}

impl MockSource {
    /// Creates a mock source with `last_modified` 0.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            state: Mutex::new(MockState {
                last_modified: 0,
                content: content.into(),
            }),
        })
    }

    /// Sets the staleness marker.
    pub fn set_last_modified(&self, last_modified: i64) {
        self.state.lock().unwrap().last_modified = last_modified;
    }

    /// Replaces the content and bumps the staleness marker to now.
    pub fn modify(&self, content: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        state.content = content.into();
        state.last_modified = now_millis();
    }
}

impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> i64 {
        self.state.lock().unwrap().last_modified
    }

    fn read(&self) -> Result<String, SourceError> {
        Ok(self.state.lock().unwrap().content.clone())
    }
}

/// A compiler that derives units from directives in the source text.
///
/// Rules, applied per source:
///
/// - a line `fail` fails the whole compilation;
/// - each line `unit: Name` declares a unit named `Name`; the first
///   declared unit is the source's main unit;
/// - with no `unit:` directive, the unit name is derived from the source
///   id (last path segment, extension stripped);
/// - every declared unit's payload is the full source text.
#[derive(Debug, Default)]
pub struct MockCompiler;

impl MockCompiler {
    /// Creates a mock compiler.
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for MockCompiler {
    fn compile(&self, sources: &dyn Sources) -> Result<ArtifactSet, CompileError> {
        let snapshot = sources.source_set();
        let mut builder = ArtifactSet::builder(sources.name(), sources.last_modified());

        for source in snapshot.iter() {
            let content = source.read().map_err(|e| {
                CompileError::new(sources.name(), format!("source '{}' unreadable", source.id()))
                    .with_cause(Arc::new(e))
            })?;

            let mut unit_names = Vec::new();
            for line in content.lines() {
                let line = line.trim();
                if line == "fail" {
                    return Err(CompileError::new(
                        sources.name(),
                        format!("forced failure in source '{}'", source.id()),
                    ));
                }
                if let Some(name) = line.strip_prefix("unit:") {
                    unit_names.push(name.trim().to_string());
                }
            }
            if unit_names.is_empty() {
                unit_names.push(derive_unit_name(source.id()));
            }

            let payload: Arc<[u8]> = content.as_bytes().into();
            for name in &unit_names {
                builder = builder.artifact(Artifact::new(name.clone(), Arc::clone(&payload)));
            }
            builder = builder.source_units(source.id(), unit_names[0].clone(), unit_names);
        }

        Ok(builder.build())
    }
}

/// Derives a unit name from a source id: last path segment, no extension.
fn derive_unit_name(source_id: &str) -> String {
    let segment = source_id.rsplit(['/', '\\']).next().unwrap_or(source_id);
    match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => segment.to_string(),
    }
}
