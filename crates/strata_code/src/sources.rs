//! Named collections of sources with throttled aggregate staleness.
//!
//! A [`Sources`] value is the unit of compilation: a named set of sources
//! plus the compiler to use for them. Its `last_modified` is an aggregate
//! that moves when membership changes or any member's marker moves, and is
//! recomputed at most once per latency window.

use crate::compiler::Compiler;
use crate::source::{FileSource, Source};
use crate::source_set::SourceSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use strata_common::ChangeTracker;

/// A named, possibly time-varying collection of sources.
///
/// `source_set` returns a membership snapshot and may differ between calls
/// (a directory listing, say). `last_modified` changes if and only if a
/// change requiring recompilation was detected, and is recomputed at most
/// once per the implementation's latency window.
pub trait Sources: fmt::Debug + Send + Sync {
    /// Name of this collection, used in errors and artifact sets.
    fn name(&self) -> &str;

    /// Current membership snapshot.
    fn source_set(&self) -> SourceSet;

    /// Throttled aggregate staleness marker.
    fn last_modified(&self) -> i64;

    /// The compiler to use for this collection.
    fn compiler(&self) -> Arc<dyn Compiler>;
}

/// Sources with fixed membership.
///
/// The set itself never changes, but member staleness markers still move,
/// so the aggregate tracker watches the set fingerprint.
#[derive(Debug)]
pub struct FixedSetSources {
    name: String,
    set: SourceSet,
    compiler: Arc<dyn Compiler>,
    tracker: ChangeTracker,
}

impl FixedSetSources {
    /// Creates a fixed collection with the given staleness latency.
    pub fn new(
        name: impl Into<String>,
        set: SourceSet,
        latency: Duration,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        let tracker = ChangeTracker::new(latency, set.fingerprint());
        Self {
            name: name.into(),
            set,
            compiler,
            tracker,
        }
    }
}

impl Sources for FixedSetSources {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_set(&self) -> SourceSet {
        self.set.clone()
    }

    fn last_modified(&self) -> i64 {
        self.tracker.last_modified(|| Some(self.set.fingerprint()))
    }

    fn compiler(&self) -> Arc<dyn Compiler> {
        Arc::clone(&self.compiler)
    }
}

/// Whether a directory scan descends into subdirectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirMode {
    /// Only files directly inside the directory.
    TopOnly,
    /// Files in the directory and all subdirectories.
    Recursive,
}

/// Sources backed by a directory listing.
///
/// Membership is rescanned on every snapshot, filtered by extension.
/// An unreadable directory yields an empty set, never an error: the layer
/// built from it becomes empty rather than broken.
#[derive(Debug)]
pub struct DirSources {
    name: String,
    dir: PathBuf,
    mode: DirMode,
    extensions: Vec<String>,
    compiler: Arc<dyn Compiler>,
    tracker: ChangeTracker,
}

impl DirSources {
    /// Creates a directory-backed collection.
    ///
    /// `extensions` filters scanned files by extension (without the dot);
    /// an empty list accepts every file. The initial scan happens here so
    /// the tracker starts from the real membership.
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        mode: DirMode,
        extensions: Vec<String>,
        latency: Duration,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        let dir = dir.into();
        let initial = scan_dir(&dir, mode, &extensions);
        let tracker = ChangeTracker::new(latency, initial.fingerprint());
        Self {
            name: name.into(),
            dir,
            mode,
            extensions,
            compiler,
            tracker,
        }
    }

    fn scan(&self) -> SourceSet {
        scan_dir(&self.dir, self.mode, &self.extensions)
    }
}

impl Sources for DirSources {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_set(&self) -> SourceSet {
        self.scan()
    }

    fn last_modified(&self) -> i64 {
        self.tracker.last_modified(|| Some(self.scan().fingerprint()))
    }

    fn compiler(&self) -> Arc<dyn Compiler> {
        Arc::clone(&self.compiler)
    }
}

/// Scans a directory into a source set. Unreadable entries are skipped.
fn scan_dir(dir: &Path, mode: DirMode, extensions: &[String]) -> SourceSet {
    let mut set = SourceSet::new();
    collect_files(dir, mode, extensions, &mut set);
    set
}

fn collect_files(dir: &Path, mode: DirMode, extensions: &[String], out: &mut SourceSet) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if mode == DirMode::Recursive {
                collect_files(&path, mode, extensions, out);
            }
        } else if matches_extension(&path, extensions) {
            out.insert(Arc::new(FileSource::new(&path)));
        }
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want == ext))
}

/// Adapter wrapping exactly one source for on-demand compilation.
///
/// `last_modified` passes the source's own marker through untouched; the
/// top cache's staleness token depends on this exactness.
#[derive(Debug)]
pub struct SingleSources {
    source: Arc<dyn Source>,
    compiler: Arc<dyn Compiler>,
}

impl SingleSources {
    /// Wraps one source with the compiler to use for it.
    pub fn new(source: Arc<dyn Source>, compiler: Arc<dyn Compiler>) -> Self {
        Self { source, compiler }
    }

    /// Returns the wrapped source.
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }
}

impl Sources for SingleSources {
    fn name(&self) -> &str {
        self.source.id()
    }

    fn source_set(&self) -> SourceSet {
        SourceSet::from_sources([Arc::clone(&self.source)])
    }

    fn last_modified(&self) -> i64 {
        self.source.last_modified()
    }

    fn compiler(&self) -> Arc<dyn Compiler> {
        Arc::clone(&self.compiler)
    }
}
