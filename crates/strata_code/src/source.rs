//! Identity and staleness primitives for one script origin.
//!
//! A [`Source`] is one identifiable unit of script text. Its `id` is the
//! sole identity (two sources with equal ids are the same source) and its
//! `last_modified` is an origin-specific staleness marker: text never
//! changes in place, files report their mtime, URLs report the time their
//! tracked content fingerprint last moved.

use crate::error::SourceError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use strata_common::{ChangeTracker, ContentHash, Throttled};

/// One identifiable unit of script origin.
///
/// Implementations must be safe to query from multiple threads. `id` and
/// the origin itself are constant after construction; `last_modified` may
/// be requeried, subject to an implementation-chosen latency cache.
pub trait Source: fmt::Debug + Send + Sync {
    /// Stable identity of this source. Equality of sources is equality of ids.
    fn id(&self) -> &str;

    /// Origin-specific staleness marker in milliseconds since the epoch.
    fn last_modified(&self) -> i64;

    /// Reads the raw source text.
    fn read(&self) -> Result<String, SourceError>;
}

/// A source backed by an in-memory string.
///
/// The id is a content fingerprint, so a new text is a new source and
/// `last_modified` is constantly 0.
#[derive(Debug)]
pub struct TextSource {
    id: String,
    text: String,
}

impl TextSource {
    /// Creates a text source whose id is derived from the content alone.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let id = format!("txt:{}", ContentHash::of_str(&text));
        Self { id, text }
    }

    /// Creates a text source with a display name folded into the id.
    ///
    /// Two distinct names over the same text yield two distinct sources.
    pub fn with_name(text: impl Into<String>, name: &str) -> Self {
        let text = text.into();
        let id = format!("txt:{}/{name}", ContentHash::of_str(&text));
        Self { id, text }
    }

    /// Returns the source text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Source for TextSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> i64 {
        0
    }

    fn read(&self) -> Result<String, SourceError> {
        Ok(self.text.clone())
    }
}

/// A source backed by a file on disk.
///
/// The id is the canonical path (falling back to the absolute path when
/// canonicalization fails, e.g. for a file that does not exist yet).
/// `last_modified` is the filesystem mtime, requeried on each call or, when
/// a latency is configured, at most once per window.
#[derive(Debug)]
pub struct FileSource {
    id: String,
    path: PathBuf,
    mtime: Option<Throttled<i64>>,
}

impl FileSource {
    /// Creates a file source that stats the file on every staleness query.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(path.into(), None)
    }

    /// Creates a file source whose mtime is cached for the given latency.
    pub fn with_latency(path: impl Into<PathBuf>, latency: Duration) -> Self {
        let throttle = if latency.is_zero() {
            None
        } else {
            Some(Throttled::new(latency))
        };
        Self::build(path.into(), throttle)
    }

    fn build(path: PathBuf, mtime: Option<Throttled<i64>>) -> Self {
        let resolved = resolve_path(&path);
        Self {
            id: resolved.to_string_lossy().into_owned(),
            path: resolved,
            mtime,
        }
    }

    /// Returns the resolved (canonical or absolute) path of this source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stat_mtime(&self) -> i64 {
        mtime_millis(&self.path)
    }
}

impl Source for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> i64 {
        match &self.mtime {
            Some(throttle) => throttle.get_or_refresh(|| self.stat_mtime()),
            None => self.stat_mtime(),
        }
    }

    fn read(&self) -> Result<String, SourceError> {
        std::fs::read_to_string(&self.path).map_err(|e| SourceError::FileRead {
            path: self.path.clone(),
            source: Arc::new(e),
        })
    }
}

/// Resolves a path to its canonical form, falling back to an absolute path.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Returns a file's mtime in milliseconds since the epoch, 0 when unreadable.
fn mtime_millis(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Collaborator that fetches raw URL content.
///
/// The engine performs no network I/O itself; hosts inject an
/// implementation (and tests inject fakes). Must be callable from multiple
/// threads.
pub trait UrlFetcher: fmt::Debug + Send + Sync {
    /// Fetches the raw content behind a URL.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// A source backed by a URL.
///
/// The id is the URL itself. Without content tracking, `last_modified` is
/// constantly 0 (the source is assumed never to change). With tracking, the
/// content is re-fetched at most once per latency window and
/// `last_modified` becomes the time the content fingerprint last changed;
/// a failed fetch keeps the previous observation rather than registering a
/// change.
#[derive(Debug)]
pub struct UrlSource {
    url: String,
    fetcher: Arc<dyn UrlFetcher>,
    tracker: Option<ChangeTracker>,
}

impl UrlSource {
    /// Creates an untracked URL source (`last_modified` is always 0).
    pub fn new(url: impl Into<String>, fetcher: Arc<dyn UrlFetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
            tracker: None,
        }
    }

    /// Creates a URL source whose content is tracked at the given latency.
    ///
    /// The initial fingerprint is taken from a fetch at construction time;
    /// if that fetch fails, the fingerprint of empty content is used.
    pub fn with_tracking(
        url: impl Into<String>,
        fetcher: Arc<dyn UrlFetcher>,
        latency: Duration,
    ) -> Self {
        let url = url.into();
        let seed = fetcher
            .fetch(&url)
            .map(|content| ContentHash::from_bytes(&content))
            .unwrap_or_else(|_| ContentHash::from_bytes(&[]));
        Self {
            url,
            fetcher,
            tracker: Some(ChangeTracker::new(latency, seed)),
        }
    }

    /// Returns the URL of this source.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Source for UrlSource {
    fn id(&self) -> &str {
        &self.url
    }

    fn last_modified(&self) -> i64 {
        match &self.tracker {
            Some(tracker) => tracker.last_modified(|| {
                self.fetcher
                    .fetch(&self.url)
                    .ok()
                    .map(|content| ContentHash::from_bytes(&content))
            }),
            None => 0,
        }
    }

    fn read(&self) -> Result<String, SourceError> {
        let bytes = self.fetcher.fetch(&self.url)?;
        String::from_utf8(bytes).map_err(|_| SourceError::UrlFetch {
            url: self.url.clone(),
            reason: "content is not valid utf-8".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FakeFetcher {
        content: Mutex<Result<Vec<u8>, String>>,
    }

    impl FakeFetcher {
        fn ok(content: &str) -> Arc<Self> {
            Arc::new(Self {
                content: Mutex::new(Ok(content.as_bytes().to_vec())),
            })
        }

        fn set(&self, content: &str) {
            *self.content.lock().unwrap() = Ok(content.as_bytes().to_vec());
        }

        fn set_failing(&self, reason: &str) {
            *self.content.lock().unwrap() = Err(reason.to_string());
        }
    }

    impl UrlFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError> {
            self.content
                .lock()
                .unwrap()
                .clone()
                .map_err(|reason| SourceError::UrlFetch {
                    url: url.to_string(),
                    reason,
                })
        }
    }

    #[test]
    fn text_source_id_is_content_derived() {
        let a = TextSource::new("return 1");
        let b = TextSource::new("return 1");
        let c = TextSource::new("return 2");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        assert!(a.id().starts_with("txt:"));
    }

    #[test]
    fn text_source_name_distinguishes_ids() {
        let a = TextSource::with_name("return 1", "First");
        let b = TextSource::with_name("return 1", "Second");
        assert_ne!(a.id(), b.id());
        assert!(a.id().ends_with("/First"));
    }

    #[test]
    fn text_source_never_stale() {
        let s = TextSource::new("return 1");
        assert_eq!(s.last_modified(), 0);
        assert_eq!(s.read().unwrap(), "return 1");
    }

    #[test]
    fn file_source_reads_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.scr");
        std::fs::write(&path, "return 1").unwrap();

        let s = FileSource::new(&path);
        assert_eq!(s.read().unwrap(), "return 1");
        assert!(s.last_modified() > 0);
    }

    #[test]
    fn file_source_id_is_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.scr");
        std::fs::write(&path, "x").unwrap();

        let direct = FileSource::new(&path);
        let dotted = FileSource::new(dir.path().join(".").join("a.scr"));
        assert_eq!(direct.id(), dotted.id());
    }

    #[test]
    fn missing_file_is_not_an_error_for_staleness() {
        let s = FileSource::new("/nonexistent/strata/test.scr");
        assert_eq!(s.last_modified(), 0);
        assert!(s.read().is_err());
    }

    #[test]
    fn file_latency_caches_the_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.scr");
        std::fs::write(&path, "x").unwrap();

        let s = FileSource::with_latency(&path, Duration::from_secs(60));
        let first = s.last_modified();
        std::fs::remove_file(&path).unwrap();
        // Within the window the cached mtime is still reported.
        assert_eq!(s.last_modified(), first);
    }

    #[test]
    fn url_source_untracked_never_stale() {
        let fetcher = FakeFetcher::ok("return 1");
        let s = UrlSource::new("https://example.com/a.scr", fetcher);
        assert_eq!(s.last_modified(), 0);
        assert_eq!(s.id(), "https://example.com/a.scr");
        assert_eq!(s.read().unwrap(), "return 1");
    }

    #[test]
    fn url_source_tracking_detects_content_change() {
        let fetcher = FakeFetcher::ok("v1");
        let s = UrlSource::with_tracking("https://example.com/a.scr", fetcher.clone(), Duration::ZERO);
        let before = s.last_modified();
        std::thread::sleep(Duration::from_millis(5));
        fetcher.set("v2");
        let after = s.last_modified();
        assert!(after > before);
    }

    #[test]
    fn url_source_failed_fetch_keeps_previous_observation() {
        let fetcher = FakeFetcher::ok("v1");
        let s = UrlSource::with_tracking("https://example.com/a.scr", fetcher.clone(), Duration::ZERO);
        let before = s.last_modified();
        fetcher.set_failing("connection refused");
        assert_eq!(s.last_modified(), before);
        assert!(s.read().is_err());
    }
}
