//! Construction of sources from one frozen configuration.

use crate::error::SourceError;
use crate::source::{FileSource, Source, TextSource, UrlFetcher, UrlSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Options for a [`SourceFactory`].
///
/// Built once, then moved into the factory and treated as immutable.
#[derive(Debug, Clone)]
pub struct SourceFactoryConfig {
    /// Latency window for caching file mtimes. Zero stats on every query.
    pub file_latency: Duration,

    /// Whether URL sources track their content for staleness.
    pub track_urls: bool,

    /// Latency window for URL content tracking.
    pub url_latency: Duration,

    /// Collaborator used to fetch URL content. Required for URL sources.
    pub url_fetcher: Option<Arc<dyn UrlFetcher>>,
}

impl Default for SourceFactoryConfig {
    fn default() -> Self {
        Self {
            file_latency: Duration::ZERO,
            track_urls: false,
            url_latency: Duration::ZERO,
            url_fetcher: None,
        }
    }
}

/// Creates text, file, and URL sources with uniform staleness settings.
pub struct SourceFactory {
    config: SourceFactoryConfig,
}

impl SourceFactory {
    /// Creates a factory from the given configuration.
    pub fn new(config: SourceFactoryConfig) -> Self {
        Self { config }
    }

    /// Creates a factory with default settings (no caching, no tracking).
    pub fn with_defaults() -> Self {
        Self::new(SourceFactoryConfig::default())
    }

    /// Creates a source from in-memory text.
    pub fn from_text(&self, text: impl Into<String>) -> Arc<dyn Source> {
        Arc::new(TextSource::new(text))
    }

    /// Creates a source from in-memory text with a display name.
    pub fn from_text_named(&self, text: impl Into<String>, name: &str) -> Arc<dyn Source> {
        Arc::new(TextSource::with_name(text, name))
    }

    /// Creates a source from a file path, honoring the configured latency.
    pub fn from_file(&self, path: impl Into<PathBuf>) -> Arc<dyn Source> {
        Arc::new(FileSource::with_latency(path, self.config.file_latency))
    }

    /// Creates a source from a URL, honoring the configured tracking mode.
    ///
    /// Fails when no fetcher is configured.
    pub fn from_url(&self, url: impl Into<String>) -> Result<Arc<dyn Source>, SourceError> {
        let url = url.into();
        let fetcher = self
            .config
            .url_fetcher
            .clone()
            .ok_or_else(|| SourceError::NoFetcher { url: url.clone() })?;
        let source: Arc<dyn Source> = if self.config.track_urls {
            Arc::new(UrlSource::with_tracking(
                url,
                fetcher,
                self.config.url_latency,
            ))
        } else {
            Arc::new(UrlSource::new(url, fetcher))
        };
        Ok(source)
    }
}
