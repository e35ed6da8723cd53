//! Stem source
//!
//! Fetches and decodes the instrumental and vocal stems of the current
//! track, caching the decoded buffers for the session. Cached buffers are
//! handed out as `Arc` and never mutated, so sequential exports share them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use parking_lot::Mutex;

use crate::engine::buffer::AudioBuffer;
use crate::engine::decode::decode_stem;
use crate::error::{ExportError, Result};
use crate::model::StemKind;

/// Retrieves the raw bytes of a stem file
pub trait StemFetcher: Send + Sync {
    /// Fetch the complete encoded file behind `url`
    fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>>;
}

/// Fetcher for local paths and `file://` URLs, plus `http(s)://` when the
/// `http-stems` feature is enabled
#[derive(Debug, Default)]
pub struct DefaultFetcher {
    #[cfg(feature = "http-stems")]
    client: reqwest::blocking::Client,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StemFetcher for DefaultFetcher {
    fn fetch(&self, url: &str) -> std::io::Result<Vec<u8>> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_remote(url);
        }
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path)
    }
}

impl DefaultFetcher {
    #[cfg(feature = "http-stems")]
    fn fetch_remote(&self, url: &str) -> std::io::Result<Vec<u8>> {
        let to_io = |e: reqwest::Error| std::io::Error::new(std::io::ErrorKind::Other, e);
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(to_io)?;
        Ok(response.bytes().map_err(to_io)?.to_vec())
    }

    #[cfg(not(feature = "http-stems"))]
    fn fetch_remote(&self, url: &str) -> std::io::Result<Vec<u8>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("remote stems need the http-stems feature: {}", url),
        ))
    }
}

/// Decoded stems ready for scheduling
#[derive(Debug, Clone)]
pub struct LoadedStems {
    pub instrumental: Arc<AudioBuffer>,
    /// None for an instrumental-only export
    pub vocals: Option<Arc<AudioBuffer>>,
    /// Sample rate of the instrumental stem
    pub sample_rate: u32,
    /// Degradations, such as a vocal stem that failed to load
    pub warnings: Vec<String>,
}

/// Session cache of decoded stems, keyed by source URL
pub struct StemSource {
    fetcher: Box<dyn StemFetcher>,
    cache: Mutex<HashMap<String, Arc<AudioBuffer>>>,
}

impl Default for StemSource {
    fn default() -> Self {
        Self::new(Box::new(DefaultFetcher::new()))
    }
}

impl StemSource {
    pub fn new(fetcher: Box<dyn StemFetcher>) -> Self {
        Self {
            fetcher,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure both stems are decoded and return shared handles to them
    ///
    /// Both stems load in parallel. A missing or undecodable instrumental is
    /// fatal; a vocal stem that fails to load is dropped with a warning.
    ///
    /// # Errors
    /// * `MissingStem` - No instrumental URL
    /// * `Decode` - The instrumental could not be fetched or decoded
    pub fn ensure_loaded(
        &self,
        instrumental_url: Option<&str>,
        vocals_url: Option<&str>,
    ) -> Result<LoadedStems> {
        let instrumental_url = instrumental_url.ok_or(ExportError::MissingStem {
            stem: StemKind::Instrumental,
        })?;

        let (instrumental, vocals) = thread::scope(|scope| {
            let vocals_task =
                vocals_url.map(|url| scope.spawn(move || self.load(url, StemKind::Vocals)));
            let instrumental = self.load(instrumental_url, StemKind::Instrumental);
            let vocals = vocals_task.map(|task| {
                task.join().unwrap_or_else(|_| {
                    Err(ExportError::decode(StemKind::Vocals, "loader thread panicked"))
                })
            });
            (instrumental, vocals)
        });

        let instrumental = instrumental?;
        let mut warnings = Vec::new();
        let vocals = match vocals {
            Some(Ok(buffer)) => Some(buffer),
            Some(Err(err)) => {
                warn!("Continuing without vocals: {}", err);
                warnings.push(format!("Vocals skipped: {}", err));
                None
            }
            None => {
                info!("No vocal stem for this track, exporting instrumental only");
                None
            }
        };

        Ok(LoadedStems {
            sample_rate: instrumental.sample_rate,
            instrumental,
            vocals,
            warnings,
        })
    }

    /// Register a buffer decoded elsewhere under the given URL
    pub fn insert_decoded(&self, url: impl Into<String>, buffer: AudioBuffer) -> Arc<AudioBuffer> {
        let buffer = Arc::new(buffer);
        self.cache.lock().insert(url.into(), Arc::clone(&buffer));
        buffer
    }

    /// Whether a decoded buffer is cached for `url`
    pub fn is_cached(&self, url: &str) -> bool {
        self.cache.lock().contains_key(url)
    }

    /// Drop all cached buffers (e.g. when the track changes)
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn load(&self, url: &str, stem: StemKind) -> Result<Arc<AudioBuffer>> {
        if let Some(buffer) = self.cache.lock().get(url) {
            return Ok(Arc::clone(buffer));
        }

        info!("Loading {} stem from {}", stem, url);
        let bytes = self.fetcher.fetch(url).map_err(|e| ExportError::Decode {
            stem,
            reason: format!("failed to fetch {}: {}", url, e),
            source: Some(Box::new(e)),
        })?;

        let buffer = Arc::new(decode_stem(bytes, extension_of(url).as_deref(), stem)?);
        self.cache
            .lock()
            .insert(url.to_string(), Arc::clone(&buffer));
        Ok(buffer)
    }
}

/// File extension of a path or URL, ignoring any query string
fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
