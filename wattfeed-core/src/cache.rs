//! On-disk cache of the community feed's revalidation token and last known events.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::feed::FeedDocument;
use crate::model::Event;
use crate::store::write_atomically;

const ETAG_FILE: &str = "etag";
const EVENTS_FILE: &str = "secondary_events.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// What a previous successful fetch left behind.
pub struct CacheEntry {
    /// Token to send as `If-None-Match`.
    pub etag: Option<String>,
    /// Events decoded from the response the token belongs to.
    pub events: Vec<Event>,
}

/// Handle to a cache directory.
///
/// Each handle owns its directory; use distinct directories for independent caches.
#[derive(Debug, Clone)]
pub struct ConditionalCache {
    dir: PathBuf,
}

impl ConditionalCache {
    /// Bind a cache to `dir`. The directory is created on first store.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory backing this cache.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the cached token and snapshot.
    ///
    /// A missing or corrupt snapshot yields an empty entry without a token, so a stale token
    /// is never paired with data that cannot be served back.
    #[must_use]
    pub fn load(&self) -> CacheEntry {
        let Some(events) = self.load_events() else {
            return CacheEntry::default();
        };

        let etag = match fs::read_to_string(self.dir.join(ETAG_FILE)) {
            Ok(text) if !text.trim().is_empty() => {
                let token = text.trim().to_owned();
                tracing::debug!(etag = %token, "using cached etag");
                Some(token)
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, "no cached etag found");
                None
            }
        };

        CacheEntry { etag, events }
    }

    /// Persist a fresh token and snapshot. Failures are logged, never returned.
    ///
    /// Passing `None` for the token clears any previously cached one.
    pub fn store(&self, etag: Option<&str>, events: &[Event]) {
        if let Err(err) = self.try_store(etag, events) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "failed to write cache");
        }
    }

    fn try_store(&self, etag: Option<&str>, events: &[Event]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let snapshot = serde_json::to_vec(&FeedDocument::from_events(events))?;
        write_atomically(&self.dir.join(EVENTS_FILE), &snapshot)?;

        let etag_path = self.dir.join(ETAG_FILE);
        match etag {
            Some(token) => {
                write_atomically(&etag_path, token.as_bytes())?;
                tracing::debug!(etag = token, "cached new etag");
            }
            None => match fs::remove_file(&etag_path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            },
        }

        Ok(())
    }

    fn load_events(&self) -> Option<Vec<Event>> {
        let path = self.dir.join(EVENTS_FILE);
        let bytes = fs::read(&path).ok()?;

        let parsed = serde_json::from_slice::<FeedDocument>(&bytes)
            .ok()
            .and_then(|doc| doc.to_events().ok());
        if parsed.is_none() {
            tracing::debug!(file = %path.display(), "ignoring corrupt cache snapshot");
        }
        parsed
    }
}
