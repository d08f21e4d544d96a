//! Reads and writes the published dataset file.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::ParseError as ChronoParseError;
use serde_json::Error as JsonError;

use crate::feed::FeedDocument;
use crate::model::Dataset;

#[derive(thiserror::Error, Debug)]
/// Errors raised by [`EventStore`].
pub enum StoreError {
    /// The dataset file does not exist yet.
    #[error("Dataset file not found: {0}")]
    NotFound(PathBuf),
    /// The file exists but is not a valid dataset document.
    #[error("Failed to decode dataset {path}: {reason}")]
    Decode {
        /// File that failed to decode.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Any other filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

impl StoreError {
    fn decode(path: &Path, reason: impl ToString) -> Self {
        StoreError::Decode {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Published dataset at a fixed path.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    /// Bind the store to `path`.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Location of the dataset file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the published dataset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the file is absent, [`StoreError::Decode`] when the
    /// document or any of its timestamps is invalid, and [`StoreError::Io`] otherwise.
    pub fn load(&self) -> Result<Dataset, StoreError> {
        let bytes = fs::read(&self.path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(self.path.clone())
            } else {
                StoreError::Io {
                    path: self.path.clone(),
                    source: err,
                }
            }
        })?;

        let doc: FeedDocument = serde_json::from_slice(&bytes)
            .map_err(|err: JsonError| StoreError::decode(&self.path, err))?;
        let events = doc
            .to_events()
            .map_err(|err: ChronoParseError| StoreError::decode(&self.path, err))?;

        Ok(Dataset::new(events))
    }

    /// Replace the file with `dataset`, pretty-printed with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the file cannot be written.
    pub fn save(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let doc = FeedDocument::from_events(dataset.events());
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err.into(),
        })?;

        write_atomically(&self.path, &bytes).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err,
        })
    }
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = write_and_rename(&tmp_path, path, bytes);
    if result.is_err() {
        match fs::remove_file(&tmp_path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                tracing::debug!(file = %tmp_path.display(), error = %err, "failed to remove temp file");
            }
            Ok(()) | Err(_) => {}
        }
    }
    result
}

fn write_and_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(tmp_path, path)
}
