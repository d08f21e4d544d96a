//! Merges both upstream sources into the published dataset.

use std::sync::Arc;

use crate::model::{Dataset, Event, SourceMeta};
use crate::ports::EventSource;
use crate::store::{EventStore, StoreError};

#[derive(thiserror::Error, Debug)]
/// Fatal outcomes of a reconciliation run. The published file is untouched in every case.
pub enum ReconcileError {
    /// The existing dataset exists but could not be read.
    #[error("Failed to load existing events: {0}")]
    Load(#[source] StoreError),
    /// The merged dataset would publish fewer events than before.
    #[error("Refusing to shrink dataset from {previous} to {merged} events")]
    Shrink {
        /// Number of events loaded at the start of the run.
        previous: usize,
        /// Number of events after merging.
        merged: usize,
    },
    /// The merged dataset could not be written.
    #[error("Failed to save events: {0}")]
    Write(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Successful outcome of a reconciliation run.
pub enum RunOutcome {
    /// Nothing new; the file was not touched.
    Unchanged {
        /// Number of events in the published dataset.
        count: usize,
    },
    /// The dataset was rewritten.
    Published {
        /// Number of events before the run.
        previous: usize,
        /// Number of events now published.
        count: usize,
        /// Events received from the primary source.
        primary: usize,
        /// Events received from the secondary source.
        secondary: usize,
    },
}

/// Single-pass reconciler combining a primary and a secondary source.
pub struct Reconciler {
    store: EventStore,
    primary: Arc<dyn EventSource>,
    secondary: Arc<dyn EventSource>,
}

impl Reconciler {
    /// Create a reconciler writing to `store`.
    ///
    /// On duplicate keys the primary source's copy wins over the secondary's, and both win over
    /// the stored copy.
    #[must_use]
    pub fn new(
        store: EventStore,
        primary: Arc<dyn EventSource>,
        secondary: Arc<dyn EventSource>,
    ) -> Self {
        Self {
            store,
            primary,
            secondary,
        }
    }

    /// Run one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Load`] when the existing dataset is unreadable,
    /// [`ReconcileError::Shrink`] when merging would lose events, and [`ReconcileError::Write`]
    /// when the result cannot be saved. Source failures are logged and never returned.
    pub async fn run(&self) -> Result<RunOutcome, ReconcileError> {
        let existing = match self.store.load() {
            Ok(dataset) => dataset,
            Err(StoreError::NotFound(path)) => {
                tracing::info!(file = %path.display(), "no existing dataset, starting empty");
                Dataset::default()
            }
            Err(err) => return Err(ReconcileError::Load(err)),
        };
        let previous = existing.len();

        let (primary_events, secondary_events) = tokio::join!(
            fetch_isolated(Arc::clone(&self.primary)),
            fetch_isolated(Arc::clone(&self.secondary)),
        );
        let primary = primary_events.len();
        let secondary = secondary_events.len();

        let mut merged = existing.clone();
        if !secondary_events.is_empty() {
            merged.merge(secondary_events);
        }
        if !primary_events.is_empty() {
            merged.merge(primary_events);
        }

        if merged.same_events(&existing) {
            tracing::info!(count = previous, "no changes detected, skipping write");
            return Ok(RunOutcome::Unchanged { count: previous });
        }

        merged.assign_codes();

        let count = merged.len();
        if count < previous {
            tracing::error!(previous, merged = count, "merged dataset is smaller than published one");
            return Err(ReconcileError::Shrink {
                previous,
                merged: count,
            });
        }

        self.store.save(&merged).map_err(ReconcileError::Write)?;

        tracing::info!(
            file = %self.store.path().display(),
            count,
            previous,
            primary,
            secondary,
            "updated events"
        );
        Ok(RunOutcome::Published {
            previous,
            count,
            primary,
            secondary,
        })
    }
}

// Runs the fetch on its own task; any failure degrades to an empty list.
async fn fetch_isolated(source: Arc<dyn EventSource>) -> Vec<Event> {
    let SourceMeta { id, name } = source.meta().clone();
    let task = tokio::spawn(async move { source.fetch().await });

    match task.await {
        Ok(Ok(events)) => {
            tracing::debug!(source = %id, name = %name, count = events.len(), "source fetched");
            events
        }
        Ok(Err(err)) => {
            tracing::warn!(
                source = %id,
                name = %name,
                error = %err,
                "source failed, continuing without it"
            );
            Vec::new()
        }
        Err(err) => {
            tracing::warn!(
                source = %id,
                name = %name,
                error = %err,
                "source task aborted, continuing without it"
            );
            Vec::new()
        }
    }
}
