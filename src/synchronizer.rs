//! Remote-to-local mirroring.
//!
//! [`CitiesSynchronizer`] subscribes to a [`RemoteCollection`], maps every
//! snapshot to [`CityRow`](crate::local_db_model::CityRow)s and bulk-upserts
//! them into the shared [`AppDbState`]. Failures are not retried; they only
//! change the visible error message.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::app_response::AppResponse;
use crate::city_mapping::map_snapshot;
use crate::local_db_state::AppDbState;
use crate::remote_collection::{
    lock, ListenerRegistration, RemoteCollection, RemoteDocument, RemoteError, SnapshotListener,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Subscribed,
    Unsubscribed,
}

/// Outcome of applying one snapshot to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReport {
    pub received: usize,
    pub written: usize,
    pub skipped: Vec<String>,
}

/// Maps `documents` and bulk-upserts the result into `store`.
///
/// Rows already in the store that are not part of the snapshot stay where
/// they are. Applying the same snapshot twice leaves the store as it was after
/// the first application.
pub fn apply_snapshot(
    store: &AppDbState,
    documents: &[RemoteDocument],
) -> Result<SnapshotReport, AppResponse> {
    let mapped = map_snapshot(documents);
    let written = store.upsert_all(&mapped.rows)?;

    Ok(SnapshotReport {
        received: documents.len(),
        written,
        skipped: mapped.skipped,
    })
}

struct MirrorWriter {
    store: Arc<AppDbState>,
    error_tx: watch::Sender<Option<String>>,
}

impl MirrorWriter {
    fn apply(&self, documents: &[RemoteDocument]) -> Result<SnapshotReport, AppResponse> {
        match apply_snapshot(&self.store, documents) {
            Ok(report) => {
                debug!(
                    "Applied snapshot: {} received, {} written, {} skipped",
                    report.received,
                    report.written,
                    report.skipped.len()
                );
                self.set_error(None);
                Ok(report)
            }
            Err(e) => {
                warn!("Failed to write snapshot to the local mirror: {e}");
                self.set_error(Some(e.message().to_string()));
                Err(e)
            }
        }
    }

    fn remote_failed(&self, error: &RemoteError) {
        warn!("Remote collection reported an error: {error}");
        self.set_error(Some(error.to_string()));
    }

    fn set_error(&self, message: Option<String>) {
        self.error_tx.send_if_modified(|current| {
            if *current == message {
                false
            } else {
                *current = message;
                true
            }
        });
    }
}

/// Keeps the local mirror approximately in line with one remote collection.
///
/// The synchronizer is either subscribed or not; [`start`](Self::start) and
/// [`stop`](Self::stop) move between the two, and dropping it unsubscribes.
/// [`refresh`](Self::refresh) pulls the collection once regardless of the
/// subscription.
pub struct CitiesSynchronizer {
    remote: Arc<dyn RemoteCollection>,
    writer: Arc<MirrorWriter>,
    registration: Mutex<Option<ListenerRegistration>>,
}

impl CitiesSynchronizer {
    pub fn new(remote: Arc<dyn RemoteCollection>, store: Arc<AppDbState>) -> Self {
        let (error_tx, _) = watch::channel(None);
        Self {
            remote,
            writer: Arc::new(MirrorWriter { store, error_tx }),
            registration: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<AppDbState> {
        &self.writer.store
    }

    pub fn state(&self) -> SyncState {
        if lock(&self.registration).is_some() {
            SyncState::Subscribed
        } else {
            SyncState::Unsubscribed
        }
    }

    /// Attaches the live listener. Calling it while already subscribed does
    /// nothing.
    pub fn start(&self) {
        let mut registration = lock(&self.registration);
        if registration.is_some() {
            debug!("Synchronizer for {} is already subscribed", self.remote.collection_path());
            return;
        }

        let writer = Arc::clone(&self.writer);
        let listener: SnapshotListener = Arc::new(move |event| match event {
            Ok(documents) => {
                if let Err(e) = writer.apply(&documents) {
                    debug!("Listener snapshot not applied: {e}");
                }
            }
            Err(error) => writer.remote_failed(&error),
        });

        info!("Subscribing to {}", self.remote.collection_path());
        *registration = Some(self.remote.listen(listener));
    }

    /// Detaches the live listener, if any.
    pub fn stop(&self) {
        if let Some(registration) = lock(&self.registration).take() {
            registration.remove();
            info!("Unsubscribed from {}", self.remote.collection_path());
        }
    }

    /// Entry point for snapshots delivered by a host-owned listener.
    pub fn on_remote_snapshot(
        &self,
        documents: &[RemoteDocument],
    ) -> Result<SnapshotReport, AppResponse> {
        self.writer.apply(documents)
    }

    /// Records a listener failure. The local rows are not touched.
    pub fn on_remote_error(&self, error: &RemoteError) {
        self.writer.remote_failed(error);
    }

    /// One-shot pull of the whole collection into the store.
    pub fn refresh(&self) -> Result<SnapshotReport, AppResponse> {
        let documents = match self.remote.fetch_all() {
            Ok(documents) => documents,
            Err(error) => {
                self.writer.remote_failed(&error);
                return Err(AppResponse::from(error));
            }
        };
        self.writer.apply(&documents)
    }

    /// Message for the error banner, `None` when the last operation succeeded.
    pub fn error_message(&self) -> Option<String> {
        self.writer.error_tx.borrow().clone()
    }

    pub fn watch_error(&self) -> watch::Receiver<Option<String>> {
        self.writer.error_tx.subscribe()
    }
}
