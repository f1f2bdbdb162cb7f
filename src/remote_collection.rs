//! Remote collection seam.
//!
//! The hosted document database is an external collaborator. The synchronizer
//! only needs three things from it: the collection path, a one-shot fetch and
//! a live listener that delivers full snapshots. [`RemoteCollection`] captures
//! that, and [`InMemoryCollection`] implements it for tests and for hosts that
//! push documents in by hand.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Schema-less document as delivered by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: String,

    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        Self { id: id.into(), fields }
    }

    /// Builds a document from a `json!({...})` object. Non-object values
    /// produce a document without fields.
    pub fn from_value(id: impl Into<String>, value: JsonValue) -> Self {
        let fields = match value {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }
}

/// Error reported by the remote store, either on a listener or on a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

impl std::error::Error for RemoteError {}

pub type SnapshotEvent = Result<Vec<RemoteDocument>, RemoteError>;

pub type SnapshotListener = Arc<dyn Fn(SnapshotEvent) + Send + Sync>;

/// Handle returned by [`RemoteCollection::listen`]. The listener stays
/// attached until [`ListenerRegistration::remove`] is called or the handle
/// is dropped.
pub struct ListenerRegistration {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerRegistration {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn remove(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl std::fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

pub trait RemoteCollection: Send + Sync {
    fn collection_path(&self) -> &str;

    /// One-shot read of the whole collection.
    fn fetch_all(&self) -> Result<Vec<RemoteDocument>, RemoteError>;

    /// Attaches a live listener. Implementations deliver an initial snapshot
    /// and then a full snapshot after every change.
    fn listen(&self, listener: SnapshotListener) -> ListenerRegistration;
}

type ListenerMap = HashMap<u64, SnapshotListener>;

/// Remote collection held in process memory.
///
/// Documents are ordered by the string value of `order_by` (missing values
/// sort as empty), ties broken by id. Listeners are invoked on the thread that
/// changed the collection, after the internal lock is released.
pub struct InMemoryCollection {
    path: String,
    order_by: String,
    documents: Mutex<BTreeMap<String, RemoteDocument>>,
    listeners: Arc<Mutex<ListenerMap>>,
    next_listener_id: AtomicU64,
    pending_fetch_error: Mutex<Option<RemoteError>>,
}

impl InMemoryCollection {
    pub fn new(path: impl Into<String>, order_by: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order_by: order_by.into(),
            documents: Mutex::new(BTreeMap::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
            pending_fetch_error: Mutex::new(None),
        }
    }

    pub fn with_documents(
        path: impl Into<String>,
        order_by: impl Into<String>,
        documents: impl IntoIterator<Item = RemoteDocument>,
    ) -> Self {
        let collection = Self::new(path, order_by);
        {
            let mut guard = lock(&collection.documents);
            for document in documents {
                guard.insert(document.id.clone(), document);
            }
        }
        collection
    }

    /// Inserts or replaces a document and notifies every listener.
    pub fn set_document(&self, document: RemoteDocument) {
        lock(&self.documents).insert(document.id.clone(), document);
        self.notify(Ok(self.snapshot()));
    }

    /// Removes a document and notifies every listener. Returns whether the
    /// document existed.
    pub fn remove_document(&self, id: &str) -> bool {
        let removed = lock(&self.documents).remove(id).is_some();
        if removed {
            self.notify(Ok(self.snapshot()));
        }
        removed
    }

    /// Delivers an error to every listener without touching the documents.
    pub fn emit_error(&self, error: RemoteError) {
        self.notify(Err(error));
    }

    /// Makes the next [`RemoteCollection::fetch_all`] call fail once.
    pub fn fail_next_fetch(&self, error: RemoteError) {
        *lock(&self.pending_fetch_error) = Some(error);
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    /// Current documents in remote order.
    pub fn snapshot(&self) -> Vec<RemoteDocument> {
        let mut documents: Vec<RemoteDocument> = lock(&self.documents).values().cloned().collect();
        documents.sort_by(|a, b| {
            order_key(a, &self.order_by)
                .cmp(order_key(b, &self.order_by))
                .then_with(|| a.id.cmp(&b.id))
        });
        documents
    }

    fn notify(&self, event: SnapshotEvent) {
        let listeners: Vec<SnapshotListener> = lock(&self.listeners).values().cloned().collect();
        debug!("Notifying {} listeners on {}", listeners.len(), self.path);
        for listener in listeners {
            listener(event.clone());
        }
    }
}

impl RemoteCollection for InMemoryCollection {
    fn collection_path(&self) -> &str {
        &self.path
    }

    fn fetch_all(&self) -> Result<Vec<RemoteDocument>, RemoteError> {
        if let Some(error) = lock(&self.pending_fetch_error).take() {
            warn!("Fetch of {} failed: {error}", self.path);
            return Err(error);
        }
        Ok(self.snapshot())
    }

    fn listen(&self, listener: SnapshotListener) -> ListenerRegistration {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).insert(id, Arc::clone(&listener));
        listener(Ok(self.snapshot()));

        let listeners: Weak<Mutex<ListenerMap>> = Arc::downgrade(&self.listeners);
        ListenerRegistration::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock(&listeners).remove(&id);
            }
        })
    }
}

fn order_key<'a>(document: &'a RemoteDocument, field: &str) -> &'a str {
    document
        .fields
        .get(field)
        .and_then(JsonValue::as_str)
        .unwrap_or("")
}

// Poisoned locks are recovered; a panicking listener leaves the maps intact.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
