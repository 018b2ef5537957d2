//! In-memory reactive collection
//!
//! Documents are keyed by the string form of their primary key. Each write
//! bumps a version counter, and observers see batches in exactly the order the
//! writes were applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace};
use wcpos_api::{
    ApiError, BatchMetadata, Change, ChangeBatch, ChangeOrigin, Document, DocumentChange,
    WithMetadata,
};

use super::collection::{Collection, ObserverCallback, ObserverHandle, Snapshot, UpsertOptions};
use super::merge::merge_document;
use crate::config::CollectionConfig;
use crate::core::selector::{compare_documents, Selector, SortField};
use crate::locks::{lock, read, write};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<String, Document>,
    /// Incremented once per write that changed something
    version: u64,
}

type Observers = Arc<Mutex<Vec<(u64, ObserverCallback)>>>;

pub struct MemoryCollection {
    name: String,
    config: CollectionConfig,
    state: RwLock<MemoryState>,
    /// Serializes a write together with its notifications
    write_lock: Mutex<()>,
    observers: Observers,
    next_observer_id: AtomicU64,
    changes: broadcast::Sender<ChangeBatch>,
    closed: AtomicBool,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>, config: CollectionConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            config,
            state: RwLock::new(MemoryState::default()),
            write_lock: Mutex::new(()),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(0),
            changes,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        read(&self.state).version
    }

    /// Stream of every change batch applied after this call.
    pub fn watch_changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.changes.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    fn ensure_open(&self) -> Result<(), ApiError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ApiError::collection_unavailable(&self.name));
        }
        Ok(())
    }

    fn key_of(&self, document: &Document) -> Result<String, ApiError> {
        document
            .get(&self.config.primary_key)
            .and_then(|v| v.as_key())
            .ok_or_else(|| ApiError::InvalidOperation {
                message: format!(
                    "document in '{}' has no usable primary key '{}'",
                    self.name, self.config.primary_key
                ),
            })
    }

    /// Publish a batch to observers and the change channel. Must be called
    /// with `write_lock` held.
    fn notify(&self, changes: Vec<DocumentChange>, version: u64) {
        let batch: ChangeBatch = WithMetadata {
            inner: changes,
            metadata: BatchMetadata {
                collection: self.name.clone(),
                version,
            },
        };

        let observers: Vec<ObserverCallback> = lock(&self.observers)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        trace!(
            "[MemoryCollection] {} v{}: {} changes to {} observers",
            self.name,
            version,
            batch.len(),
            observers.len()
        );
        for observer in observers {
            observer(&batch);
        }

        // No receivers is fine
        let _ = self.changes.send(batch);
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    fn find(&self, selector: &Selector, sort: &[SortField]) -> Result<Snapshot, ApiError> {
        self.ensure_open()?;
        let state = read(&self.state);
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|doc| selector.matches(doc))
            .cloned()
            .collect();
        let version = state.version;
        drop(state);

        documents.sort_by(|a, b| compare_documents(a, b, sort));
        Ok(Snapshot { version, documents })
    }

    fn get(&self, id: &str) -> Result<Option<Document>, ApiError> {
        self.ensure_open()?;
        Ok(read(&self.state).documents.get(id).cloned())
    }

    fn count(&self) -> Result<usize, ApiError> {
        self.ensure_open()?;
        Ok(read(&self.state).documents.len())
    }

    fn bulk_upsert(
        &self,
        documents: Vec<Document>,
        options: &UpsertOptions,
    ) -> Result<usize, ApiError> {
        self.ensure_open()?;

        // Reject the whole batch before touching state
        let keyed = documents
            .into_iter()
            .map(|doc| Ok((self.key_of(&doc)?, doc)))
            .collect::<Result<Vec<_>, ApiError>>()?;

        let _serialized = lock(&self.write_lock);
        self.ensure_open()?;

        let mut changes = Vec::new();
        let version = {
            let mut state = write(&self.state);
            for (key, incoming) in keyed {
                let existing = state.documents.get(&key);
                let merged = merge_document(existing, incoming, &options.preserve_fields);
                let change = match existing {
                    Some(current) if *current == merged => continue,
                    Some(_) => Change::Updated {
                        id: key.clone(),
                        data: merged.clone(),
                        origin: options.origin.clone(),
                    },
                    None => Change::Created {
                        data: merged.clone(),
                        origin: options.origin.clone(),
                    },
                };
                state.documents.insert(key, merged);
                changes.push(change);
            }
            if !changes.is_empty() {
                state.version += 1;
            }
            state.version
        };

        let written = changes.len();
        if written > 0 {
            debug!(
                "[MemoryCollection] {}: upserted {} documents (v{})",
                self.name, written, version
            );
            self.notify(changes, version);
        }
        Ok(written)
    }

    fn remove(&self, id: &str, origin: ChangeOrigin) -> Result<bool, ApiError> {
        self.ensure_open()?;
        let _serialized = lock(&self.write_lock);

        let version = {
            let mut state = write(&self.state);
            if state.documents.remove(id).is_none() {
                return Ok(false);
            }
            state.version += 1;
            state.version
        };

        self.notify(
            vec![Change::Deleted {
                id: id.to_string(),
                origin,
            }],
            version,
        );
        Ok(true)
    }

    fn observe(&self, callback: ObserverCallback) -> Result<ObserverHandle, ApiError> {
        self.ensure_open()?;
        let id = self.next_observer_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.observers).push((id, callback));

        let observers = Arc::downgrade(&self.observers);
        Ok(ObserverHandle::new(move || {
            if let Some(observers) = observers.upgrade() {
                lock(&observers).retain(|(observer_id, _)| *observer_id != id);
            }
        }))
    }

    fn close(&self) {
        let _serialized = lock(&self.write_lock);
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("[MemoryCollection] {} closed", self.name);
            lock(&self.observers).clear();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}
