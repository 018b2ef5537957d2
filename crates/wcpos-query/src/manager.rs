//! Query registry
//!
//! Hands out one shared [`Query`] per fingerprint, reference counts it and
//! evicts it after an idle grace period. Errors from every query are fanned
//! into one broadcast channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};
use wcpos_api::{ApiError, QueryDescription};

use crate::config::QueryConfig;
use crate::core::fingerprint::description_fingerprint;
use crate::core::timer::TimerHandle;
use crate::locks::lock;
use crate::query::Query;
use crate::storage::{Collection, Collections};
use crate::sync::{RemoteSource, SyncCoordinator};

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// An error raised by one query, as seen on the registry's error channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{collection}] {fingerprint}: {error}")]
pub struct QueryError {
    pub fingerprint: String,
    pub collection: String,
    #[source]
    pub error: ApiError,
}

struct Entry {
    query: Arc<Query>,
    ref_count: usize,
    eviction: Option<TimerHandle>,
}

struct ManagerInner {
    config: QueryConfig,
    collections: Arc<Collections>,
    coordinator: Arc<SyncCoordinator>,
    entries: Mutex<HashMap<String, Entry>>,
    errors: broadcast::Sender<QueryError>,
}

/// Registry of live queries. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct QueryManager {
    inner: Arc<ManagerInner>,
}

impl QueryManager {
    pub fn new(
        config: QueryConfig,
        collections: Arc<Collections>,
        remote: Arc<dyn RemoteSource>,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(remote, &config));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                collections,
                coordinator,
                entries: Mutex::new(HashMap::new()),
                errors,
            }),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    pub fn collections(&self) -> &Arc<Collections> {
        &self.inner.collections
    }

    /// The registered query for this description, creating it if needed.
    ///
    /// Each call takes a reference that must be returned with
    /// [`release_query`](Self::release_query).
    pub fn get_query(&self, description: &QueryDescription) -> Arc<Query> {
        let fingerprint = description_fingerprint(description);
        let mut entries = lock(&self.inner.entries);

        if let Some(entry) = entries.get_mut(&fingerprint) {
            entry.ref_count += 1;
            if entry.eviction.take().is_some() {
                debug!("[QueryManager] {} revived before eviction", fingerprint);
            }
            return entry.query.clone();
        }

        let query = Query::new(
            fingerprint.clone(),
            description,
            &self.inner.config,
            self.inner.collections.clone(),
            self.inner.coordinator.clone(),
            self.inner.errors.clone(),
        );
        info!("[QueryManager] registered {}", fingerprint);
        entries.insert(
            fingerprint,
            Entry {
                query: query.clone(),
                ref_count: 1,
                eviction: None,
            },
        );
        query
    }

    /// Return a reference taken by [`get_query`](Self::get_query). The last
    /// release starts the idle-eviction timer.
    pub fn release_query(&self, query: &Arc<Query>) {
        let mut entries = lock(&self.inner.entries);
        let Some(entry) = entries.get_mut(query.fingerprint()) else {
            return;
        };
        if !Arc::ptr_eq(&entry.query, query) {
            return;
        }

        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count > 0 {
            return;
        }

        let delay = self.inner.config.idle_eviction();
        let timer = if delay.is_zero() {
            None
        } else {
            let inner = Arc::downgrade(&self.inner);
            let fingerprint = query.fingerprint().to_string();
            let target = Arc::downgrade(query);
            TimerHandle::schedule(delay, async move {
                if let Some(inner) = inner.upgrade() {
                    inner.evict_if_idle(&fingerprint, &target);
                }
            })
        };

        match timer {
            Some(timer) => {
                debug!(
                    "[QueryManager] {} idle, evicting in {:?}",
                    query.fingerprint(),
                    delay
                );
                entry.eviction = Some(timer);
            }
            None => {
                let removed = entries.remove(query.fingerprint());
                drop(entries);
                if let Some(entry) = removed {
                    info!("[QueryManager] evicted {}", entry.query.fingerprint());
                    entry.query.dispose();
                }
            }
        }
    }

    /// Dispose every query on `collection_name`, whatever its reference count.
    pub fn invalidate_collection(&self, collection_name: &str) -> usize {
        let removed: Vec<Entry> = {
            let mut entries = lock(&self.inner.entries);
            let keys: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.query.collection_name() == collection_name)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter().filter_map(|key| entries.remove(key)).collect()
        };

        for entry in &removed {
            entry.query.dispose();
        }
        info!(
            "[QueryManager] invalidated {} queries on {}",
            removed.len(),
            collection_name
        );
        removed.len()
    }

    /// Swap in a new collection under its name. Queries on the old one are
    /// disposed; the replaced collection is returned to the caller.
    pub fn replace_collection(&self, collection: Arc<dyn Collection>) -> Option<Arc<dyn Collection>> {
        let name = collection.name().to_string();
        let previous = self.inner.collections.insert(collection);
        self.invalidate_collection(&name);
        previous
    }

    pub fn errors(&self) -> broadcast::Receiver<QueryError> {
        self.inner.errors.subscribe()
    }

    /// Errors as a stream; lagged receivers skip what they missed.
    pub fn error_stream(&self) -> impl Stream<Item = QueryError> {
        BroadcastStream::new(self.errors()).filter_map(|event| event.ok())
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        lock(&self.inner.entries).contains_key(fingerprint)
    }

    pub fn ref_count(&self, fingerprint: &str) -> Option<usize> {
        lock(&self.inner.entries)
            .get(fingerprint)
            .map(|entry| entry.ref_count)
    }

    /// Dispose and forget every query.
    pub fn clear(&self) {
        let removed: Vec<Entry> = lock(&self.inner.entries)
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &removed {
            entry.query.dispose();
        }
        debug!("[QueryManager] cleared {} queries", removed.len());
    }
}

impl ManagerInner {
    fn evict_if_idle(&self, fingerprint: &str, target: &Weak<Query>) {
        let removed = {
            let mut entries = lock(&self.entries);
            let idle = entries.get(fingerprint).is_some_and(|entry| {
                entry.ref_count == 0 && Arc::as_ptr(&entry.query) == target.as_ptr()
            });
            if idle {
                entries.remove(fingerprint)
            } else {
                None
            }
        };

        if let Some(entry) = removed {
            info!("[QueryManager] evicted idle query {}", fingerprint);
            entry.query.dispose();
        }
    }
}

impl std::fmt::Debug for QueryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryManager")
            .field("queries", &self.len())
            .field("collections", &self.inner.collections)
            .finish()
    }
}
