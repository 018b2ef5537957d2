//! Local query executor
//!
//! Evaluates a compiled query against a collection and keeps the result live:
//! the current snapshot is delivered on subscribe, then again after every
//! accepted write to the collection. A failed re-evaluation is delivered as
//! an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};
use wcpos_api::{ApiError, ChangeBatch, Document};

use super::selector::CompiledQuery;
use crate::locks::lock;
use crate::storage::{Collection, ObserverHandle};

pub type ResultCallback = Arc<dyn Fn(Result<Arc<Vec<Document>>, ApiError>) + Send + Sync>;

pub struct LocalExecutor;

impl LocalExecutor {
    /// Evaluate once without subscribing.
    pub fn run_once(
        collection: &dyn Collection,
        compiled: &CompiledQuery,
    ) -> Result<Vec<Document>, ApiError> {
        Ok(collection.find(&compiled.selector, &compiled.sort)?.documents)
    }

    /// Subscribe `on_result` to live results.
    ///
    /// The first result is delivered before this returns. A closed collection
    /// fails with `CollectionUnavailable` and `on_result` is never called.
    pub fn subscribe(
        collection: Arc<dyn Collection>,
        compiled: CompiledQuery,
        on_result: ResultCallback,
    ) -> Result<Subscription, ApiError> {
        if collection.is_closed() {
            return Err(ApiError::collection_unavailable(collection.name()));
        }

        let emitter = Arc::new(Emitter {
            collection: Arc::downgrade(&collection),
            compiled,
            on_result,
            last_version: Mutex::new(None),
            active: AtomicBool::new(true),
        });

        // Register before the initial read so no write can slip in between
        let observer_emitter = emitter.clone();
        let observer = collection.observe(Arc::new(move |_batch: &ChangeBatch| {
            observer_emitter.refresh();
        }))?;

        let initial = collection.find(&emitter.compiled.selector, &emitter.compiled.sort)?;
        emitter.deliver(initial.version, initial.documents);

        debug!(
            "[LocalExecutor] subscribed to {} ({:?})",
            collection.name(),
            emitter.compiled.selector
        );

        Ok(Subscription {
            emitter,
            observer: Some(observer),
        })
    }
}

struct Emitter {
    collection: Weak<dyn Collection>,
    compiled: CompiledQuery,
    on_result: ResultCallback,
    /// Version of the last delivered snapshot; also serializes deliveries
    last_version: Mutex<Option<u64>>,
    active: AtomicBool,
}

impl Emitter {
    fn refresh(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        let Some(collection) = self.collection.upgrade() else {
            return;
        };
        match collection.find(&self.compiled.selector, &self.compiled.sort) {
            Ok(snapshot) => self.deliver(snapshot.version, snapshot.documents),
            Err(e) => {
                warn!("[LocalExecutor] re-evaluation on {} failed: {}", collection.name(), e);
                self.fail(e);
            }
        }
    }

    fn fail(&self, error: ApiError) {
        let _serialized = lock(&self.last_version);
        if self.active.load(Ordering::SeqCst) {
            (self.on_result)(Err(error));
        }
    }

    fn deliver(&self, version: u64, documents: Vec<Document>) {
        let mut last = lock(&self.last_version);
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        // A slower reader may finish after a newer snapshot was delivered
        if last.is_some_and(|delivered| version < delivered) {
            return;
        }
        *last = Some(version);
        (self.on_result)(Ok(Arc::new(documents)));
    }
}

/// Live subscription returned by [`LocalExecutor::subscribe`].
///
/// Dropping it detaches from the collection.
pub struct Subscription {
    emitter: Arc<Emitter>,
    observer: Option<ObserverHandle>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        self.emitter.active.load(Ordering::SeqCst)
    }

    fn detach(&mut self) {
        self.emitter.active.store(false, Ordering::SeqCst);
        if let Some(observer) = self.observer.take() {
            observer.unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
