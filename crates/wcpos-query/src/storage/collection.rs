//! The local collection boundary consumed by the executor and the sync layer.

use std::fmt;
use std::sync::Arc;

use wcpos_api::{ApiError, ChangeBatch, ChangeOrigin, Document};

use crate::core::selector::{Selector, SortField};

/// Observer invoked after every accepted write, in write order.
///
/// Observers run while the collection's write is still serialized, so they
/// must not write back into the same collection.
pub type ObserverCallback = Arc<dyn Fn(&ChangeBatch) + Send + Sync>;

/// Ordered query result tagged with the collection version it was read at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOptions {
    pub origin: ChangeOrigin,
    /// Fields whose existing values survive the upsert
    pub preserve_fields: Vec<String>,
}

impl UpsertOptions {
    pub fn local() -> Self {
        Self {
            origin: ChangeOrigin::local(),
            preserve_fields: Vec::new(),
        }
    }

    pub fn remote(operation_id: impl Into<String>, preserve_fields: Vec<String>) -> Self {
        Self {
            origin: ChangeOrigin::remote(Some(operation_id.into())),
            preserve_fields,
        }
    }
}

impl Default for UpsertOptions {
    fn default() -> Self {
        Self::local()
    }
}

/// A named document collection with live change notification.
///
/// Every method fails with [`ApiError::CollectionUnavailable`] once the
/// collection is closed.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    fn primary_key(&self) -> &str;

    /// Matching documents in sort order.
    fn find(&self, selector: &Selector, sort: &[SortField]) -> Result<Snapshot, ApiError>;

    fn get(&self, id: &str) -> Result<Option<Document>, ApiError>;

    fn count(&self) -> Result<usize, ApiError>;

    /// Insert or merge documents by primary key as one atomic write.
    ///
    /// Returns the number of documents that actually changed.
    fn bulk_upsert(&self, documents: Vec<Document>, options: &UpsertOptions)
        -> Result<usize, ApiError>;

    /// Returns whether a document was removed.
    fn remove(&self, id: &str, origin: ChangeOrigin) -> Result<bool, ApiError>;

    fn observe(&self, callback: ObserverCallback) -> Result<ObserverHandle, ApiError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Registration returned by [`Collection::observe`]. Dropping it detaches the
/// observer.
pub struct ObserverHandle {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ObserverHandle {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.detach_now();
    }

    fn detach_now(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        self.detach_now();
    }
}

impl fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverHandle")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
