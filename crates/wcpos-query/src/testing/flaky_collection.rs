use std::sync::atomic::{AtomicBool, Ordering};

use wcpos_api::{ApiError, ChangeOrigin, Document};

use crate::core::selector::{Selector, SortField};
use crate::storage::{
    Collection, MemoryCollection, ObserverCallback, ObserverHandle, Snapshot, UpsertOptions,
};

/// [`MemoryCollection`] whose reads can be switched to fail while writes and
/// observers keep working, like a storage backend losing its read handle.
pub struct FlakyCollection {
    inner: MemoryCollection,
    fail_reads: AtomicBool,
}

impl FlakyCollection {
    pub fn new(inner: MemoryCollection) -> Self {
        Self {
            inner,
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryCollection {
        &self.inner
    }

    fn check_reads(&self) -> Result<(), ApiError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ApiError::collection_unavailable(self.inner.name()));
        }
        Ok(())
    }
}

impl Collection for FlakyCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn primary_key(&self) -> &str {
        self.inner.primary_key()
    }

    fn find(&self, selector: &Selector, sort: &[SortField]) -> Result<Snapshot, ApiError> {
        self.check_reads()?;
        self.inner.find(selector, sort)
    }

    fn get(&self, id: &str) -> Result<Option<Document>, ApiError> {
        self.check_reads()?;
        self.inner.get(id)
    }

    fn count(&self) -> Result<usize, ApiError> {
        self.check_reads()?;
        self.inner.count()
    }

    fn bulk_upsert(
        &self,
        documents: Vec<Document>,
        options: &UpsertOptions,
    ) -> Result<usize, ApiError> {
        self.inner.bulk_upsert(documents, options)
    }

    fn remove(&self, id: &str, origin: ChangeOrigin) -> Result<bool, ApiError> {
        self.inner.remove(id, origin)
    }

    fn observe(&self, callback: ObserverCallback) -> Result<ObserverHandle, ApiError> {
        self.inner.observe(callback)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
