//! Remote sync coordinator
//!
//! Pages through the remote source for one query at a time, merging each page
//! into the local collection as soon as it arrives. The local executor picks
//! the writes up, so results stream in page by page.

use std::sync::Arc;

use tracing::{debug, info, warn};
use wcpos_api::{ApiError, Checkpoint, Pagination, SyncStatus};

use super::remote::{PageRequest, RemoteSource};
use crate::config::QueryConfig;
use crate::locks::lock;
use crate::query::Query;
use crate::storage::UpsertOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// Refresh from the checkpoint; full pagination keeps going to the end
    Sync,
    /// Exactly one more page
    LoadMore,
}

pub struct SyncCoordinator {
    remote: Arc<dyn RemoteSource>,
    default_page_size: usize,
    max_pages_per_sync: Option<usize>,
}

impl SyncCoordinator {
    pub fn new(remote: Arc<dyn RemoteSource>, config: &QueryConfig) -> Self {
        Self {
            remote,
            default_page_size: config.default_page_size,
            max_pages_per_sync: config.max_pages_per_sync,
        }
    }

    #[tracing::instrument(name = "query.sync", skip(self, query), fields(fingerprint = %query.fingerprint()))]
    pub async fn sync(&self, query: &Query) -> Result<SyncStatus, ApiError> {
        self.run(query, FetchMode::Sync).await
    }

    #[tracing::instrument(name = "query.load_more", skip(self, query), fields(fingerprint = %query.fingerprint()))]
    pub async fn load_more(&self, query: &Query) -> Result<SyncStatus, ApiError> {
        self.run(query, FetchMode::LoadMore).await
    }

    async fn run(&self, query: &Query, mode: FetchMode) -> Result<SyncStatus, ApiError> {
        let (epoch, params) = {
            let mut state = lock(&query.state);
            if state.disposed {
                return Err(query.disposed_error());
            }
            if state.sync.in_flight {
                debug!("[SyncCoordinator] {} already syncing", query.fingerprint());
                return Ok(SyncStatus::AlreadyInProgress);
            }
            if !state.sync.has_more {
                match mode {
                    FetchMode::LoadMore => return Ok(SyncStatus::NoMoreData),
                    FetchMode::Sync => state.sync.restart_pass(),
                }
            }
            state.sync.in_flight = true;
            query.publish_locked(&state);
            (state.sync.epoch, state.params.clone())
        };

        let page_size = params
            .pagination
            .page_size()
            .unwrap_or(self.default_page_size)
            .max(1);
        let page_limit = match (mode, params.pagination) {
            (FetchMode::Sync, Pagination::Full) => self.max_pages_per_sync,
            _ => Some(1),
        };
        let upsert_options = UpsertOptions::remote(
            query.fingerprint(),
            query.collection_config().local_fields.clone(),
        );

        let mut pages = 0;
        let mut documents = 0;

        loop {
            let cursor = {
                let state = lock(&query.state);
                if state.disposed || state.sync.epoch != epoch {
                    return Ok(SyncStatus::Cancelled);
                }
                state.sync.checkpoint.clone()
            };

            let request = PageRequest {
                collection: query.collection_name().to_string(),
                params: params.clone(),
                cursor,
                page_size,
            };
            debug!(
                "[SyncCoordinator] {} fetching page at {:?}",
                query.fingerprint(),
                request.cursor
            );

            let page = match self.remote.fetch_page(&request).await {
                Ok(page) => page,
                Err(error) => return Self::fail(query, epoch, error, true),
            };

            // Held through the upsert so dispose or a param change cannot
            // interleave between the currency check and the write
            let _gate = lock(&query.write_gate);
            if !query.is_current(epoch) {
                debug!(
                    "[SyncCoordinator] {} discarding stale page",
                    query.fingerprint()
                );
                return Ok(SyncStatus::Cancelled);
            }

            let received = page.items.len();
            let collection = match query.collection() {
                Ok(collection) => collection,
                Err(error) => return Self::fail(query, epoch, error, false),
            };
            if let Err(error) = collection.bulk_upsert(page.items, &upsert_options) {
                return Self::fail(query, epoch, error, false);
            }

            pages += 1;
            documents += received;

            let mut state = lock(&query.state);
            // set_params does not take the gate, so the epoch can move during the upsert
            if state.disposed || state.sync.epoch != epoch {
                debug!(
                    "[SyncCoordinator] {} params changed during upsert, dropping progress",
                    query.fingerprint()
                );
                return Ok(SyncStatus::Cancelled);
            }

            let stalled = page.next_cursor.is_some()
                && page.next_cursor.as_deref() == request.cursor.cursor();
            if stalled {
                warn!(
                    "[SyncCoordinator] {} remote returned cursor {:?} again, ending pass",
                    query.fingerprint(),
                    request.cursor
                );
            } else if let Some(next) = &page.next_cursor {
                state.sync.checkpoint = Checkpoint::Cursor(next.clone());
            }
            state.sync.has_more = page.next_cursor.is_some() && !stalled;
            state.sync.retry_count = 0;
            state.error = None;

            let done = !state.sync.has_more || page_limit.is_some_and(|limit| pages >= limit);
            if done {
                state.sync.in_flight = false;
                query.publish_locked(&state);
                info!(
                    "[SyncCoordinator] {} synced {} pages ({} documents), has_more={}",
                    query.fingerprint(),
                    pages,
                    documents,
                    state.sync.has_more
                );
                return Ok(SyncStatus::Completed { pages, documents });
            }
            query.publish_locked(&state);
        }
    }

    /// Record a failed fetch or merge on the query and report it.
    fn fail(
        query: &Query,
        epoch: u64,
        error: ApiError,
        count_retry: bool,
    ) -> Result<SyncStatus, ApiError> {
        {
            let mut state = lock(&query.state);
            if state.disposed || state.sync.epoch != epoch {
                return Ok(SyncStatus::Cancelled);
            }
            if count_retry {
                state.sync.retry_count += 1;
            }
            state.sync.in_flight = false;
            state.error = Some(error.clone());
            query.publish_locked(&state);
            warn!(
                "[SyncCoordinator] {} failed (retry_count={}): {}",
                query.fingerprint(),
                state.sync.retry_count,
                error
            );
        }
        query.report_error(error.clone());
        Err(error)
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("default_page_size", &self.default_page_size)
            .field("max_pages_per_sync", &self.max_pages_per_sync)
            .finish()
    }
}
