//! Query instances
//!
//! A [`Query`] owns one live local subscription and the remote sync state for
//! one fingerprint. Instances are created and disposed by the
//! [`QueryManager`](crate::manager::QueryManager); callers only hold `Arc`s.

mod resource;

pub use resource::QueryResource;

use std::sync::{Arc, Mutex, Weak};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use wcpos_api::{
    ApiError, Checkpoint, Document, FilterValue, ParamsPatch, QueryDescription, QueryParams,
    ResultSet, SortParam, SyncStatus,
};

use crate::config::{CollectionConfig, QueryConfig};
use crate::core::executor::{LocalExecutor, ResultCallback, Subscription};
use crate::core::selector::{compile, CompiledQuery};
use crate::core::timer::DebounceTimer;
use crate::locks::lock;
use crate::manager::QueryError;
use crate::storage::{Collection, Collections};
use crate::sync::{SyncCoordinator, SyncState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Created, no local subscription yet
    Idle,
    /// Live local results
    Subscribed,
    /// A remote fetch is running
    Syncing,
    /// Terminal; every operation fails with `QueryDisposed`
    Disposed,
}

pub(crate) struct QueryState {
    pub(crate) params: QueryParams,
    pub(crate) compiled: CompiledQuery,
    pub(crate) sync: SyncState,
    pub(crate) error: Option<ApiError>,
    pub(crate) disposed: bool,
    subscription: Option<Subscription>,
    documents: Arc<Vec<Document>>,
}

pub struct Query {
    fingerprint: String,
    collection_name: String,
    collection_config: CollectionConfig,
    collections: Arc<Collections>,
    coordinator: Arc<SyncCoordinator>,
    errors: broadcast::Sender<QueryError>,
    sync_on_subscribe: bool,
    debounce: DebounceTimer,
    results: watch::Sender<ResultSet>,
    pub(crate) state: Mutex<QueryState>,
    /// Taken by remote writes and by dispose, never while `state` is held
    pub(crate) write_gate: Mutex<()>,
    this: Weak<Query>,
}

impl Query {
    pub(crate) fn new(
        fingerprint: String,
        description: &QueryDescription,
        config: &QueryConfig,
        collections: Arc<Collections>,
        coordinator: Arc<SyncCoordinator>,
        errors: broadcast::Sender<QueryError>,
    ) -> Arc<Self> {
        let collection_config = config.collection(&description.collection_name);
        let compiled = compile(&description.params, &collection_config);
        let (results, _) = watch::channel(ResultSet {
            has_more: true,
            ..ResultSet::default()
        });

        Arc::new_cyclic(|this| Self {
            fingerprint,
            collection_name: description.collection_name.clone(),
            collection_config,
            collections,
            coordinator,
            errors,
            sync_on_subscribe: config.sync_on_subscribe,
            debounce: DebounceTimer::new(config.search_debounce()),
            results,
            state: Mutex::new(QueryState {
                params: description.params.clone(),
                compiled,
                sync: SyncState::default(),
                error: None,
                disposed: false,
                subscription: None,
                documents: Arc::new(Vec::new()),
            }),
            write_gate: Mutex::new(()),
            this: this.clone(),
        })
    }

    /// Registration key; stays fixed when params change later.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn collection_config(&self) -> &CollectionConfig {
        &self.collection_config
    }

    /// Live result resource. The first call subscribes to the local
    /// collection and, when enabled, starts a background sync.
    pub fn resource(&self) -> Result<QueryResource, ApiError> {
        self.ensure_live()?;
        let needs_subscription = lock(&self.state).subscription.is_none();
        if needs_subscription {
            match self.attach() {
                Ok(true) => {
                    if self.sync_on_subscribe {
                        self.spawn_sync();
                    }
                }
                Ok(false) => {}
                Err(error) => return Err(self.record_error(error)),
            }
        }
        Ok(QueryResource::new(self.results.subscribe()))
    }

    /// Merge a partial param update.
    ///
    /// When the compiled selector, sort or pagination changes, sync state is
    /// reset and a subscribed query re-subscribes and syncs again.
    pub fn set_params(&self, patch: ParamsPatch) -> Result<(), ApiError> {
        let (previous, was_subscribed, epoch) = {
            let mut state = lock(&self.state);
            if state.disposed {
                return Err(self.disposed_error());
            }

            let mut params = state.params.clone();
            params.apply(patch);
            let compiled = compile(&params, &self.collection_config);
            let changed =
                compiled != state.compiled || params.pagination != state.params.pagination;
            state.params = params;
            if !changed {
                return Ok(());
            }

            state.compiled = compiled;
            state.sync.reset();
            state.error = None;
            let previous = state.subscription.take();
            let was_subscribed = previous.is_some();
            self.publish_locked(&state);
            (previous, was_subscribed, state.sync.epoch)
        };
        drop(previous);

        info!("[Query] {} params changed (epoch {})", self.fingerprint, epoch);

        if was_subscribed {
            match self.attach() {
                Ok(_) => {
                    if self.sync_on_subscribe {
                        self.spawn_sync();
                    }
                }
                Err(error) => return Err(self.record_error(error)),
            }
        }
        Ok(())
    }

    /// Apply search text immediately, cancelling any pending debounced search.
    pub fn search(&self, text: impl Into<String>) -> Result<(), ApiError> {
        self.debounce.cancel();
        self.set_params(ParamsPatch::new().search(text))
    }

    /// Apply search text once typing pauses for the configured debounce window.
    pub fn search_debounced(&self, text: impl Into<String>) -> Result<(), ApiError> {
        self.ensure_live()?;
        let text = text.into();
        let this = self.this.clone();
        self.debounce.call(move || {
            if let Some(query) = this.upgrade() {
                if let Err(e) = query.set_params(ParamsPatch::new().search(text)) {
                    debug!("[Query] debounced search dropped: {}", e);
                }
            }
        });
        Ok(())
    }

    pub fn set_filter(&self, field: impl Into<String>, value: FilterValue) -> Result<(), ApiError> {
        self.set_params(ParamsPatch::new().filter(field, value))
    }

    pub fn remove_filter(&self, field: impl Into<String>) -> Result<(), ApiError> {
        self.set_params(ParamsPatch::new().filter(field, FilterValue::Absent))
    }

    pub fn set_sort(&self, sort: Option<SortParam>) -> Result<(), ApiError> {
        let patch = match sort {
            Some(sort) => ParamsPatch::new().sort(sort),
            None => ParamsPatch::new().clear_sort(),
        };
        self.set_params(patch)
    }

    pub async fn sync(&self) -> Result<SyncStatus, ApiError> {
        self.coordinator.sync(self).await
    }

    pub async fn load_more(&self) -> Result<SyncStatus, ApiError> {
        self.coordinator.load_more(self).await
    }

    pub fn params(&self) -> QueryParams {
        lock(&self.state).params.clone()
    }

    pub fn compiled(&self) -> CompiledQuery {
        lock(&self.state).compiled.clone()
    }

    pub fn status(&self) -> QueryStatus {
        let state = lock(&self.state);
        if state.disposed {
            QueryStatus::Disposed
        } else if state.sync.in_flight {
            QueryStatus::Syncing
        } else if state.subscription.is_some() {
            QueryStatus::Subscribed
        } else {
            QueryStatus::Idle
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.state).disposed
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).sync.in_flight
    }

    pub fn has_more(&self) -> bool {
        lock(&self.state).sync.has_more
    }

    pub fn checkpoint(&self) -> Checkpoint {
        lock(&self.state).sync.checkpoint.clone()
    }

    pub fn retry_count(&self) -> u32 {
        lock(&self.state).sync.retry_count
    }

    pub fn error(&self) -> Option<ApiError> {
        lock(&self.state).error.clone()
    }

    pub fn sync_state(&self) -> SyncState {
        lock(&self.state).sync.clone()
    }

    /// Tear down the local subscription and refuse further use.
    pub(crate) fn dispose(&self) {
        self.debounce.cancel();
        let subscription = {
            let _gate = lock(&self.write_gate);
            let mut state = lock(&self.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.sync.in_flight = false;
            let subscription = state.subscription.take();
            self.publish_locked(&state);
            subscription
        };
        drop(subscription);
        info!("[Query] {} disposed", self.fingerprint);
    }

    pub(crate) fn collection(&self) -> Result<Arc<dyn Collection>, ApiError> {
        let collection = self.collections.get(&self.collection_name)?;
        if collection.is_closed() {
            return Err(ApiError::collection_unavailable(&self.collection_name));
        }
        Ok(collection)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        let state = lock(&self.state);
        !state.disposed && state.sync.epoch == epoch
    }

    pub(crate) fn disposed_error(&self) -> ApiError {
        ApiError::QueryDisposed {
            fingerprint: self.fingerprint.clone(),
        }
    }

    /// Push the current state to resource watchers. Skips identical snapshots.
    pub(crate) fn publish_locked(&self, state: &QueryState) {
        let snapshot = ResultSet {
            documents: state.documents.clone(),
            total: state.documents.len(),
            is_loading: state.sync.in_flight,
            has_more: state.sync.has_more,
            error: state.error.clone(),
        };
        self.results.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    pub(crate) fn report_error(&self, error: ApiError) {
        // Nobody listening is fine
        let _ = self.errors.send(QueryError {
            fingerprint: self.fingerprint.clone(),
            collection: self.collection_name.clone(),
            error,
        });
    }

    fn ensure_live(&self) -> Result<(), ApiError> {
        if lock(&self.state).disposed {
            return Err(self.disposed_error());
        }
        Ok(())
    }

    fn record_error(&self, error: ApiError) -> ApiError {
        {
            let mut state = lock(&self.state);
            if !state.disposed {
                state.error = Some(error.clone());
                self.publish_locked(&state);
            }
        }
        self.report_error(error.clone());
        error
    }

    /// Subscribe the local executor for the current epoch. Returns false when
    /// another caller attached first or the params moved on meanwhile.
    fn attach(&self) -> Result<bool, ApiError> {
        let (epoch, compiled) = {
            let state = lock(&self.state);
            if state.disposed {
                return Err(self.disposed_error());
            }
            if state.subscription.is_some() {
                return Ok(false);
            }
            (state.sync.epoch, state.compiled.clone())
        };

        // The initial result is delivered synchronously and takes `state`
        let collection = self.collection()?;
        let subscription =
            LocalExecutor::subscribe(collection, compiled, self.result_callback(epoch))?;

        let mut state = lock(&self.state);
        if state.disposed || state.sync.epoch != epoch || state.subscription.is_some() {
            drop(state);
            drop(subscription);
            return Ok(false);
        }
        state.subscription = Some(subscription);
        self.publish_locked(&state);
        debug!("[Query] {} subscribed (epoch {})", self.fingerprint, epoch);
        Ok(true)
    }

    fn result_callback(&self, epoch: u64) -> ResultCallback {
        let this = self.this.clone();
        Arc::new(move |result: Result<Arc<Vec<Document>>, ApiError>| {
            let Some(query) = this.upgrade() else {
                return;
            };
            let mut state = lock(&query.state);
            if state.disposed || state.sync.epoch != epoch {
                return;
            }
            match result {
                Ok(documents) => {
                    state.documents = documents;
                    query.publish_locked(&state);
                }
                Err(error) => {
                    state.error = Some(error.clone());
                    query.publish_locked(&state);
                    drop(state);
                    query.report_error(error);
                }
            }
        })
    }

    fn spawn_sync(&self) {
        let Some(query) = self.this.upgrade() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = query.sync().await {
                        debug!("[Query] background sync for {} failed: {}", query.fingerprint, e);
                    }
                });
            }
            Err(_) => debug!(
                "[Query] no runtime, skipping background sync for {}",
                self.fingerprint
            ),
        }
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("fingerprint", &self.fingerprint)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryCollection, UpsertOptions};
    use crate::testing::FakeRemote;
    use wcpos_api::{document, Value};

    struct Fixture {
        collection: Arc<MemoryCollection>,
        remote: Arc<FakeRemote>,
        query: Arc<Query>,
        errors: broadcast::Receiver<QueryError>,
    }

    fn fixture(params: QueryParams, sync_on_subscribe: bool) -> Fixture {
        let config = QueryConfig {
            sync_on_subscribe,
            ..QueryConfig::default()
        }
        .with_collection("products", CollectionConfig::new("id").searchable(["name"]));
        let collection = Arc::new(MemoryCollection::new("products", config.collection("products")));
        let collections = Arc::new(Collections::new().with(collection.clone()));
        let remote = Arc::new(FakeRemote::new());
        let coordinator = Arc::new(SyncCoordinator::new(remote.clone(), &config));
        let (errors_tx, errors) = broadcast::channel(16);
        let description = QueryDescription::new("products", params);
        let query = Query::new(
            crate::core::description_fingerprint(&description),
            &description,
            &config,
            collections,
            coordinator,
            errors_tx,
        );
        Fixture {
            collection,
            remote,
            query,
            errors,
        }
    }

    fn names(results: &ResultSet) -> Vec<Value> {
        results.values_of("name")
    }

    #[test]
    fn test_starts_idle_and_subscribes_on_resource() {
        let f = fixture(QueryParams::new(), false);
        f.collection
            .bulk_upsert(
                vec![document([("id", Value::Integer(1)), ("name", Value::from("A"))])],
                &UpsertOptions::local(),
            )
            .unwrap();

        assert_eq!(f.query.status(), QueryStatus::Idle);
        let resource = f.query.resource().unwrap();
        assert_eq!(f.query.status(), QueryStatus::Subscribed);
        assert_eq!(names(&resource.current()), vec![Value::from("A")]);
        assert!(f.remote.requests().is_empty());
    }

    #[test]
    fn test_local_writes_stream_into_resource() {
        let f = fixture(QueryParams::new().with_search("mug"), false);
        let resource = f.query.resource().unwrap();
        assert!(resource.current().is_empty());

        f.collection
            .bulk_upsert(
                vec![
                    document([("id", Value::Integer(1)), ("name", Value::from("Red Mug"))]),
                    document([("id", Value::Integer(2)), ("name", Value::from("Teapot"))]),
                ],
                &UpsertOptions::local(),
            )
            .unwrap();
        assert_eq!(names(&resource.current()), vec![Value::from("Red Mug")]);
    }

    #[test]
    fn test_set_params_resets_sync_state() {
        let f = fixture(QueryParams::new(), false);
        let _resource = f.query.resource().unwrap();
        {
            let mut state = f.query.state.lock().unwrap();
            state.sync.checkpoint = Checkpoint::Cursor("4".into());
            state.sync.has_more = false;
            state.sync.retry_count = 2;
        }

        f.query.set_filter("status", FilterValue::eq("publish")).unwrap();
        let sync = f.query.sync_state();
        assert_eq!(sync.checkpoint, Checkpoint::Beginning);
        assert!(sync.has_more);
        assert_eq!(sync.retry_count, 0);
        assert_eq!(sync.epoch, 1);
        assert_eq!(f.query.status(), QueryStatus::Subscribed);
    }

    #[test]
    fn test_noop_param_change_keeps_state() {
        let f = fixture(QueryParams::new().with_search("mug"), false);
        f.query.search("  mug ").unwrap();
        assert_eq!(f.query.sync_state().epoch, 0);
        // Sort by primary key compiles to the same sort as the default
        f.query.set_sort(Some(SortParam::asc("id"))).unwrap();
        assert_eq!(f.query.sync_state().epoch, 0);
    }

    #[test]
    fn test_disposed_query_rejects_operations() {
        let mut f = fixture(QueryParams::new(), false);
        let _resource = f.query.resource().unwrap();
        f.query.dispose();

        assert_eq!(f.query.status(), QueryStatus::Disposed);
        assert_eq!(f.collection.observer_count(), 0);
        let disposed = ApiError::QueryDisposed {
            fingerprint: f.query.fingerprint().to_string(),
        };
        assert_eq!(f.query.resource().unwrap_err(), disposed);
        assert_eq!(f.query.search("x").unwrap_err(), disposed);
        assert_eq!(f.query.search_debounced("x").unwrap_err(), disposed);
        assert!(f.errors.try_recv().is_err());
    }

    #[test]
    fn test_closed_collection_surfaces_error() {
        let mut f = fixture(QueryParams::new(), false);
        f.collection.close();
        let err = f.query.resource().unwrap_err();
        assert_eq!(err, ApiError::collection_unavailable("products"));
        assert_eq!(f.query.error(), Some(err.clone()));
        assert_eq!(f.errors.try_recv().unwrap().error, err);
        assert_eq!(f.query.status(), QueryStatus::Idle);
    }

    #[test]
    fn test_local_read_failure_surfaces_on_resource_and_channel() {
        use crate::testing::FlakyCollection;

        let config = QueryConfig {
            sync_on_subscribe: false,
            ..QueryConfig::default()
        };
        let collection = Arc::new(FlakyCollection::new(MemoryCollection::new(
            "products",
            config.collection("products"),
        )));
        let collections = Arc::new(Collections::new().with(collection.clone()));
        let coordinator = Arc::new(SyncCoordinator::new(Arc::new(FakeRemote::new()), &config));
        let (errors_tx, mut errors) = broadcast::channel(16);
        let description = QueryDescription::new("products", QueryParams::new());
        let query = Query::new(
            crate::core::description_fingerprint(&description),
            &description,
            &config,
            collections,
            coordinator,
            errors_tx,
        );
        let resource = query.resource().unwrap();

        collection.fail_reads(true);
        collection
            .bulk_upsert(vec![document([("id", Value::Integer(1))])], &UpsertOptions::local())
            .unwrap();

        let unavailable = ApiError::collection_unavailable("products");
        assert_eq!(resource.current().error, Some(unavailable.clone()));
        assert_eq!(query.error(), Some(unavailable.clone()));
        assert_eq!(errors.try_recv().unwrap().error, unavailable);
    }

    #[tokio::test]
    async fn test_explicit_sync_on_idle_query() {
        let f = fixture(QueryParams::new(), false);
        f.remote.set_dataset(
            "products",
            CollectionConfig::new("id"),
            vec![document([("id", Value::Integer(1)), ("name", Value::from("A"))])],
        );

        let status = f.query.sync().await.unwrap();
        assert_eq!(status, SyncStatus::Completed { pages: 1, documents: 1 });
        assert_eq!(f.collection.count().unwrap(), 1);
        assert!(!f.query.has_more());
        assert_eq!(f.query.status(), QueryStatus::Idle);
    }
}
