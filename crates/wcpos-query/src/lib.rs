//! Offline-first reactive query cache
//!
//! Queries are described declaratively ([`QueryDescription`]), evaluated live
//! against a local [`Collection`](storage::Collection) and kept fresh by
//! paging a [`RemoteSource`](sync::RemoteSource) into that collection.
//! [`QueryManager`] is the entry point.

pub mod config;
pub mod core;
pub mod logging;
pub mod manager;
pub mod query;
pub mod storage;
pub mod sync;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

mod locks;

pub use config::{CollectionConfig, QueryConfig};
pub use manager::{QueryError, QueryManager};
pub use query::{Query, QueryResource, QueryStatus};
pub use storage::{Collection, Collections, MemoryCollection, UpsertOptions};
pub use sync::{Page, PageRequest, RemoteSource, SyncCoordinator, SyncState};

pub use wcpos_api::{
    ApiError, Checkpoint, Document, FilterValue, Pagination, ParamsPatch, QueryDescription,
    QueryParams, ResultSet, SortDirection, SortParam, SyncStatus, Value,
};
