//! Remote sync: pages documents from a [`RemoteSource`] into the local
//! collection behind a query.

pub mod coordinator;
pub mod remote;
pub mod state;

pub use coordinator::SyncCoordinator;
pub use remote::{Page, PageRequest, RemoteSource};
pub use state::SyncState;
