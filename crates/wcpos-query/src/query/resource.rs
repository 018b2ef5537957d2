use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use wcpos_api::ResultSet;

/// Observable handle on a query's results.
///
/// Backed by a watch channel: readers always see the latest [`ResultSet`],
/// and intermediate snapshots may be skipped by slow readers.
#[derive(Debug, Clone)]
pub struct QueryResource {
    receiver: watch::Receiver<ResultSet>,
}

impl QueryResource {
    pub(crate) fn new(receiver: watch::Receiver<ResultSet>) -> Self {
        Self { receiver }
    }

    pub fn current(&self) -> ResultSet {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once the query is gone.
    pub async fn changed(&mut self) -> Option<ResultSet> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate`, checking the current one
    /// first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<ResultSet>
    where
        F: FnMut(&ResultSet) -> bool,
    {
        self.receiver
            .wait_for(predicate)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }

    pub fn into_stream(self) -> WatchStream<ResultSet> {
        WatchStream::new(self.receiver)
    }
}
