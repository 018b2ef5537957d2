use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{ApiError, Document, Value};

/// Immutable snapshot of a query's matching documents.
///
/// Every emission from a query's resource is a fresh `ResultSet`; the document
/// list is shared behind an `Arc` so cloning a snapshot is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub documents: Arc<Vec<Document>>,
    /// Count hint for the full local match
    pub total: usize,
    pub is_loading: bool,
    pub has_more: bool,
    pub error: Option<ApiError>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// Values of `field` across the documents, in result order.
    pub fn values_of(&self, field: &str) -> Vec<Value> {
        self.documents
            .iter()
            .map(|doc| doc.get(field).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// Outcome of a `sync` or `load_more` call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Pages were fetched and merged into the local collection
    Completed { pages: usize, documents: usize },
    /// Another fetch for the same query is still running
    AlreadyInProgress,
    /// The remote reported no further pages
    NoMoreData,
    /// The query was disposed or its params changed while the fetch was running
    Cancelled,
}
