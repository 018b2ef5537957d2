use async_trait::async_trait;
use wcpos_api::{ApiError, Checkpoint, Document, QueryParams};

/// One page request against the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub collection: String,
    pub params: QueryParams,
    /// Where to continue from; `Beginning` for the first page
    pub cursor: Checkpoint,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Document>,
    /// Cursor for the following page; `None` once the remote is exhausted
    pub next_cursor: Option<String>,
}

impl Page {
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// Remote REST source that documents are fetched from.
///
/// Implementations map transport failures and non-2xx responses to
/// [`ApiError::NetworkError`].
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError>;
}
