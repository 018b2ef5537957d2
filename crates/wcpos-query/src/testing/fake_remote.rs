use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use wcpos_api::{ApiError, Document};

use crate::config::CollectionConfig;
use crate::core::selector::{compile, evaluate};
use crate::locks::lock;
use crate::sync::{Page, PageRequest, RemoteSource};

#[derive(Default)]
struct FakeState {
    datasets: HashMap<String, (CollectionConfig, Vec<Document>)>,
    requests: Vec<PageRequest>,
    failures: VecDeque<ApiError>,
}

/// In-memory [`RemoteSource`] over seeded datasets.
///
/// Applies search, filters and sort the way the server would, paginates with
/// an offset cursor, records every request, can fail on demand and can be
/// paused to hold fetches open.
pub struct FakeRemote {
    state: Mutex<FakeState>,
    paused: watch::Sender<bool>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Mutex::new(FakeState::default()),
            paused,
        }
    }

    pub fn with_dataset(
        self,
        collection: impl Into<String>,
        config: CollectionConfig,
        documents: Vec<Document>,
    ) -> Self {
        self.set_dataset(collection, config, documents);
        self
    }

    pub fn set_dataset(
        &self,
        collection: impl Into<String>,
        config: CollectionConfig,
        documents: Vec<Document>,
    ) {
        lock(&self.state)
            .datasets
            .insert(collection.into(), (config, documents));
    }

    /// Fail the next fetch with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: ApiError) {
        lock(&self.state).failures.push_back(error);
    }

    /// Hold every fetch (including ones already waiting) until `resume`.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        lock(&self.state).requests.clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Requests whose normalized search equals `text`.
    pub fn requests_with_search(&self, text: &str) -> usize {
        lock(&self.state)
            .requests
            .iter()
            .filter(|request| request.params.normalized_search() == Some(text))
            .count()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        lock(&self.state).requests.push(request.clone());

        let mut paused = self.paused.subscribe();
        if paused.wait_for(|is_paused| !*is_paused).await.is_err() {
            return Err(ApiError::network("fake remote shut down"));
        }

        let mut state = lock(&self.state);
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let Some((config, documents)) = state.datasets.get(&request.collection) else {
            return Ok(Page::default());
        };
        let matched = evaluate(documents.iter(), &compile(&request.params, config));

        let offset = match request.cursor.cursor() {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| ApiError::InvalidOperation {
                message: format!("bad cursor '{}'", cursor),
            })?,
            None => 0,
        };
        let end = (offset + request.page_size).min(matched.len());
        let items = matched.get(offset..end).map(<[Document]>::to_vec).unwrap_or_default();
        let next_cursor = (end < matched.len()).then(|| end.to_string());

        Ok(Page { items, next_cursor })
    }
}
