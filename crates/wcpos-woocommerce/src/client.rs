use async_trait::async_trait;
use tracing::{debug, warn};
use wcpos_api::ApiError;
use wcpos_query::{Page, PageRequest, RemoteSource};

use crate::config::WooConfig;
use crate::request::{build_query_pairs, page_number, parse_page};

const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";
const MAX_ERROR_BODY_CHARS: usize = 500;

/// WooCommerce REST client, authenticated with a consumer key pair.
#[derive(Clone)]
pub struct WooClient {
    config: WooConfig,
    client: reqwest::Client,
}

impl WooClient {
    pub fn new(config: WooConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &WooConfig {
        &self.config
    }

    fn format_reqwest_error(&self, e: reqwest::Error, url: &str) -> String {
        if e.is_timeout() {
            format!(
                "Failed to fetch {}: timeout - request took longer than {}s",
                url, self.config.timeout_secs
            )
        } else if e.is_connect() {
            format!(
                "Failed to fetch {}: connection error - check network connectivity and the store URL. Error: {}",
                url, e
            )
        } else if e.is_decode() {
            format!(
                "Failed to fetch {}: decode error - unexpected response format from server. Error: {}",
                url, e
            )
        } else {
            format!("Failed to fetch {}: {}", url, e)
        }
    }

    /// Body text of a successful response plus the total page count, if sent.
    async fn handle_response(
        response: reqwest::Response,
        url: &str,
    ) -> Result<(String, Option<u32>), ApiError> {
        let status = response.status();
        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let body = response.text().await.map_err(|e| {
            ApiError::network(format!("Failed to read response body from {}: {}", url, e))
        })?;

        if !status.is_success() {
            return Err(ApiError::network(format!(
                "HTTP {} error from {}: {}",
                status.as_u16(),
                url,
                truncate(&body)
            )));
        }

        Ok((body, total_pages))
    }
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}... (truncated)", &body[..cut]),
        None => body.to_string(),
    }
}

#[async_trait]
impl RemoteSource for WooClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        let url = self.config.endpoint(&request.collection);
        let page = page_number(&request.cursor)?;
        let query = build_query_pairs(request)?;
        debug!("[WooClient] GET {} page={} per_page={}", url, page, request.page_size);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .query(&query)
            .send()
            .await
            .map_err(|e| {
                let message = self.format_reqwest_error(e, &url);
                warn!("[WooClient] {}", message);
                ApiError::network(message)
            })?;

        let (body, total_pages) = Self::handle_response(response, &url).await?;
        let page = parse_page(&body, page, request.page_size, total_pages)?;
        debug!(
            "[WooClient] {} returned {} items (has_more={})",
            url,
            page.items.len(),
            page.has_more()
        );
        Ok(page)
    }
}

impl std::fmt::Debug for WooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WooClient")
            .field("base_url", &self.config.base_url)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish()
    }
}
