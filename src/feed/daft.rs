//! Rental listings from the daft.ie listing gateway
//!
//! Pages through a location newest-first until a short page comes back,
//! pausing between pages. Running into the page limit first is an error,
//! never a partial snapshot. Transient failures (429 and 5xx) are retried with
//! exponential backoff; any other failure aborts the snapshot.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::time::Duration;

use super::wire::{SearchRequest, SearchResponse};
use super::{FeedError, SourceFeed};
use crate::config::FeedConfig;
use crate::models::{Listing, Partition};

/// Listing gateway client
pub struct DaftFeed {
    client: Client,
    config: FeedConfig,
}

impl DaftFeed {
    /// Create a feed client
    ///
    /// # Errors
    ///
    /// Returns `FeedError::InvalidConfig` for a zero page size and
    /// `FeedError::Http` if the HTTP client cannot be created
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        if config.page_size == 0 {
            return Err(FeedError::InvalidConfig(
                "page_size must be greater than 0".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .gzip(true)
            .build()?;

        Ok(Self { client, config })
    }

    fn search_url(&self) -> String {
        format!("{}/listings", self.config.base_url.trim_end_matches('/'))
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("brand", HeaderValue::from_static("daft"));
        headers.insert("platform", HeaderValue::from_static("web"));
        headers
    }

    /// Fetch one page with exponential backoff retry logic
    async fn fetch_page(
        &self,
        partition: &Partition,
        from: usize,
    ) -> Result<SearchResponse, FeedError> {
        let body = SearchRequest::rentals(&partition.location_id, from, self.config.page_size);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_delay_ms * 2_u64.pow(attempt - 1);
                tracing::debug!(
                    partition = %partition,
                    attempt,
                    delay_ms = delay,
                    "Retrying listing page"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self
                .client
                .post(self.search_url())
                .headers(Self::build_headers())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Self::decode(response).await;
                    } else if Self::should_retry(status.as_u16()) {
                        last_error = Some(FeedError::ServerError(status.as_u16()));
                        continue;
                    } else {
                        return Err(FeedError::ServerError(status.as_u16()));
                    }
                }
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        FeedError::Timeout
                    } else {
                        FeedError::Http(e)
                    });
                }
            }
        }

        let last = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string());
        Err(FeedError::MaxRetriesExceeded(last))
    }

    /// Retry on 429 and the usual transient 5xx codes
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    async fn decode(response: Response) -> Result<SearchResponse, FeedError> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FeedError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SourceFeed for DaftFeed {
    fn name(&self) -> &str {
        "daft"
    }

    async fn fetch_snapshot(&self, partition: &Partition) -> Result<Vec<Listing>, FeedError> {
        let page_size = self.config.page_size;
        let mut listings = Vec::new();
        let mut withheld = 0usize;

        for page in 0..self.config.max_pages {
            if page > 0 && !self.config.page_delay().is_zero() {
                tokio::time::sleep(self.config.page_delay()).await;
            }

            let response = self.fetch_page(partition, page * page_size).await?;
            let count = response.listings.len();

            for envelope in response.listings {
                let listing = envelope
                    .listing
                    .into_listing(&partition.key, &self.config.site_url);
                if listing.price_withheld {
                    withheld += 1;
                    tracing::debug!(partition = %partition, listing_id = listing.id, "Listing without usable price");
                }
                listings.push(listing);
            }

            tracing::debug!(partition = %partition, page, count, "Fetched listing page");

            if count < page_size {
                tracing::info!(
                    partition = %partition,
                    listings = listings.len(),
                    withheld,
                    "Snapshot fetched"
                );
                return Ok(listings);
            }
        }

        // Partial snapshots never reach reconciliation
        tracing::warn!(
            partition = %partition,
            max_pages = self.config.max_pages,
            fetched = listings.len(),
            "Page limit reached before the last page"
        );
        Err(FeedError::Truncated {
            max_pages: self.config.max_pages,
        })
    }
}
