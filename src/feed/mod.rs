//! Source feed: fetches the current listing snapshot of one partition

pub mod daft;
pub mod wire;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Listing, Partition};

pub use daft::DaftFeed;

/// Errors that can occur while fetching a snapshot
#[derive(Error, Debug)]
pub enum FeedError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded (last: {0})")]
    MaxRetriesExceeded(String),

    /// Response body could not be decoded
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The page limit was hit before the feed ran out of listings
    #[error("Snapshot truncated at {max_pages} pages")]
    Truncated { max_pages: usize },

    /// Invalid feed configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeedError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout | Self::ServerError(_) | Self::MaxRetriesExceeded(_)
        )
    }
}

/// A source of listing snapshots
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Name of the feed, for logs
    fn name(&self) -> &str;

    /// Every listing the feed currently reports for `partition`
    async fn fetch_snapshot(&self, partition: &Partition) -> Result<Vec<Listing>, FeedError>;
}
