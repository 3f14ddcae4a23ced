//! Unified error handling for the rentwatch crate
//!
//! Domain errors stay in their modules ([`FeedError`], [`ChannelError`],
//! [`SchedulerError`]); [`Error`] wraps them where a single type is needed,
//! for instance at the HTTP boundary.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rentwatch::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = ?err.category(), "Retry later: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use thiserror::Error;

pub use crate::feed::FeedError;
pub use crate::notifications::ChannelError;
pub use crate::scheduler::error::SchedulerError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Feed and notification transport errors
    Network,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Scheduler and timing errors
    Scheduler,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
        }
    }
}

/// Unified error type for the rentwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Listing feed errors
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Notification channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Scheduler and timing errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Offer store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Requested offer does not exist
    #[error("Offer not found: {0}")]
    NotFound(i64),

    /// Malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Feed(e) => e.is_recoverable(),
            Self::Channel(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Storage(_) => false,
            Self::NotFound(_) | Self::InvalidRequest(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Feed(_) | Self::Channel(_) => ErrorCategory::Network,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Storage(_) | Self::NotFound(_) => ErrorCategory::Storage,
            Self::InvalidRequest(_) => ErrorCategory::Config,
        }
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}

// Repositories report through anyhow; keep the full context chain
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
