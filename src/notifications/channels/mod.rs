//! Notification channels for delivering offer messages
//!
//! A channel takes an already rendered message and a routing key and
//! delivers it. Failures are reported, never retried here.

pub mod log;
pub mod telegram;

use async_trait::async_trait;

use crate::models::RoutingKey;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors that can occur during channel operations
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpError(reqwest::Error),

    /// Invalid channel configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The routing key cannot be used by this channel
    #[error("Invalid routing key '{0}'")]
    InvalidRoute(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Remote API rejected the message
    #[error("Rejected by remote API: {0}")]
    Rejected(String),

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

impl ChannelError {
    /// Whether a later attempt could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::HttpError(_) | Self::RateLimited { .. })
    }
}

/// Trait for notification channels
///
/// Implement this trait to add a delivery transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &str;

    /// Deliver one message to the given route
    async fn send(&self, message: &str, route: &RoutingKey) -> ChannelResult<()>;

    /// Check if the channel is available
    async fn health_check(&self) -> ChannelResult<bool> {
        Ok(true)
    }
}
