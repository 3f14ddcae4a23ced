//! Log-only channel, used for dry runs and when no transport is configured

use async_trait::async_trait;

use super::{Channel, ChannelResult};
use crate::models::RoutingKey;

/// Writes every message to the tracing log instead of delivering it
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &str, route: &RoutingKey) -> ChannelResult<()> {
        tracing::info!(route = %route, "notification\n{message}");
        Ok(())
    }
}
