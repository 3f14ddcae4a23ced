//! Notification delivery for new and price-changed offers
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      Dispatcher                            │
//! │  - new offers first, then price changes    │
//! │  - fixed-size batches with pauses          │
//! │  - failures counted, never retried         │
//! └────────────────────────────────────────────┘
//!                     │ MessageRenderer
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//!   ┌──────────┐            ┌─────────┐
//!   │ Telegram │            │   Log   │
//!   │ Channel  │            │ Channel │
//!   └──────────┘            └─────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use rentwatch::notifications::{BatchPolicy, Dispatcher, LogChannel, MessageRenderer};
//!
//! let dispatcher = Dispatcher::new(
//!     Arc::new(LogChannel::new()),
//!     MessageRenderer::default(),
//!     BatchPolicy::default(),
//! );
//! let report = dispatcher.dispatch(&new, &changed, &partition.routing_key).await;
//! ```

pub mod channels;
pub mod dispatcher;
pub mod render;

use std::sync::Arc;

pub use channels::log::LogChannel;
pub use channels::telegram::{TelegramChannel, TelegramConfig};
pub use channels::{Channel, ChannelError, ChannelResult};
pub use dispatcher::{BatchPolicy, DispatchReport, Dispatcher};
pub use render::{MessageRenderer, Notification};

use crate::config::NotifierConfig;

/// Build the channel selected in configuration
pub fn build_channel(config: &NotifierConfig) -> ChannelResult<Arc<dyn Channel>> {
    match config.telegram.as_ref() {
        Some(telegram) if !config.dry_run => {
            Ok(Arc::new(TelegramChannel::new(telegram.clone())?))
        }
        _ => {
            tracing::info!("No Telegram transport configured, notifications go to the log");
            Ok(Arc::new(LogChannel::new()))
        }
    }
}
