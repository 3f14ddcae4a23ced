//! rentwatch - rental listing watcher
//!
//! Periodically sweeps a registry of search partitions, compares each
//! snapshot from the listing feed with the offers already stored, and
//! notifies about new listings and price changes.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Listings, offers and partitions
//! - [`feed`] - Listing feed client with paging and retries
//! - [`storage`] - Offer repository (SQLite, in-memory)
//! - [`sweep`] - Reconciler, cold-start guard and sweep orchestrator
//! - [`notifications`] - Message rendering and rate-limited dispatch
//! - [`scheduler`] - Daily trigger and sweep serialisation
//! - [`server`] - HTTP trigger surface
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rentwatch::config::Config;
//! use rentwatch::feed::DaftFeed;
//! use rentwatch::notifications::{build_channel, Dispatcher, MessageRenderer};
//! use rentwatch::storage::open_repository;
//! use rentwatch::sweep::{SweepOrchestrator, SweepTrigger};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = open_repository(&config.storage)?;
//!     let feed = Arc::new(DaftFeed::new(config.feed.clone())?);
//!     let dispatcher = Dispatcher::new(
//!         build_channel(&config.notifier)?,
//!         MessageRenderer::new(config.dispatch.currency.clone()),
//!         config.dispatch.policy(),
//!     );
//!     let orchestrator = SweepOrchestrator::new(config.partitions(), store, feed, dispatcher);
//!     let report = orchestrator.run(SweepTrigger::Cli).await;
//!     println!("{} partitions completed", report.completed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod sweep;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::feed::{DaftFeed, SourceFeed};
    pub use crate::models::{Listing, Offer, OfferId, OfferState, Partition, RoutingKey};
    pub use crate::notifications::{Channel, Dispatcher, MessageRenderer};
    pub use crate::storage::{OfferRepository, SharedOfferRepository};
    pub use crate::sweep::{SweepOrchestrator, SweepReport, SweepTrigger};
}

// Direct re-exports for convenience
pub use models::{Listing, Offer, Partition};
