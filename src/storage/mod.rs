//! Offer persistence
//!
//! SQLite holds one row per offer; the in-memory repository backs tests
//! and dry runs. See [`repository`] for the trait and both implementations.

pub mod lock;
pub mod repository;

use anyhow::Result;

use crate::config::StorageConfig;

pub use lock::SweepLock;
pub use repository::{
    create_mock_repository, create_sqlite_repository, MockOfferRepository, OfferFilter,
    OfferRepository, OfferStats, PersistSummary, SharedOfferRepository, SqliteOfferRepository,
};

/// Open the repository described by the storage config
pub fn open_repository(config: &StorageConfig) -> Result<SharedOfferRepository> {
    if config.in_memory {
        tracing::warn!("Using in-memory offer repository; state is lost on exit");
        return Ok(create_mock_repository());
    }
    create_sqlite_repository(&config.sqlite_path)
}
