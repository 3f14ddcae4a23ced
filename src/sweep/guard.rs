//! Cold-start guard
//!
//! A partition that has never been populated would otherwise announce its
//! entire first snapshot. Notifications stay off until the store holds at
//! least one published offer for the partition.

use anyhow::Result;

use crate::models::Partition;
use crate::storage::OfferRepository;

/// Whether dispatch is allowed for `partition` in this sweep
///
/// Must be evaluated before the partition's persist step.
pub fn should_notify(store: &dyn OfferRepository, partition: &Partition) -> Result<bool> {
    store.has_any_published(&partition.key)
}
