//! Snapshot reconciliation
//!
//! Classifies a partition's fresh snapshot against the stored map of
//! published offer prices. Pure: no I/O, no clock.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{Listing, OfferId};

/// A listing whose price moved since it was last persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceChange {
    pub listing: Listing,
    pub old_price: i64,
}

impl PriceChange {
    /// New price minus old price
    pub fn delta(&self) -> i64 {
        self.listing.price - self.old_price
    }
}

/// Result of diffing one snapshot against stored state
///
/// `new` and `changed` keep snapshot order. `withdrawn` is sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reconciliation {
    pub new: Vec<Listing>,
    pub changed: Vec<PriceChange>,
    pub withdrawn: Vec<OfferId>,
}

impl Reconciliation {
    /// True when nothing needs notifying or pausing
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.changed.is_empty() && self.withdrawn.is_empty()
    }

    pub fn new_ids(&self) -> Vec<OfferId> {
        self.new.iter().map(|l| l.id).collect()
    }

    pub fn changed_ids(&self) -> Vec<OfferId> {
        self.changed.iter().map(|c| c.listing.id).collect()
    }

    /// Compact `new/changed/withdrawn` counts for logs
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            new: self.new.len(),
            changed: self.changed.len(),
            withdrawn: self.withdrawn.len(),
        }
    }
}

/// Set sizes of a reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub new: usize,
    pub changed: usize,
    pub withdrawn: usize,
}

/// Diff `snapshot` against `known` (published id → stored price)
///
/// - new: absent from `known` and reported as published
/// - changed: present in `known` with a different price
/// - withdrawn: in `known` but absent from the snapshot, whatever the
///   snapshot's reported state would have been
pub fn reconcile(snapshot: &[Listing], known: &HashMap<OfferId, i64>) -> Reconciliation {
    let mut result = Reconciliation::default();
    let mut seen: HashSet<OfferId> = HashSet::with_capacity(snapshot.len());

    for listing in snapshot {
        // Feeds can repeat a listing across pages; first occurrence wins
        if !seen.insert(listing.id) {
            continue;
        }

        match known.get(&listing.id) {
            None if listing.is_published() => result.new.push(listing.clone()),
            None => {}
            Some(&old_price) if old_price != listing.price => {
                result.changed.push(PriceChange {
                    listing: listing.clone(),
                    old_price,
                });
            }
            Some(_) => {}
        }
    }

    result.withdrawn = known
        .keys()
        .filter(|id| !seen.contains(id))
        .copied()
        .collect();
    result.withdrawn.sort_unstable();

    result
}
