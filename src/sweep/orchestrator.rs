//! Sweep orchestrator
//!
//! Walks the partition registry in order and runs each active partition
//! through fetch, reconcile, guard, dispatch and persist. Every partition
//! is an isolation boundary: whatever goes wrong inside it becomes a
//! [`PartitionOutcome`] and the sweep moves on.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::guard::should_notify;
use super::journal::SweepJournal;
use super::reconcile::reconcile;
use super::report::{ChangeIds, PartitionOutcome, PartitionReport, SweepReport, SweepTrigger};
use crate::feed::SourceFeed;
use crate::models::{Listing, Offer, OfferId, Partition};
use crate::notifications::Dispatcher;
use crate::storage::SharedOfferRepository;

/// Drives sweeps over an injected partition registry
pub struct SweepOrchestrator {
    partitions: Vec<Partition>,
    store: SharedOfferRepository,
    feed: Arc<dyn SourceFeed>,
    dispatcher: Dispatcher,
    pace: Duration,
    journal: SweepJournal,
    shutdown: Option<watch::Receiver<bool>>,
}

impl SweepOrchestrator {
    pub fn new(
        partitions: Vec<Partition>,
        store: SharedOfferRepository,
        feed: Arc<dyn SourceFeed>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            partitions,
            store,
            feed,
            dispatcher,
            pace: Duration::ZERO,
            journal: SweepJournal::disabled(),
            shutdown: None,
        }
    }

    /// Delay between partitions; zero disables pacing
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_journal(mut self, journal: SweepJournal) -> Self {
        self.journal = journal;
        self
    }

    /// Stop before the next partition once `true` is published
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn store(&self) -> &SharedOfferRepository {
        &self.store
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run one sweep over every active partition
    pub async fn run(&self, trigger: SweepTrigger) -> SweepReport {
        let _timer = crate::metrics::start_sweep_timer(trigger.as_str());
        crate::metrics::set_sweep_running(true);

        let mut report = SweepReport::new(trigger);
        let active: Vec<&Partition> = self.partitions.iter().filter(|p| p.active).collect();

        tracing::info!(
            sweep_id = %report.id,
            trigger = %trigger,
            active = active.len(),
            inactive = self.partitions.len() - active.len(),
            "Sweep started"
        );

        for (index, partition) in active.iter().enumerate() {
            if self.shutdown_requested() {
                tracing::warn!(
                    sweep_id = %report.id,
                    remaining = active.len() - index,
                    "Shutdown requested, stopping sweep"
                );
                report.interrupted = true;
                break;
            }

            let started_at = Utc::now();
            let outcome = self.process_partition(partition).await;
            let entry = PartitionReport {
                partition: partition.key.clone(),
                started_at,
                finished_at: Utc::now(),
                outcome,
            };

            crate::metrics::record_partition_outcome(&partition.key, entry.outcome.tag());
            self.journal.record(&report, &entry).await;
            report.partitions.push(entry);

            if index + 1 < active.len() && !self.pace.is_zero() {
                self.pace_wait().await;
            }
        }

        report.finished_at = Utc::now();
        crate::metrics::set_sweep_running(false);

        if report.all_failed() {
            tracing::error!(
                sweep_id = %report.id,
                partitions = report.partitions.len(),
                "Every partition failed in this sweep"
            );
        } else {
            tracing::info!(
                sweep_id = %report.id,
                completed = report.completed(),
                failed = report.failed(),
                notifications = report.notifications_sent(),
                duration_ms = report.duration().num_milliseconds(),
                "Sweep finished"
            );
        }

        report
    }

    /// Process one partition behind its error boundary
    pub async fn process_partition(&self, partition: &Partition) -> PartitionOutcome {
        // FETCH
        let snapshot = match self.feed.fetch_snapshot(partition).await {
            Ok(snapshot) if snapshot.is_empty() => {
                tracing::warn!(partition = %partition, "Feed returned an empty snapshot");
                return PartitionOutcome::FetchFailed {
                    error: "empty snapshot".to_string(),
                };
            }
            Ok(snapshot) => dedupe(snapshot),
            Err(e) => {
                tracing::warn!(partition = %partition, feed = self.feed.name(), error = %e, "Fetch failed");
                return PartitionOutcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        // RECONCILE + GUARD, both against the state before this sweep
        let known = match self.store.published_prices(&partition.key) {
            Ok(known) => known,
            Err(e) => return store_failed(partition, e),
        };
        let notify = match should_notify(self.store.as_ref(), partition) {
            Ok(notify) => notify,
            Err(e) => return store_failed(partition, e),
        };
        let ids: Vec<OfferId> = snapshot.iter().map(|listing| listing.id).collect();
        let owners = match self.store.published_owners(&ids) {
            Ok(owners) => owners,
            Err(e) => return store_failed(partition, e),
        };

        let snapshot = claim(snapshot, &owners, partition);
        let snapshot = resolve_withheld(snapshot, &known, partition);

        let reconciliation = reconcile(&snapshot, &known);
        let changes = ChangeIds::from(&reconciliation);
        let summary = reconciliation.summary();

        crate::metrics::record_partition_changes(
            &partition.key,
            snapshot.len(),
            summary.new,
            summary.changed,
            summary.withdrawn,
        );
        tracing::info!(
            partition = %partition,
            snapshot = snapshot.len(),
            new = summary.new,
            changed = summary.changed,
            withdrawn = summary.withdrawn,
            "Partition reconciled"
        );

        // DISPATCH
        let dispatch = if notify {
            Some(
                self.dispatcher
                    .dispatch(
                        &reconciliation.new,
                        &reconciliation.changed,
                        &partition.routing_key,
                    )
                    .await,
            )
        } else {
            tracing::info!(
                partition = %partition,
                suppressed = summary.new + summary.changed,
                "Cold start, notifications suppressed"
            );
            None
        };

        // PERSIST
        let seen_at = Utc::now();
        let offers: Vec<Offer> = snapshot
            .iter()
            .map(|listing| {
                let mut offer = Offer::from_listing(listing, seen_at);
                offer.partition = partition.key.clone();
                offer
            })
            .collect();

        match self.store.apply_partition(&offers, &reconciliation.withdrawn) {
            Ok(persist) => PartitionOutcome::Completed {
                snapshot: snapshot.len(),
                changes,
                notified: notify,
                dispatch,
                persist,
            },
            Err(e) => {
                tracing::error!(partition = %partition, error = %format!("{e:#}"), "Persist failed, changes discarded");
                PartitionOutcome::PersistFailed {
                    error: format!("{e:#}"),
                    changes,
                    dispatch,
                }
            }
        }
    }

    async fn pace_wait(&self) {
        tracing::debug!(pace_secs = self.pace.as_secs(), "Pacing before next partition");
        let Some(mut shutdown) = self.shutdown.clone() else {
            tokio::time::sleep(self.pace).await;
            return;
        };

        tokio::select! {
            _ = tokio::time::sleep(self.pace) => {}
            _ = async {
                // A dropped sender never signals; keep sleeping then
                if shutdown.wait_for(|stop| *stop).await.is_err() {
                    std::future::pending::<()>().await;
                }
            } => {}
        }
    }
}

fn store_failed(partition: &Partition, error: anyhow::Error) -> PartitionOutcome {
    tracing::warn!(partition = %partition, error = %format!("{error:#}"), "Store read failed");
    PartitionOutcome::StoreFailed {
        error: format!("{error:#}"),
    }
}

/// Drop listings that another partition holds as published
///
/// An id belongs to one partition at a time. It moves once its owner stops
/// reporting it and pauses it.
fn claim(
    snapshot: Vec<Listing>,
    owners: &HashMap<OfferId, String>,
    partition: &Partition,
) -> Vec<Listing> {
    let before = snapshot.len();
    let claimed: Vec<Listing> = snapshot
        .into_iter()
        .filter(|listing| {
            owners
                .get(&listing.id)
                .map_or(true, |owner| *owner == partition.key)
        })
        .collect();

    if claimed.len() < before {
        tracing::debug!(
            partition = %partition,
            skipped = before - claimed.len(),
            "Listings owned by another partition skipped"
        );
    }
    claimed
}

/// Carry the stored price for listings that no longer show one
///
/// A withheld price on an unknown id leaves nothing to announce or
/// store, so the listing is dropped.
fn resolve_withheld(
    snapshot: Vec<Listing>,
    known: &HashMap<OfferId, i64>,
    partition: &Partition,
) -> Vec<Listing> {
    snapshot
        .into_iter()
        .filter_map(|mut listing| {
            if !listing.price_withheld {
                return Some(listing);
            }
            match known.get(&listing.id) {
                Some(price) => {
                    listing.price = *price;
                    Some(listing)
                }
                None => {
                    tracing::debug!(partition = %partition, listing_id = listing.id, "Unknown listing without price dropped");
                    None
                }
            }
        })
        .collect()
}

/// Drop repeated ids, keeping the first occurrence
fn dedupe(snapshot: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::with_capacity(snapshot.len());
    snapshot
        .into_iter()
        .filter(|listing| seen.insert(listing.id))
        .collect()
}
