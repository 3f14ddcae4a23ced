//! Common test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use rentwatch::feed::{FeedError, SourceFeed};
use rentwatch::models::{Listing, ListingDetails, Offer, OfferId, OfferState, Partition, RoutingKey};
use rentwatch::notifications::{
    BatchPolicy, Channel, ChannelError, ChannelResult, Dispatcher, MessageRenderer,
};
use rentwatch::storage::{
    MockOfferRepository, OfferFilter, OfferRepository, OfferStats, PersistSummary,
    SharedOfferRepository,
};
use rentwatch::sweep::SweepOrchestrator;

// ============================================================================
// Listings and offers
// ============================================================================

/// Published listing with a title and url
pub fn listing(id: OfferId, partition: &str, price: i64) -> Listing {
    Listing::new(id, partition, price)
        .with_url(format!("https://www.daft.ie/for-rent/{id}"))
        .with_details(ListingDetails {
            title: format!("Apartment {id}, {partition}"),
            num_bedrooms: Some(2),
            ..ListingDetails::default()
        })
}

/// Published offer as it would have been stored by an earlier sweep
pub fn stored_offer(id: OfferId, partition: &str, price: i64) -> Offer {
    Offer::from_listing(&listing(id, partition, price), Utc::now())
}

pub fn paused_offer(id: OfferId, partition: &str, price: i64) -> Offer {
    let mut offer = stored_offer(id, partition, price);
    offer.state = OfferState::Paused;
    offer
}

// ============================================================================
// Scripted feed
// ============================================================================

enum Script {
    Snapshot(Vec<Listing>),
    Fail(u16),
    Truncated(usize),
}

/// Feed returning whatever each partition was last scripted with
#[derive(Default)]
pub struct ScriptedFeed {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, partition: &str, listings: Vec<Listing>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(partition.to_string(), Script::Snapshot(listings));
    }

    pub fn fail(&self, partition: &str, status: u16) {
        self.scripts
            .lock()
            .unwrap()
            .insert(partition.to_string(), Script::Fail(status));
    }

    /// Report that the page limit was hit
    pub fn truncate(&self, partition: &str, max_pages: usize) {
        self.scripts
            .lock()
            .unwrap()
            .insert(partition.to_string(), Script::Truncated(max_pages));
    }

    /// Partition keys in the order they were fetched
    pub fn fetched(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl SourceFeed for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_snapshot(&self, partition: &Partition) -> Result<Vec<Listing>, FeedError> {
        self.calls
            .lock()
            .unwrap()
            .push((partition.key.clone(), Instant::now()));

        match self.scripts.lock().unwrap().get(&partition.key) {
            Some(Script::Snapshot(listings)) => Ok(listings.clone()),
            Some(Script::Fail(status)) => Err(FeedError::ServerError(*status)),
            Some(Script::Truncated(max_pages)) => Err(FeedError::Truncated {
                max_pages: *max_pages,
            }),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// Recording channel
// ============================================================================

/// Channel that keeps every delivered message
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, RoutingKey)>>,
    reject: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every following message
    pub fn reject_all(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn routes(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.as_str().to_string())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &str, route: &RoutingKey) -> ChannelResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected("chat not found".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((message.to_string(), route.clone()));
        Ok(())
    }
}

// ============================================================================
// Store with switchable failures
// ============================================================================

/// In-memory store whose reads or writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MockOfferRepository,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn with_offers(offers: impl IntoIterator<Item = Offer>) -> Arc<Self> {
        Arc::new(Self {
            inner: MockOfferRepository::with_offers(offers),
            ..Self::default()
        })
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> anyhow::Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }

    fn check_write(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        Ok(())
    }
}

impl OfferRepository for FlakyStore {
    fn published_prices(&self, partition: &str) -> anyhow::Result<HashMap<OfferId, i64>> {
        self.check_read()?;
        self.inner.published_prices(partition)
    }

    fn has_any_published(&self, partition: &str) -> anyhow::Result<bool> {
        self.check_read()?;
        self.inner.has_any_published(partition)
    }

    fn published_owners(&self, ids: &[OfferId]) -> anyhow::Result<HashMap<OfferId, String>> {
        self.check_read()?;
        self.inner.published_owners(ids)
    }

    fn upsert_offers(&self, offers: &[Offer]) -> anyhow::Result<usize> {
        self.check_write()?;
        self.inner.upsert_offers(offers)
    }

    fn mark_paused(&self, ids: &[OfferId]) -> anyhow::Result<usize> {
        self.check_write()?;
        self.inner.mark_paused(ids)
    }

    fn apply_partition(
        &self,
        offers: &[Offer],
        withdrawn: &[OfferId],
    ) -> anyhow::Result<PersistSummary> {
        self.check_write()?;
        self.inner.apply_partition(offers, withdrawn)
    }

    fn get_offer(&self, id: OfferId) -> anyhow::Result<Option<Offer>> {
        self.inner.get_offer(id)
    }

    fn list_offers(&self, filter: &OfferFilter) -> anyhow::Result<Vec<Offer>> {
        self.inner.list_offers(filter)
    }

    fn stats(&self) -> anyhow::Result<OfferStats> {
        self.inner.stats()
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Orchestrator without pauses, delivering to `channel`
pub fn orchestrator(
    partitions: Vec<Partition>,
    store: SharedOfferRepository,
    feed: Arc<ScriptedFeed>,
    channel: Arc<RecordingChannel>,
) -> SweepOrchestrator {
    let dispatcher = Dispatcher::new(channel, MessageRenderer::default(), BatchPolicy::immediate());
    SweepOrchestrator::new(partitions, store, feed, dispatcher)
}

/// Published offer ids stored for a partition, ascending
pub fn published_ids(store: &dyn OfferRepository, partition: &str) -> Vec<OfferId> {
    let mut ids: Vec<OfferId> = store
        .published_prices(partition)
        .unwrap()
        .into_keys()
        .collect();
    ids.sort_unstable();
    ids
}
