//! End-to-end sweeps over scripted feeds and in-memory stores

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    listing, orchestrator, paused_offer, published_ids, stored_offer, FlakyStore, RecordingChannel,
    ScriptedFeed,
};
use rentwatch::models::{Listing, ListingState, OfferState, Partition};
use rentwatch::storage::{
    create_mock_repository, MockOfferRepository, OfferFilter, OfferRepository,
    SqliteOfferRepository,
};
use rentwatch::sweep::{PartitionOutcome, SweepJournal, SweepTrigger};
use tempfile::TempDir;

fn donegal() -> Partition {
    Partition::new("donegal", "35", "7")
}

#[tokio::test]
async fn test_first_sweep_is_silent_and_fills_store() {
    let store = create_mock_repository();
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![
            listing(1, "donegal", 900),
            listing(2, "donegal", 1000),
            listing(3, "donegal", 1100),
        ],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let entry = report.partition("donegal").unwrap();
    match &entry.outcome {
        PartitionOutcome::Completed {
            changes,
            notified,
            dispatch,
            persist,
            ..
        } => {
            assert_eq!(changes.new, vec![1, 2, 3]);
            assert!(!notified);
            assert!(dispatch.is_none());
            assert_eq!(persist.upserted, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(channel.count(), 0);
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_new_and_price_change_are_notified_in_order() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        stored_offer(2, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![
            listing(2, "donegal", 1100),
            listing(1, "donegal", 900),
            listing(3, "donegal", 800),
        ],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Scheduled).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert_eq!(changes.new, vec![3]);
    assert_eq!(changes.changed, vec![2]);
    assert!(changes.withdrawn.is_empty());

    let messages = channel.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("🏠 New: €800/month"));
    assert!(messages[1].contains("Price change: €1,100/month (was €1,000, +€100)"));
    assert_eq!(channel.routes(), vec!["7", "7"]);

    assert_eq!(store.get_offer(2).unwrap().unwrap().price, 1100);
    assert_eq!(report.notifications_sent(), 2);
}

#[tokio::test]
async fn test_missing_listing_is_paused_without_message() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        stored_offer(2, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set("donegal", vec![listing(1, "donegal", 900)]);

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert_eq!(changes.withdrawn, vec![2]);
    assert!(changes.new.is_empty());
    assert!(changes.changed.is_empty());
    assert_eq!(channel.count(), 0);

    let withdrawn = store.get_offer(2).unwrap().unwrap();
    assert_eq!(withdrawn.state, OfferState::Paused);
    assert_eq!(withdrawn.price, 1000);
}

#[tokio::test]
async fn test_paused_listing_reappearing_is_new_again() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        paused_offer(2, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert_eq!(changes.new, vec![2]);
    assert_eq!(channel.count(), 1);
    assert_eq!(
        store.get_offer(2).unwrap().unwrap().state,
        OfferState::Published
    );
}

#[tokio::test]
async fn test_unpublished_snapshot_entry_is_stored_paused() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![
            listing(1, "donegal", 900),
            listing(5, "donegal", 700).with_state(ListingState::Paused),
        ],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert!(changes.new.is_empty());
    assert_eq!(channel.count(), 0);
    assert_eq!(
        store.get_offer(5).unwrap().unwrap().state,
        OfferState::Paused
    );
}

#[tokio::test]
async fn test_failing_partition_does_not_affect_others() {
    let store = create_mock_repository();
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set("donegal", vec![listing(1, "donegal", 900)]);
    feed.fail("sligo", 503);
    feed.set("leitrim", vec![listing(3, "leitrim", 650)]);

    let partitions = vec![
        donegal(),
        Partition::new("sligo", "36", ""),
        Partition::new("leitrim", "34", ""),
    ];
    let sweep = orchestrator(partitions, store.clone(), feed.clone(), channel);
    let report = sweep.run(SweepTrigger::Scheduled).await;

    assert_eq!(feed.fetched(), vec!["donegal", "sligo", "leitrim"]);
    assert_eq!(report.partitions.len(), 3);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.failed(), 1);
    assert!(!report.all_failed());

    let sligo = report.partition("sligo").unwrap();
    assert_eq!(sligo.outcome.tag(), "fetch_failed");
    assert!(sligo.outcome.error().unwrap().contains("503"));

    assert_eq!(published_ids(store.as_ref(), "leitrim"), vec![3]);
    assert!(published_ids(store.as_ref(), "sligo").is_empty());
}

#[tokio::test]
async fn test_fetch_failure_leaves_stored_offers_untouched() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        stored_offer(2, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    feed.fail("donegal", 500);

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, RecordingChannel::new());
    let report = sweep.run(SweepTrigger::Cli).await;

    assert!(report.all_failed());
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![1, 2]);
}

#[tokio::test]
async fn test_empty_snapshot_never_withdraws() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
    ]));
    let feed = ScriptedFeed::new();
    feed.set("donegal", Vec::new());

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, RecordingChannel::new());
    let report = sweep.run(SweepTrigger::Cli).await;

    assert_eq!(
        report.partition("donegal").unwrap().outcome.tag(),
        "fetch_failed"
    );
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![1]);
}

#[tokio::test]
async fn test_inactive_partition_is_skipped() {
    let feed = ScriptedFeed::new();
    feed.set("donegal", vec![listing(1, "donegal", 900)]);
    feed.set("sligo", vec![listing(2, "sligo", 800)]);

    let partitions = vec![donegal(), Partition::new("sligo", "36", "").inactive()];
    let sweep = orchestrator(
        partitions,
        create_mock_repository(),
        feed.clone(),
        RecordingChannel::new(),
    );
    let report = sweep.run(SweepTrigger::Cli).await;

    assert_eq!(feed.fetched(), vec!["donegal"]);
    assert_eq!(report.partitions.len(), 1);
    assert!(report.partition("sligo").is_none());
}

#[tokio::test]
async fn test_second_sweep_notifies_after_cold_start() {
    let store = create_mock_repository();
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    let sweep = orchestrator(vec![donegal()], store.clone(), feed.clone(), channel.clone());

    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    sweep.run(SweepTrigger::Cli).await;
    assert_eq!(channel.count(), 0);

    feed.set(
        "donegal",
        vec![
            listing(1, "donegal", 900),
            listing(2, "donegal", 1000),
            listing(4, "donegal", 1250),
        ],
    );
    let report = sweep.run(SweepTrigger::Cli).await;

    assert_eq!(channel.count(), 1);
    assert!(channel.messages()[0].starts_with("🏠 New: €1,250/month"));
    match &report.partition("donegal").unwrap().outcome {
        PartitionOutcome::Completed { notified, .. } => assert!(notified),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_repeated_snapshot_is_idempotent() {
    let store = create_mock_repository();
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    let sweep = orchestrator(vec![donegal()], store.clone(), feed.clone(), channel.clone());

    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    sweep.run(SweepTrigger::Cli).await;
    let before = store.stats().unwrap();

    let report = sweep.run(SweepTrigger::Cli).await;
    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();

    assert!(changes.new.is_empty());
    assert!(changes.changed.is_empty());
    assert!(changes.withdrawn.is_empty());
    assert_eq!(channel.count(), 0);
    assert_eq!(store.stats().unwrap(), before);
}

#[tokio::test]
async fn test_persist_failure_discards_changes_and_redetects_later() {
    let store = FlakyStore::with_offers([stored_offer(1, "donegal", 900)]);
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());

    store.fail_writes(true);
    let report = sweep.run(SweepTrigger::Cli).await;
    let entry = report.partition("donegal").unwrap();
    assert_eq!(entry.outcome.tag(), "persist_failed");
    assert!(entry.outcome.error().unwrap().contains("disk I/O error"));
    // Notifications went out before the write failed
    assert_eq!(channel.count(), 1);
    assert!(store.get_offer(2).unwrap().is_none());

    store.fail_writes(false);
    let report = sweep.run(SweepTrigger::Cli).await;
    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert_eq!(changes.new, vec![2]);
    assert_eq!(channel.count(), 2);
    assert!(store.get_offer(2).unwrap().is_some());
}

#[tokio::test]
async fn test_store_read_failure_skips_dispatch() {
    let store = FlakyStore::with_offers([stored_offer(1, "donegal", 900)]);
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    store.fail_reads(true);

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    assert_eq!(
        report.partition("donegal").unwrap().outcome.tag(),
        "store_failed"
    );
    assert_eq!(channel.count(), 0);
    assert!(store.get_offer(2).unwrap().is_none());
}

#[tokio::test]
async fn test_delivery_failures_are_counted_and_state_still_persisted() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    channel.reject_all(true);
    feed.set(
        "donegal",
        vec![
            listing(1, "donegal", 950),
            listing(2, "donegal", 1000),
            listing(3, "donegal", 1100),
        ],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel);
    let report = sweep.run(SweepTrigger::Cli).await;

    let dispatch = report.partition("donegal").unwrap().outcome.dispatch().unwrap();
    assert_eq!(dispatch.sent, 0);
    assert_eq!(dispatch.failed, 3);
    assert_eq!(dispatch.failed_ids, vec![2, 3, 1]);
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![1, 2, 3]);
    assert_eq!(store.get_offer(1).unwrap().unwrap().price, 950);
}

#[tokio::test]
async fn test_overlapping_partitions_announce_once() {
    let store = create_mock_repository();
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set("a", vec![listing(1, "a", 700)]);
    feed.set("b", vec![listing(2, "b", 800)]);

    let partitions = vec![Partition::new("a", "1", ""), Partition::new("b", "2", "")];
    let sweep = orchestrator(partitions, store.clone(), feed.clone(), channel.clone());
    sweep.run(SweepTrigger::Cli).await;
    assert_eq!(channel.count(), 0);

    // Listing 5 sits inside both areas
    feed.set("a", vec![listing(1, "a", 700), listing(5, "a", 950)]);
    feed.set("b", vec![listing(2, "b", 800), listing(5, "b", 950)]);
    for _ in 0..3 {
        sweep.run(SweepTrigger::Scheduled).await;
    }

    assert_eq!(channel.count(), 1);
    let offer = store.get_offer(5).unwrap().unwrap();
    assert_eq!(offer.partition, "a");
    assert!(offer.is_published());
    assert_eq!(published_ids(store.as_ref(), "b"), vec![2]);
}

#[tokio::test]
async fn test_offer_moves_once_its_owner_pauses_it() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        stored_offer(2, "donegal", 1000),
        stored_offer(3, "sligo", 700),
    ]));
    let feed = ScriptedFeed::new();
    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    feed.set(
        "sligo",
        vec![listing(3, "sligo", 700), listing(2, "sligo", 1000)],
    );

    let partitions = vec![donegal(), Partition::new("sligo", "36", "")];
    let channel = RecordingChannel::new();
    let sweep = orchestrator(partitions, store.clone(), feed.clone(), channel.clone());
    sweep.run(SweepTrigger::Cli).await;

    assert_eq!(store.get_offer(2).unwrap().unwrap().partition, "donegal");
    assert_eq!(channel.count(), 0);

    feed.set("donegal", vec![listing(1, "donegal", 900)]);
    sweep.run(SweepTrigger::Cli).await;

    let moved = store.get_offer(2).unwrap().unwrap();
    assert_eq!(moved.partition, "sligo");
    assert!(moved.is_published());
    let sligo = store
        .list_offers(&OfferFilter::default().partition("sligo"))
        .unwrap();
    assert_eq!(sligo.len(), 2);
    assert_eq!(channel.count(), 1);
}

#[tokio::test]
async fn test_truncated_snapshot_leaves_offers_published() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(3, "donegal", 900),
        stored_offer(4, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    feed.truncate("donegal", 1);

    let channel = RecordingChannel::new();
    let sweep = orchestrator(vec![donegal()], store.clone(), feed, channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let outcome = &report.partition("donegal").unwrap().outcome;
    assert!(matches!(outcome, PartitionOutcome::FetchFailed { .. }));
    assert!(outcome.error().unwrap().contains("truncated"));
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![3, 4]);
    assert_eq!(channel.count(), 0);
}

#[tokio::test]
async fn test_withheld_price_keeps_offer_published() {
    let store: Arc<MockOfferRepository> = Arc::new(MockOfferRepository::with_offers([
        stored_offer(1, "donegal", 900),
        stored_offer(2, "donegal", 1000),
    ]));
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    feed.set(
        "donegal",
        vec![
            listing(1, "donegal", 900),
            Listing::withheld(2, "donegal"),
            Listing::withheld(3, "donegal"),
        ],
    );

    let sweep = orchestrator(vec![donegal()], store.clone(), feed.clone(), channel.clone());
    let report = sweep.run(SweepTrigger::Cli).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert!(changes.new.is_empty());
    assert!(changes.changed.is_empty());
    assert!(changes.withdrawn.is_empty());
    assert_eq!(store.get_offer(2).unwrap().unwrap().price, 1000);
    assert!(store.get_offer(3).unwrap().is_none());

    // Price shown again: unchanged, so nothing to announce
    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    sweep.run(SweepTrigger::Cli).await;
    assert_eq!(channel.count(), 0);
    assert_eq!(published_ids(store.as_ref(), "donegal"), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_partitions_are_paced_but_not_after_the_last() {
    let feed = ScriptedFeed::new();
    for key in ["a", "b", "c"] {
        feed.set(key, vec![listing(1, key, 900)]);
    }
    let partitions = vec![
        Partition::new("a", "1", ""),
        Partition::new("b", "2", ""),
        Partition::new("c", "3", ""),
    ];
    let sweep = orchestrator(
        partitions,
        create_mock_repository(),
        feed.clone(),
        RecordingChannel::new(),
    )
    .with_pace(Duration::from_secs(60));

    let start = tokio::time::Instant::now();
    sweep.run(SweepTrigger::Cli).await;

    let times = feed.fetch_times();
    assert_eq!(times.len(), 3);
    assert!(times[1] - times[0] >= Duration::from_secs(60));
    assert!(times[2] - times[1] >= Duration::from_secs(60));
    assert!(start.elapsed() < Duration::from_secs(121));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_between_partitions() {
    let feed = ScriptedFeed::new();
    feed.set("a", vec![listing(1, "a", 900)]);
    feed.set("b", vec![listing(2, "b", 900)]);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let sweep = orchestrator(
        vec![Partition::new("a", "1", ""), Partition::new("b", "2", "")],
        create_mock_repository(),
        feed.clone(),
        RecordingChannel::new(),
    )
    .with_pace(Duration::from_secs(60))
    .with_shutdown(rx);
    let sweep = Arc::new(sweep);

    let handle = {
        let sweep = Arc::clone(&sweep);
        tokio::spawn(async move { sweep.run(SweepTrigger::Scheduled).await })
    };

    tokio::time::sleep(Duration::from_secs(30)).await;
    tx.send(true).unwrap();

    let report = handle.await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.partitions.len(), 1);
    assert_eq!(feed.fetched(), vec!["a"]);
}

#[tokio::test]
async fn test_journal_gets_one_line_per_partition() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs").join("sweeps.log");

    let feed = ScriptedFeed::new();
    feed.set("donegal", vec![listing(1, "donegal", 900)]);
    feed.fail("sligo", 502);

    let sweep = orchestrator(
        vec![donegal(), Partition::new("sligo", "36", "")],
        create_mock_repository(),
        feed,
        RecordingChannel::new(),
    )
    .with_journal(SweepJournal::new(&path));
    let report = sweep.run(SweepTrigger::OnDemand).await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("partition=donegal outcome=completed"));
    assert!(lines[0].contains("new=1[1]"));
    assert!(lines[0].contains("notify=cold_start"));
    assert!(lines[1].contains("partition=sligo outcome=fetch_failed"));
    assert!(lines.iter().all(|l| l.contains(&report.id.to_string())));
}

#[tokio::test]
async fn test_sweep_against_sqlite_store() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteOfferRepository::new(dir.path().join("offers.db")).unwrap());
    let feed = ScriptedFeed::new();
    let channel = RecordingChannel::new();
    let sweep = orchestrator(vec![donegal()], store.clone(), feed.clone(), channel.clone());

    feed.set(
        "donegal",
        vec![listing(1, "donegal", 900), listing(2, "donegal", 1000)],
    );
    sweep.run(SweepTrigger::Cli).await;

    feed.set(
        "donegal",
        vec![listing(2, "donegal", 950), listing(3, "donegal", 1200)],
    );
    let report = sweep.run(SweepTrigger::Cli).await;

    let changes = report.partition("donegal").unwrap().outcome.changes().unwrap();
    assert_eq!(changes.new, vec![3]);
    assert_eq!(changes.changed, vec![2]);
    assert_eq!(changes.withdrawn, vec![1]);
    assert_eq!(channel.count(), 2);

    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.published, 2);
    assert_eq!(stats.paused, 1);
}
