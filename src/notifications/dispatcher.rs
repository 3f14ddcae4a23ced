//! Rate-limited notification dispatcher
//!
//! Sends one partition's notifications in two groups, every new offer first
//! and then every price change. Each group is cut into fixed-size batches
//! with a pause after a full batch when more of the group remains, and a
//! separate pause between the two groups.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::channels::Channel;
use super::render::{MessageRenderer, Notification};
use crate::models::{Listing, OfferId, RoutingKey};
use crate::sweep::reconcile::PriceChange;

/// Batching and pacing rules for one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    pub batch_size: usize,
    #[serde(with = "duration_secs")]
    pub batch_pause: Duration,
    #[serde(with = "duration_secs")]
    pub group_pause: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_pause: Duration::from_secs(30),
            group_pause: Duration::from_secs(30),
        }
    }
}

impl BatchPolicy {
    /// Same batching, no waiting
    pub fn immediate() -> Self {
        Self {
            batch_pause: Duration::ZERO,
            group_pause: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// What one dispatch did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    /// Offers whose message could not be delivered
    pub failed_ids: Vec<OfferId>,
    /// Size of every batch, in send order
    pub batches: Vec<usize>,
    /// Pauses taken inside a group
    pub batch_pauses: usize,
    /// Whether the pause between the new and changed groups was taken
    pub group_pause: bool,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed
    }

    pub fn pauses(&self) -> usize {
        self.batch_pauses + usize::from(self.group_pause)
    }
}

/// Delivers rendered notifications through a channel
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    renderer: MessageRenderer,
    policy: BatchPolicy,
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn Channel>, renderer: MessageRenderer, policy: BatchPolicy) -> Self {
        Self {
            channel,
            renderer,
            policy,
        }
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Send `new` then `changed` to `route`
    ///
    /// Delivery failures are logged and counted; the remaining messages are
    /// still sent.
    pub async fn dispatch(
        &self,
        new: &[Listing],
        changed: &[PriceChange],
        route: &RoutingKey,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        let new_group: Vec<Notification<'_>> = new.iter().map(Notification::New).collect();
        let changed_group: Vec<Notification<'_>> =
            changed.iter().map(Notification::PriceChanged).collect();

        self.send_group(&new_group, route, &mut report).await;

        if !new_group.is_empty() && !changed_group.is_empty() {
            tracing::debug!(
                pause_secs = self.policy.group_pause.as_secs(),
                "Pausing between new and changed offers"
            );
            pause(self.policy.group_pause).await;
            report.group_pause = true;
        }

        self.send_group(&changed_group, route, &mut report).await;

        crate::metrics::record_notifications(report.sent, report.failed);
        report
    }

    async fn send_group(
        &self,
        group: &[Notification<'_>],
        route: &RoutingKey,
        report: &mut DispatchReport,
    ) {
        let batch_size = self.policy.batch_size.max(1);
        let mut remaining = group.len();

        for batch in group.chunks(batch_size) {
            for notification in batch {
                let message = self.renderer.render(notification);
                let id = notification.listing().id;

                match self.channel.send(&message, route).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        tracing::warn!(
                            offer_id = id,
                            channel = self.channel.name(),
                            route = %route,
                            error = %e,
                            "Failed to deliver notification"
                        );
                        report.failed += 1;
                        report.failed_ids.push(id);
                    }
                }
            }

            report.batches.push(batch.len());
            remaining -= batch.len();

            if batch.len() == batch_size && remaining > 0 {
                tracing::debug!(
                    remaining,
                    pause_secs = self.policy.batch_pause.as_secs(),
                    "Batch sent, pausing"
                );
                pause(self.policy.batch_pause).await;
                report.batch_pauses += 1;
            }
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
