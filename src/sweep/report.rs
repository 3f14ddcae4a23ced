//! Per-partition outcomes and the sweep report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::reconcile::{ReconcileSummary, Reconciliation};
use crate::models::OfferId;
use crate::notifications::DispatchReport;
use crate::storage::PersistSummary;

/// What started a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    Scheduled,
    OnDemand,
    Cli,
}

impl SweepTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::OnDemand => "on_demand",
            Self::Cli => "cli",
        }
    }
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ids of one reconciliation, kept for the report and journal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeIds {
    pub new: Vec<OfferId>,
    pub changed: Vec<OfferId>,
    pub withdrawn: Vec<OfferId>,
}

impl From<&Reconciliation> for ChangeIds {
    fn from(reconciliation: &Reconciliation) -> Self {
        Self {
            new: reconciliation.new_ids(),
            changed: reconciliation.changed_ids(),
            withdrawn: reconciliation.withdrawn.clone(),
        }
    }
}

impl ChangeIds {
    pub fn summary(&self) -> ReconcileSummary {
        ReconcileSummary {
            new: self.new.len(),
            changed: self.changed.len(),
            withdrawn: self.withdrawn.len(),
        }
    }
}

/// Tagged result of one partition's processing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PartitionOutcome {
    /// Snapshot reconciled and persisted
    Completed {
        snapshot: usize,
        changes: ChangeIds,
        /// False when the cold-start guard suppressed dispatch
        notified: bool,
        dispatch: Option<DispatchReport>,
        persist: PersistSummary,
    },
    /// No usable snapshot; stored state untouched
    FetchFailed { error: String },
    /// Stored state could not be read; partition skipped
    StoreFailed { error: String },
    /// Write rolled back; reconciliation discarded
    PersistFailed {
        error: String,
        changes: ChangeIds,
        dispatch: Option<DispatchReport>,
    },
}

impl PartitionOutcome {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::StoreFailed { .. } => "store_failed",
            Self::PersistFailed { .. } => "persist_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Completed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Completed { .. } => None,
            Self::FetchFailed { error }
            | Self::StoreFailed { error }
            | Self::PersistFailed { error, .. } => Some(error),
        }
    }

    pub fn changes(&self) -> Option<&ChangeIds> {
        match self {
            Self::Completed { changes, .. } | Self::PersistFailed { changes, .. } => Some(changes),
            _ => None,
        }
    }

    pub fn dispatch(&self) -> Option<&DispatchReport> {
        match self {
            Self::Completed { dispatch, .. } | Self::PersistFailed { dispatch, .. } => {
                dispatch.as_ref()
            }
            _ => None,
        }
    }
}

/// One partition's entry in a sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub partition: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: PartitionOutcome,
}

/// Result of one sweep over the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub id: Uuid,
    pub trigger: SweepTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions: Vec<PartitionReport>,
    /// Active partitions not attempted because of shutdown
    pub interrupted: bool,
}

impl SweepReport {
    pub fn new(trigger: SweepTrigger) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trigger,
            started_at: now,
            finished_at: now,
            partitions: Vec::new(),
            interrupted: false,
        }
    }

    pub fn completed(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| !p.outcome.is_failure())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.partitions
            .iter()
            .filter(|p| p.outcome.is_failure())
            .count()
    }

    /// Every attempted partition failed
    pub fn all_failed(&self) -> bool {
        !self.partitions.is_empty() && self.completed() == 0
    }

    pub fn partition(&self, key: &str) -> Option<&PartitionReport> {
        self.partitions.iter().find(|p| p.partition == key)
    }

    /// Notifications sent across all partitions
    pub fn notifications_sent(&self) -> usize {
        self.partitions
            .iter()
            .filter_map(|p| p.outcome.dispatch())
            .map(|d| d.sent)
            .sum()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
