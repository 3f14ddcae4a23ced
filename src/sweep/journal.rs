//! Append-only sweep journal
//!
//! One human-readable line per processed partition. Not meant to be parsed
//! back; it exists for audit and debugging.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::report::{PartitionReport, SweepReport};
use crate::models::OfferId;

/// Journal writer; a missing path disables it
#[derive(Debug, Clone, Default)]
pub struct SweepJournal {
    path: Option<PathBuf>,
}

impl SweepJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append the line for one partition
    ///
    /// Journal failures never fail the sweep; they are logged.
    pub async fn record(&self, sweep: &SweepReport, entry: &PartitionReport) {
        let Some(path) = &self.path else {
            return;
        };

        let line = format_line(sweep, entry);
        if let Err(e) = append_line(path, &line).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write sweep journal");
        }
    }
}

async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await?;
    Ok(())
}

fn ids(list: &[OfferId]) -> String {
    let joined: Vec<String> = list.iter().map(ToString::to_string).collect();
    format!("[{}]", joined.join(","))
}

/// `entered exited sweep=.. partition=.. outcome=.. new=N[ids] ...`
pub fn format_line(sweep: &SweepReport, entry: &PartitionReport) -> String {
    let mut line = format!(
        "{} {} sweep={} trigger={} partition={} outcome={}",
        entry.started_at.to_rfc3339(),
        entry.finished_at.to_rfc3339(),
        sweep.id,
        sweep.trigger,
        entry.partition,
        entry.outcome.tag(),
    );

    if let Some(changes) = entry.outcome.changes() {
        line.push_str(&format!(
            " new={}{} changed={}{} withdrawn={}{}",
            changes.new.len(),
            ids(&changes.new),
            changes.changed.len(),
            ids(&changes.changed),
            changes.withdrawn.len(),
            ids(&changes.withdrawn),
        ));
    }

    if let super::report::PartitionOutcome::Completed { notified, .. } = &entry.outcome {
        line.push_str(if *notified {
            " notify=on"
        } else {
            " notify=cold_start"
        });
    }

    if let Some(dispatch) = entry.outcome.dispatch() {
        line.push_str(&format!(" sent={} failed={}", dispatch.sent, dispatch.failed));
    }

    if let Some(error) = entry.outcome.error() {
        line.push_str(&format!(" error=\"{}\"", error.replace('"', "'")));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::report::{ChangeIds, PartitionOutcome, SweepTrigger};
    use crate::storage::PersistSummary;
    use chrono::Utc;

    fn entry(outcome: PartitionOutcome) -> PartitionReport {
        PartitionReport {
            partition: "donegal".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome,
        }
    }

    #[test]
    fn test_format_completed_line() {
        let sweep = SweepReport::new(SweepTrigger::Scheduled);
        let line = format_line(
            &sweep,
            &entry(PartitionOutcome::Completed {
                snapshot: 3,
                changes: ChangeIds {
                    new: vec![201],
                    changed: vec![101, 104],
                    withdrawn: vec![],
                },
                notified: false,
                dispatch: None,
                persist: PersistSummary::default(),
            }),
        );

        assert!(line.contains("partition=donegal"));
        assert!(line.contains("outcome=completed"));
        assert!(line.contains("new=1[201]"));
        assert!(line.contains("changed=2[101,104]"));
        assert!(line.contains("withdrawn=0[]"));
        assert!(line.contains("notify=cold_start"));
        assert!(line.contains("trigger=scheduled"));
    }

    #[test]
    fn test_format_failed_line() {
        let sweep = SweepReport::new(SweepTrigger::Cli);
        let line = format_line(
            &sweep,
            &entry(PartitionOutcome::FetchFailed {
                error: "Server error: 503".to_string(),
            }),
        );
        assert!(line.contains("outcome=fetch_failed"));
        assert!(line.contains("error=\"Server error: 503\""));
        assert!(!line.contains("new="));
    }

    #[tokio::test]
    async fn test_record_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sweeps.log");
        let journal = SweepJournal::new(&path);
        let sweep = SweepReport::new(SweepTrigger::OnDemand);

        for _ in 0..2 {
            journal
                .record(
                    &sweep,
                    &entry(PartitionOutcome::StoreFailed {
                        error: "locked".to_string(),
                    }),
                )
                .await;
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().all(|l| l.contains("outcome=store_failed")));
    }

    #[tokio::test]
    async fn test_disabled_journal_is_noop() {
        let journal = SweepJournal::disabled();
        assert!(journal.path().is_none());
        let sweep = SweepReport::new(SweepTrigger::Cli);
        journal
            .record(
                &sweep,
                &entry(PartitionOutcome::FetchFailed {
                    error: "x".to_string(),
                }),
            )
            .await;
    }
}
