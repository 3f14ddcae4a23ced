//! Sweep runner: keeps sweeps from overlapping
//!
//! Scheduled sweeps queue on the gate; on-demand sweeps are refused while
//! another sweep holds it. With a lock file configured the same rules hold
//! against sweeps from other processes on the same store.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::error::{SchedulerError, SchedulerResult};
use crate::storage::SweepLock;
use crate::sweep::{SweepOrchestrator, SweepReport, SweepTrigger};

pub struct SweepRunner {
    orchestrator: Arc<SweepOrchestrator>,
    gate: Arc<Mutex<()>>,
    lock_path: Option<PathBuf>,
    last_report: RwLock<Option<SweepReport>>,
}

impl SweepRunner {
    pub fn new(orchestrator: Arc<SweepOrchestrator>) -> Self {
        Self {
            orchestrator,
            gate: Arc::new(Mutex::new(())),
            lock_path: None,
            last_report: RwLock::new(None),
        }
    }

    /// Also take the cross-process lock at `path` for every sweep
    pub fn with_lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn orchestrator(&self) -> &Arc<SweepOrchestrator> {
        &self.orchestrator
    }

    /// Whether a sweep currently holds the gate
    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Wait for any running sweep, then run one
    pub async fn run_queued(&self, trigger: SweepTrigger) -> SchedulerResult<SweepReport> {
        let _guard = self.gate.lock().await;
        let _lock = match &self.lock_path {
            Some(path) => Some(
                SweepLock::acquire(path)
                    .await
                    .map_err(|e| SchedulerError::lock_failed(format!("{e:#}")))?,
            ),
            None => None,
        };
        Ok(self.execute(trigger).await)
    }

    /// Wait until no sweep holds the gate
    pub async fn wait_idle(&self) {
        let _guard = self.gate.lock().await;
    }

    /// Start a sweep in the background unless one is already running
    pub fn try_start(self: &Arc<Self>, trigger: SweepTrigger) -> SchedulerResult<()> {
        let guard = Arc::clone(&self.gate)
            .try_lock_owned()
            .map_err(|_| SchedulerError::SweepInProgress)?;
        let lock = match &self.lock_path {
            Some(path) => Some(
                SweepLock::try_acquire(path)
                    .map_err(|e| SchedulerError::lock_failed(format!("{e:#}")))?
                    .ok_or(SchedulerError::SweepInProgress)?,
            ),
            None => None,
        };

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            let _lock = lock;
            runner.execute(trigger).await;
        });
        Ok(())
    }

    /// Report of the most recent finished sweep
    pub async fn last_report(&self) -> Option<SweepReport> {
        self.last_report.read().await.clone()
    }

    async fn execute(&self, trigger: SweepTrigger) -> SweepReport {
        let report = self.orchestrator.run(trigger).await;
        *self.last_report.write().await = Some(report.clone());
        report
    }
}
