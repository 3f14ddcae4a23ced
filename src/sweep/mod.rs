//! Sweep pipeline
//!
//! ```text
//! trigger ─▶ SweepOrchestrator ─▶ per active partition, in registry order:
//!              fetch ─▶ reconcile ─▶ guard ─▶ dispatch ─▶ persist ─▶ pace
//! ```
//!
//! - [`reconcile`] diffs a snapshot against stored prices
//! - [`guard`] suppresses notifications for never-populated partitions
//! - [`orchestrator`] owns the per-partition error boundary
//! - [`report`] and [`journal`] record what each sweep did

pub mod guard;
pub mod journal;
pub mod orchestrator;
pub mod reconcile;
pub mod report;

pub use guard::should_notify;
pub use journal::SweepJournal;
pub use orchestrator::SweepOrchestrator;
pub use reconcile::{reconcile, PriceChange, ReconcileSummary, Reconciliation};
pub use report::{ChangeIds, PartitionOutcome, PartitionReport, SweepReport, SweepTrigger};
