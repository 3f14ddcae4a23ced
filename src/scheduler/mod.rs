//! Sweep scheduling
//!
//! - [`trigger`]: fires sweeps at fixed local times each day
//! - [`runner`]: serialises sweeps, queueing scheduled ones and refusing
//!   on-demand requests while busy

pub mod error;
pub mod runner;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use runner::SweepRunner;
pub use trigger::{DailySchedule, DailyTime, ScheduleTrigger};
