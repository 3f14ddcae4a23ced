//! Daily wall-clock trigger
//!
//! Fires a sweep at fixed local times every day (five times by default).
//! A firing that lands while a sweep is running waits for it to finish.

use chrono::{DateTime, Duration, Local, NaiveDateTime, NaiveTime, TimeZone};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use super::error::{SchedulerError, SchedulerResult};
use super::runner::SweepRunner;
use crate::sweep::SweepTrigger;

// ============================================================================
// Schedule
// ============================================================================

/// A time of day, `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DailyTime(NaiveTime);

impl DailyTime {
    pub fn parse(value: &str) -> SchedulerResult<Self> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M")
            .map(Self)
            .map_err(|_| SchedulerError::invalid_time(value))
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Sorted, de-duplicated daily firing times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySchedule {
    times: Vec<DailyTime>,
}

impl DailySchedule {
    pub fn new(times: Vec<DailyTime>) -> SchedulerResult<Self> {
        let mut times = times;
        times.sort();
        times.dedup();
        if times.is_empty() {
            return Err(SchedulerError::EmptySchedule);
        }
        Ok(Self { times })
    }

    /// Parse `HH:MM` strings
    pub fn parse<S: AsRef<str>>(times: &[S]) -> SchedulerResult<Self> {
        let parsed = times
            .iter()
            .map(|t| DailyTime::parse(t.as_ref()))
            .collect::<SchedulerResult<Vec<_>>>()?;
        Self::new(parsed)
    }

    pub fn times(&self) -> &[DailyTime] {
        &self.times
    }

    /// First firing strictly after `now`
    pub fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date();
        self.times
            .iter()
            .map(|t| today.and_time(t.time()))
            .find(|candidate| *candidate > now)
            .unwrap_or_else(|| (today + Duration::days(1)).and_time(self.times[0].time()))
    }

    /// Next firing in local time
    ///
    /// A time that falls into a DST gap fires one hour later.
    pub fn next_local(&self, now: DateTime<Local>) -> DateTime<Local> {
        let next = self.next_after(now.naive_local());
        Local
            .from_local_datetime(&next)
            .earliest()
            .or_else(|| {
                Local
                    .from_local_datetime(&(next + Duration::hours(1)))
                    .earliest()
            })
            .unwrap_or(now + Duration::hours(1))
    }
}

// ============================================================================
// Schedule Trigger
// ============================================================================

/// Runs sweeps on a [`DailySchedule`] until shutdown
pub struct ScheduleTrigger {
    schedule: DailySchedule,
    runner: Arc<SweepRunner>,
    run_on_start: bool,
}

impl ScheduleTrigger {
    pub fn new(schedule: DailySchedule, runner: Arc<SweepRunner>) -> Self {
        Self {
            schedule,
            runner,
            run_on_start: false,
        }
    }

    /// Also sweep once right away
    pub fn run_on_start(mut self, value: bool) -> Self {
        self.run_on_start = value;
        self
    }

    pub fn schedule(&self) -> &DailySchedule {
        &self.schedule
    }

    /// Trigger loop; returns once `shutdown` turns `true`
    pub async fn start(&self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        let times: Vec<String> = self.schedule.times().iter().map(ToString::to_string).collect();
        tracing::info!(times = %times.join(","), "Schedule trigger started");

        if self.run_on_start && !*shutdown.borrow() {
            self.fire().await;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Local::now();
            let next = self.schedule.next_local(now);
            let wait = (next - now)
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            tracing::info!(next = %next.format("%Y-%m-%d %H:%M"), "Next sweep scheduled");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.fire().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Schedule trigger stopped");
        Ok(())
    }

    async fn fire(&self) {
        if self.runner.is_running() {
            tracing::info!("Sweep in progress, scheduled sweep queued behind it");
        }
        if let Err(e) = self.runner.run_queued(SweepTrigger::Scheduled).await {
            tracing::error!(error = %e, "Scheduled sweep skipped");
        }
    }
}
