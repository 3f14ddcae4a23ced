//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Invalid `HH:MM` time value
    InvalidTime {
        value: String,
    },

    /// No times configured for the daily trigger
    EmptySchedule,

    /// A sweep is already running
    SweepInProgress,

    /// The cross-process sweep lock could not be taken
    LockFailed {
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime { value } => {
                write!(f, "Invalid time '{}'. Expected HH:MM (00:00-23:59)", value)
            }
            Self::EmptySchedule => {
                write!(f, "Daily schedule has no times")
            }
            Self::SweepInProgress => {
                write!(f, "A sweep is already in progress")
            }
            Self::LockFailed { reason } => {
                write!(f, "Sweep lock failed: {}", reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid time error
    pub fn invalid_time(value: impl Into<String>) -> Self {
        Self::InvalidTime {
            value: value.into(),
        }
    }

    /// Create a lock error
    pub fn lock_failed(reason: impl Into<String>) -> Self {
        Self::LockFailed {
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SweepInProgress | Self::LockFailed { .. }
        )
    }
}
