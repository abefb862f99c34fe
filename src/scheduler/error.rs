//! Error types for the scheduler module

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use uuid::Uuid;

use super::lifecycle::EntryStatus;
use crate::storage::StorageError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug)]
pub enum SchedulerError {
    /// Referenced draft does not exist
    DraftNotFound { draft_id: Uuid },

    /// Referenced schedule entry does not exist
    EntryNotFound { entry_id: Uuid },

    /// Target instant is not strictly in the future
    InvalidInstant {
        target: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// Scheduling window is empty or inverted
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Requested slot count must be at least one
    InvalidSlotCount { count: usize },

    /// Target instant is too close to an already committed entry
    SpacingConflict {
        target: DateTime<Utc>,
        conflicting: DateTime<Utc>,
        min_spacing: Duration,
    },

    /// Draft already has a pending or dispatching entry
    DraftAlreadyActive { draft_id: Uuid, entry_id: Uuid },

    /// Entry reached a terminal state and cannot be modified
    AlreadyTerminal {
        entry_id: Uuid,
        status: EntryStatus,
    },

    /// Entry is being dispatched; the publish may still occur
    CancelTooLate { entry_id: Uuid },

    /// Illegal lifecycle transition
    InvalidTransition {
        from: EntryStatus,
        to: EntryStatus,
    },

    /// Unknown status string read from storage
    UnknownStatus { value: String },

    /// Underlying persistence failure
    Storage(StorageError),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DraftNotFound { draft_id } => {
                write!(f, "Draft not found: {draft_id}")
            }
            Self::EntryNotFound { entry_id } => {
                write!(f, "Schedule entry not found: {entry_id}")
            }
            Self::InvalidInstant { target, now } => {
                write!(
                    f,
                    "Target instant {target} is not in the future (now: {now})"
                )
            }
            Self::InvalidWindow { start, end } => {
                write!(f, "Invalid window: end {end} must be after start {start}")
            }
            Self::InvalidSlotCount { count } => {
                write!(f, "Invalid slot count {count}: must be at least 1")
            }
            Self::SpacingConflict {
                target,
                conflicting,
                min_spacing,
            } => {
                write!(
                    f,
                    "Target {target} is within {}h of committed entry at {conflicting}",
                    min_spacing.num_hours()
                )
            }
            Self::DraftAlreadyActive { draft_id, entry_id } => {
                write!(
                    f,
                    "Draft {draft_id} already has an active schedule entry {entry_id}"
                )
            }
            Self::AlreadyTerminal { entry_id, status } => {
                write!(f, "Entry {entry_id} is already terminal ({status})")
            }
            Self::CancelTooLate { entry_id } => {
                write!(
                    f,
                    "Entry {entry_id} is being dispatched; the publish may still occur"
                )
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "Illegal status transition: {from} -> {to}")
            }
            Self::UnknownStatus { value } => {
                write!(f, "Unknown entry status: '{value}'")
            }
            Self::Storage(e) => {
                write!(f, "Storage error: {e}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for SchedulerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl SchedulerError {
    /// Create an invalid transition error
    pub fn invalid_transition(from: EntryStatus, to: EntryStatus) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create an unknown status error
    pub fn unknown_status(value: impl Into<String>) -> Self {
        Self::UnknownStatus {
            value: value.into(),
        }
    }

    /// Check if the error is recoverable (the operation can be retried as-is)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Validation errors are caller mistakes, rejected synchronously
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInstant { .. }
                | Self::InvalidWindow { .. }
                | Self::InvalidSlotCount { .. }
                | Self::SpacingConflict { .. }
                | Self::DraftAlreadyActive { .. }
                | Self::DraftNotFound { .. }
        )
    }
}
