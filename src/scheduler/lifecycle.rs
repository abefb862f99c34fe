//! Schedule entry lifecycle
//!
//! All status transitions for a schedule entry are declared here and
//! validated centrally. Storage backends and the dispatch loop go through
//! this table instead of comparing status strings ad hoc.
//!
//! ```text
//!              ┌──────────┐  due & claimed   ┌─────────────┐
//!   create ──▶ │ Pending  │ ───────────────▶ │ Dispatching │
//!              └────┬─────┘                  └──┬───┬───┬──┘
//!                   │ cancel          success   │   │   │ retryable failure,
//!                   ▼                           ▼   │   │ attempts < max
//!              ┌──────────┐              ┌─────────┐│   └──────▶ Pending
//!              │ Canceled │              │Published││
//!              └──────────┘              └─────────┘└─▶ Failed (terminal failure
//!                                                        or attempts == max)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SchedulerError;

/// Lifecycle status of a schedule entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for its target instant
    Pending,
    /// Claimed by a dispatch tick, transport call in flight
    Dispatching,
    /// Publication succeeded, receipt recorded
    Published,
    /// Publication gave up (terminal error or retry bound reached)
    Failed,
    /// Withdrawn before publication
    Canceled,
}

impl EntryStatus {
    /// String representation used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Active entries occupy a slot and block re-scheduling of their draft
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Dispatching)
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed | Self::Canceled)
    }

    /// All statuses, in lifecycle order
    pub fn all() -> [EntryStatus; 5] {
        [
            Self::Pending,
            Self::Dispatching,
            Self::Published,
            Self::Failed,
            Self::Canceled,
        ]
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dispatching" => Ok(Self::Dispatching),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            other => Err(SchedulerError::unknown_status(other)),
        }
    }
}

/// Whether `from -> to` is a legal lifecycle transition
pub fn can_transition(from: EntryStatus, to: EntryStatus) -> bool {
    use EntryStatus::*;

    matches!(
        (from, to),
        (Pending, Dispatching)
            | (Pending, Canceled)
            | (Dispatching, Published)
            | (Dispatching, Failed)
            | (Dispatching, Pending)
            | (Dispatching, Canceled)
    )
}

/// Validate a transition, returning the scheduler error callers surface
pub fn check_transition(from: EntryStatus, to: EntryStatus) -> Result<(), SchedulerError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(SchedulerError::invalid_transition(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in EntryStatus::all() {
            let parsed: EntryStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert!("in-flight".parse::<EntryStatus>().is_err());
    }

    #[test]
    fn test_pending_transitions() {
        use EntryStatus::*;
        assert!(can_transition(Pending, Dispatching));
        assert!(can_transition(Pending, Canceled));
        assert!(!can_transition(Pending, Published));
        assert!(!can_transition(Pending, Failed));
    }

    #[test]
    fn test_dispatching_transitions() {
        use EntryStatus::*;
        assert!(can_transition(Dispatching, Published));
        assert!(can_transition(Dispatching, Failed));
        assert!(can_transition(Dispatching, Pending)); // retry release, stale-claim reap
        assert!(can_transition(Dispatching, Canceled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        use EntryStatus::*;
        for terminal in [Published, Failed, Canceled] {
            for target in EntryStatus::all() {
                assert!(
                    !can_transition(terminal, target),
                    "{terminal} -> {target} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for status in EntryStatus::all() {
            assert!(!can_transition(status, status));
        }
    }

    #[test]
    fn test_check_transition_error() {
        let err = check_transition(EntryStatus::Published, EntryStatus::Pending).unwrap_err();
        assert!(err.to_string().contains("published"));
    }

    #[test]
    fn test_activity_classification() {
        assert!(EntryStatus::Pending.is_active());
        assert!(EntryStatus::Dispatching.is_active());
        for status in [
            EntryStatus::Published,
            EntryStatus::Failed,
            EntryStatus::Canceled,
        ] {
            assert!(!status.is_active());
            assert!(status.is_terminal());
        }
    }
}
