//! Post scheduling engine
//!
//! This module owns the lifecycle of a schedule entry: assigning drafts
//! to future publish instants (singly or in bulk), enforcing spacing
//! between posts, and withdrawing or moving entries before dispatch.
//!
//! # Architecture
//!
//! ```text
//!  draft pool                    committed entries
//!      │                               │
//!      ▼                               ▼
//! ┌───────────┐   candidates   ┌───────────────┐
//! │   Slot    │ ─────────────▶ │    Spacing    │
//! │Recommender│                │    Resolver   │
//! └───────────┘                └───────┬───────┘
//!                                      │ placements
//!                                      ▼
//!                              ┌───────────────┐      ┌──────────────┐
//!                              │   Scheduler   │ ───▶ │  Persistence │
//!                              │ (this module) │      │    store     │
//!                              └───────────────┘      └──────────────┘
//! ```
//!
//! Scoring (recommender) and gap enforcement (resolver) are separate so
//! each can be tested on its own. The scheduler validates the data-model
//! invariants: future instants only, minimum spacing between active
//! entries, and at most one active entry per draft.
//!
//! # Modules
//!
//! - [`lifecycle`] - Entry status state machine, transitions validated centrally
//! - [`recommend`] - Heuristic time-slot recommendation
//! - [`spacing`] - Conflict filtering and spacing-preserving shifts
//! - [`error`] - Scheduler error types

pub mod error;
pub mod lifecycle;
pub mod recommend;
pub mod spacing;

pub use error::{SchedulerError, SchedulerResult};
pub use lifecycle::EntryStatus;
pub use recommend::{
    HeuristicConfig, PeakBand, RankedSlot, Recommendations, SlotRecommender, TimeWindow,
};
pub use spacing::{Resolution, SpacingResolver, Unplaced, UnplacedReason};

use std::sync::Arc;

use chrono::Duration;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ScheduleEntry;
use crate::storage::{DraftRepository, ScheduleRepository};
use crate::utils::SharedClock;

/// Publishing cadence for bulk scheduling, interpreted as the minimum
/// spacing between the resulting entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Every(Duration),
}

impl Frequency {
    /// Minimum spacing implied by this cadence
    pub fn min_spacing(&self) -> Duration {
        match self {
            Self::Daily => Duration::days(1),
            Self::Weekly => Duration::weeks(1),
            Self::Every(d) => *d,
        }
    }
}

/// Options for single-entry scheduling
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleOptions {
    /// Skip the minimum-spacing check
    pub override_spacing: bool,
    /// Cancel an existing active entry for the draft instead of
    /// rejecting with `DraftAlreadyActive`
    pub replace_active: bool,
}

/// Per-draft outcome of a bulk scheduling call
#[derive(Debug, Clone)]
pub enum PlacementOutcome {
    Placed(ScheduleEntry),
    Unplaceable { reason: String },
}

impl PlacementOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Placed(_))
    }
}

/// Result of a bulk scheduling call: partial success is the normal
/// outcome and is reported per draft, never silently dropped
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub outcomes: Vec<(Uuid, PlacementOutcome)>,
}

impl BulkReport {
    pub fn placed_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_placed()).count()
    }

    pub fn unplaceable_count(&self) -> usize {
        self.outcomes.len() - self.placed_count()
    }

    /// Outcome for a specific draft
    pub fn outcome_for(&self, draft_id: Uuid) -> Option<&PlacementOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == draft_id)
            .map(|(_, o)| o)
    }
}

/// Scheduler owning schedule-entry creation and withdrawal
pub struct Scheduler {
    entries: Arc<dyn ScheduleRepository>,
    drafts: Arc<dyn DraftRepository>,
    recommender: SlotRecommender,
    resolver: SpacingResolver,
    clock: SharedClock,
    min_spacing: Duration,
}

impl Scheduler {
    /// Create a scheduler over the given repositories
    pub fn new(
        entries: Arc<dyn ScheduleRepository>,
        drafts: Arc<dyn DraftRepository>,
        clock: SharedClock,
        min_spacing: Duration,
    ) -> Self {
        Self {
            entries,
            drafts,
            recommender: SlotRecommender::new(),
            resolver: SpacingResolver::new(),
            clock,
            min_spacing,
        }
    }

    /// The configured minimum spacing between entries
    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Target instants of all currently active entries, ascending
    pub async fn active_instants(&self) -> SchedulerResult<Vec<DateTime<Utc>>> {
        Ok(self.entries.active_instants().await?)
    }

    /// Schedule a single draft at an explicit instant
    ///
    /// Validates that the instant is strictly in the future, that the
    /// draft has no other active entry (unless `replace_active`), and
    /// that the instant keeps the minimum spacing to every active entry
    /// (unless `override_spacing`).
    pub async fn schedule_one(
        &self,
        draft_id: Uuid,
        target_at: DateTime<Utc>,
        options: ScheduleOptions,
    ) -> SchedulerResult<ScheduleEntry> {
        let now = self.clock.now();

        self.drafts
            .get_draft(draft_id)
            .await?
            .ok_or(SchedulerError::DraftNotFound { draft_id })?;

        if target_at <= now {
            return Err(SchedulerError::InvalidInstant {
                target: target_at,
                now,
            });
        }

        if let Some(active) = self.entries.find_active_by_draft(draft_id).await? {
            if !options.replace_active {
                return Err(SchedulerError::DraftAlreadyActive {
                    draft_id,
                    entry_id: active.id,
                });
            }
            self.cancel(active.id).await?;
        }

        if !options.override_spacing {
            self.check_spacing(target_at, None).await?;
        }

        let entry = ScheduleEntry::new(draft_id, target_at, now);
        self.entries.insert_entry(&entry).await?;

        info!(
            entry_id = %entry.id,
            draft_id = %draft_id,
            target_at = %target_at,
            "Scheduled draft"
        );

        Ok(entry)
    }

    /// Schedule many drafts into a window at the requested cadence
    ///
    /// Generates one ranked candidate per draft, resolves conflicts
    /// against all currently active entries plus the placements made in
    /// this same call, and assigns slots in score order. Drafts that
    /// cannot be placed are reported individually.
    pub async fn schedule_bulk(
        &self,
        draft_ids: &[Uuid],
        window: TimeWindow,
        frequency: Frequency,
        rules: &HeuristicConfig,
    ) -> SchedulerResult<BulkReport> {
        let now = self.clock.now();

        if window.end <= now {
            return Err(SchedulerError::InvalidWindow {
                start: window.start,
                end: window.end,
            });
        }
        if draft_ids.is_empty() {
            return Ok(BulkReport::default());
        }

        let min_spacing = frequency.min_spacing();
        let recommendations = self
            .recommender
            .recommend(window, draft_ids.len(), rules)?;
        let existing = self.entries.active_instants().await?;

        let candidates: Vec<DateTime<Utc>> = recommendations
            .instants()
            .filter(|t| *t > now)
            .collect();
        let resolution =
            self.resolver
                .resolve(&candidates, &existing, min_spacing, window.end);

        debug!(
            requested = draft_ids.len(),
            placed = resolution.placed.len(),
            rejected = resolution.rejected.len(),
            "Resolved bulk placements"
        );

        let mut slots = resolution.placed.into_iter();
        let mut report = BulkReport::default();

        for &draft_id in draft_ids {
            let outcome = match self.bulk_place_one(draft_id, &mut slots, now).await? {
                Ok(entry) => PlacementOutcome::Placed(entry),
                Err(reason) => {
                    warn!(draft_id = %draft_id, reason = %reason, "Draft not placed");
                    PlacementOutcome::Unplaceable { reason }
                }
            };
            report.outcomes.push((draft_id, outcome));
        }

        info!(
            placed = report.placed_count(),
            unplaceable = report.unplaceable_count(),
            "Bulk scheduling finished"
        );

        Ok(report)
    }

    /// Place one draft of a bulk call; `Err(reason)` is a per-draft
    /// outcome, not a call failure
    async fn bulk_place_one(
        &self,
        draft_id: Uuid,
        slots: &mut impl Iterator<Item = DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Result<ScheduleEntry, String>> {
        if self.drafts.get_draft(draft_id).await?.is_none() {
            return Ok(Err(format!("draft {draft_id} not found")));
        }

        if let Some(active) = self.entries.find_active_by_draft(draft_id).await? {
            return Ok(Err(format!(
                "draft already has an active schedule entry {}",
                active.id
            )));
        }

        let Some(target_at) = slots.next() else {
            return Ok(Err(
                UnplacedReason::WindowExhausted.describe().to_string()
            ));
        };

        let entry = ScheduleEntry::new(draft_id, target_at, now);
        self.entries.insert_entry(&entry).await?;
        Ok(Ok(entry))
    }

    /// Cancel a schedule entry
    ///
    /// Idempotent on an already-canceled entry. Rejects entries that are
    /// mid-dispatch (`CancelTooLate`: the publish may still occur) and
    /// entries in other terminal states (`AlreadyTerminal`).
    pub async fn cancel(&self, entry_id: Uuid) -> SchedulerResult<ScheduleEntry> {
        let entry = self
            .entries
            .get_entry(entry_id)
            .await?
            .ok_or(SchedulerError::EntryNotFound { entry_id })?;

        match entry.status {
            EntryStatus::Canceled => Ok(entry),
            EntryStatus::Published | EntryStatus::Failed => Err(SchedulerError::AlreadyTerminal {
                entry_id,
                status: entry.status,
            }),
            EntryStatus::Dispatching => Err(SchedulerError::CancelTooLate { entry_id }),
            EntryStatus::Pending => {
                let now = self.clock.now();
                match self
                    .entries
                    .transition(entry_id, EntryStatus::Pending, EntryStatus::Canceled, now)
                    .await?
                {
                    Some(canceled) => {
                        info!(entry_id = %entry_id, "Canceled schedule entry");
                        Ok(canceled)
                    }
                    // lost the race against a dispatch claim
                    None => Err(SchedulerError::CancelTooLate { entry_id }),
                }
            }
        }
    }

    /// Move a pending entry to a new instant
    ///
    /// The old entry is canceled and a new one created for the same
    /// draft. The cancel is a conditional transition, so a concurrent
    /// dispatch scan either claims the old entry first (this call then
    /// fails with `CancelTooLate`) or never sees it again; it can never
    /// observe the entry mid-reschedule.
    pub async fn reschedule(
        &self,
        entry_id: Uuid,
        new_target: DateTime<Utc>,
        options: ScheduleOptions,
    ) -> SchedulerResult<ScheduleEntry> {
        let entry = self
            .entries
            .get_entry(entry_id)
            .await?
            .ok_or(SchedulerError::EntryNotFound { entry_id })?;

        match entry.status {
            EntryStatus::Pending => {}
            EntryStatus::Dispatching => {
                return Err(SchedulerError::CancelTooLate { entry_id });
            }
            status => {
                return Err(SchedulerError::AlreadyTerminal { entry_id, status });
            }
        }

        let now = self.clock.now();
        if new_target <= now {
            return Err(SchedulerError::InvalidInstant {
                target: new_target,
                now,
            });
        }

        if !options.override_spacing {
            // the entry being moved must not conflict with itself
            self.check_spacing(new_target, Some(entry.target_at)).await?;
        }

        if self
            .entries
            .transition(entry_id, EntryStatus::Pending, EntryStatus::Canceled, now)
            .await?
            .is_none()
        {
            return Err(SchedulerError::CancelTooLate { entry_id });
        }

        let replacement = ScheduleEntry::new(entry.draft_id, new_target, now);
        self.entries.insert_entry(&replacement).await?;

        info!(
            old_entry = %entry_id,
            new_entry = %replacement.id,
            target_at = %new_target,
            "Rescheduled entry"
        );

        Ok(replacement)
    }

    async fn check_spacing(
        &self,
        target_at: DateTime<Utc>,
        ignore: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let active = self.entries.active_instants().await?;

        for instant in active {
            if Some(instant) == ignore {
                continue;
            }
            if (target_at - instant).abs() < self.min_spacing {
                return Err(SchedulerError::SpacingConflict {
                    target: target_at,
                    conflicting: instant,
                    min_spacing: self.min_spacing,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_spacing() {
        assert_eq!(Frequency::Daily.min_spacing(), Duration::days(1));
        assert_eq!(Frequency::Weekly.min_spacing(), Duration::weeks(1));
        assert_eq!(
            Frequency::Every(Duration::hours(6)).min_spacing(),
            Duration::hours(6)
        );
    }

    #[test]
    fn test_bulk_report_counts() {
        let mut report = BulkReport::default();
        let id = Uuid::new_v4();
        report.outcomes.push((
            id,
            PlacementOutcome::Unplaceable {
                reason: "full".to_string(),
            },
        ));

        assert_eq!(report.placed_count(), 0);
        assert_eq!(report.unplaceable_count(), 1);
        assert!(report.outcome_for(id).is_some());
        assert!(report.outcome_for(Uuid::new_v4()).is_none());
    }
}
