//! Conflict and spacing resolution
//!
//! Takes ranked candidate instants and fits them around already
//! committed schedule entries so no two posts collide or cluster.
//! Scoring stays in the recommender; this module only knows about gaps.

use chrono::{DateTime, Duration, Utc};

/// Why a candidate could not be placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnplacedReason {
    /// Within `min_spacing` of an already committed entry
    ExistingConflict,
    /// No gap left before the end of the window
    WindowExhausted,
}

impl UnplacedReason {
    /// Human-readable description for per-draft reporting
    pub fn describe(&self) -> &'static str {
        match self {
            Self::ExistingConflict => "conflicts with an existing scheduled post",
            Self::WindowExhausted => "no non-conflicting slot left within the window",
        }
    }
}

/// A candidate that was dropped, and why
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unplaced {
    pub candidate: DateTime<Utc>,
    pub reason: UnplacedReason,
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Accepted instants, in candidate order
    pub placed: Vec<DateTime<Utc>>,
    /// Candidates that could not be placed
    pub rejected: Vec<Unplaced>,
}

/// Spacing resolver enforcing a minimum gap between publish instants
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacingResolver;

impl SpacingResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve candidates against committed instants
    ///
    /// Candidates within `min_spacing` of a committed instant are
    /// dropped. A candidate that only conflicts with an earlier-accepted
    /// candidate of the same pass is shifted forward in `min_spacing`
    /// increments until it clears both sets, bounded by `window_end`.
    /// The pass is stable: accepted instants keep candidate order, so
    /// identical inputs always resolve identically.
    pub fn resolve(
        &self,
        candidates: &[DateTime<Utc>],
        existing: &[DateTime<Utc>],
        min_spacing: Duration,
        window_end: DateTime<Utc>,
    ) -> Resolution {
        let mut resolution = Resolution::default();

        for &candidate in candidates {
            if conflicts(candidate, existing, min_spacing) {
                resolution.rejected.push(Unplaced {
                    candidate,
                    reason: UnplacedReason::ExistingConflict,
                });
                continue;
            }

            if !conflicts(candidate, &resolution.placed, min_spacing) {
                resolution.placed.push(candidate);
                continue;
            }

            // conflict within this pass: walk forward in spacing
            // increments until the slot clears both sets
            let mut shifted = candidate + min_spacing;
            while shifted <= window_end
                && (conflicts(shifted, &resolution.placed, min_spacing)
                    || conflicts(shifted, existing, min_spacing))
            {
                shifted += min_spacing;
            }

            if shifted <= window_end {
                resolution.placed.push(shifted);
            } else {
                resolution.rejected.push(Unplaced {
                    candidate,
                    reason: UnplacedReason::WindowExhausted,
                });
            }
        }

        resolution
    }
}

fn conflicts(candidate: DateTime<Utc>, committed: &[DateTime<Utc>], min_spacing: Duration) -> bool {
    committed
        .iter()
        .any(|other| (candidate - *other).abs() < min_spacing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_no_conflicts_passes_through() {
        let resolver = SpacingResolver::new();
        let candidates = vec![at(3, 9), at(4, 9), at(5, 9)];

        let resolution = resolver.resolve(&candidates, &[], Duration::days(1), at(6, 0));

        assert_eq!(resolution.placed, candidates);
        assert!(resolution.rejected.is_empty());
    }

    #[test]
    fn test_existing_conflict_drops_candidate() {
        let resolver = SpacingResolver::new();
        let existing = vec![at(3, 10)];

        let resolution =
            resolver.resolve(&[at(3, 9)], &existing, Duration::hours(4), at(6, 0));

        assert!(resolution.placed.is_empty());
        assert_eq!(resolution.rejected.len(), 1);
        assert_eq!(
            resolution.rejected[0].reason,
            UnplacedReason::ExistingConflict
        );
    }

    #[test]
    fn test_intra_pass_conflict_shifts_forward() {
        let resolver = SpacingResolver::new();
        // second candidate is too close to the first accepted one
        let candidates = vec![at(3, 9), at(3, 12)];

        let resolution = resolver.resolve(&candidates, &[], Duration::days(1), at(6, 0));

        assert_eq!(resolution.placed, vec![at(3, 9), at(4, 12)]);
        assert!(resolution.rejected.is_empty());
    }

    #[test]
    fn test_shift_also_clears_existing_instants() {
        let resolver = SpacingResolver::new();
        let existing = vec![at(4, 12)];
        let candidates = vec![at(3, 9), at(3, 12)];

        // the first shift target (June 4 12:00) is taken, so the
        // candidate keeps walking to June 5
        let resolution =
            resolver.resolve(&candidates, &existing, Duration::days(1), at(6, 0));

        assert_eq!(resolution.placed, vec![at(3, 9), at(5, 12)]);
    }

    #[test]
    fn test_window_exhaustion_reports_unplaceable() {
        let resolver = SpacingResolver::new();
        // three candidates, one-day spacing, window ends June 5: only
        // two gaps exist
        let candidates = vec![at(3, 9), at(3, 10), at(3, 11)];

        let resolution =
            resolver.resolve(&candidates, &[], Duration::days(1), at(4, 23));

        assert_eq!(resolution.placed.len(), 2);
        assert_eq!(resolution.rejected.len(), 1);
        assert_eq!(
            resolution.rejected[0].reason,
            UnplacedReason::WindowExhausted
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = SpacingResolver::new();
        let candidates = vec![at(3, 9), at(3, 11), at(4, 9), at(4, 11)];
        let existing = vec![at(3, 22)];

        let a = resolver.resolve(&candidates, &existing, Duration::hours(12), at(6, 0));
        let b = resolver.resolve(&candidates, &existing, Duration::hours(12), at(6, 0));

        assert_eq!(a.placed, b.placed);
        assert_eq!(a.rejected.len(), b.rejected.len());
    }
}
