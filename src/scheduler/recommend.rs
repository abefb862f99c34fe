//! Time-slot recommendation
//!
//! Scores hour-aligned instants inside a calendar window using
//! engagement heuristics (day-of-week weight, peak time bands) and an
//! even-distribution bias for multi-slot requests. The recommender is
//! fully deterministic: identical inputs always produce identical
//! rankings, and it never consults existing schedule entries — conflict
//! avoidance belongs to the spacing resolver.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::error::{SchedulerError, SchedulerResult};

/// Half-open hour band `[start_hour, end_hour)` with a score weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakBand {
    pub start_hour: u32,
    pub end_hour: u32,
    pub weight: f64,
}

impl PeakBand {
    /// Create a band covering `[start_hour, end_hour)`
    pub fn new(start_hour: u32, end_hour: u32, weight: f64) -> Self {
        Self {
            start_hour,
            end_hour,
            weight,
        }
    }

    fn contains(&self, hour: u32) -> bool {
        (self.start_hour..self.end_hour).contains(&hour)
    }
}

/// Engagement heuristics driving slot scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Weight for Monday through Friday
    pub weekday_weight: f64,

    /// Weight for Saturday and Sunday
    pub weekend_weight: f64,

    /// Weight for hours outside every peak band
    pub off_peak_weight: f64,

    /// Peak time-of-day bands (typically morning and early afternoon)
    pub peak_bands: Vec<PeakBand>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            weekday_weight: 1.0,
            weekend_weight: 0.4,
            off_peak_weight: 0.3,
            peak_bands: vec![PeakBand::new(9, 11, 1.0), PeakBand::new(14, 16, 0.9)],
        }
    }
}

impl HeuristicConfig {
    /// Build peak bands from a flat list of preferred posting hours
    /// (hours below 13 form the morning band, the rest the afternoon one)
    pub fn from_posting_hours(hours: &[u32]) -> Self {
        let morning: Vec<u32> = hours.iter().copied().filter(|h| *h < 13).collect();
        let afternoon: Vec<u32> = hours.iter().copied().filter(|h| *h >= 13).collect();

        let mut peak_bands = Vec::new();
        if let (Some(min), Some(max)) = (morning.iter().min(), morning.iter().max()) {
            peak_bands.push(PeakBand::new(*min, *max + 1, 1.0));
        }
        if let (Some(min), Some(max)) = (afternoon.iter().min(), afternoon.iter().max()) {
            peak_bands.push(PeakBand::new(*min, *max + 1, 0.9));
        }

        Self {
            peak_bands,
            ..Self::default()
        }
    }

    fn day_weight(&self, weekday: Weekday) -> f64 {
        match weekday {
            Weekday::Sat | Weekday::Sun => self.weekend_weight,
            _ => self.weekday_weight,
        }
    }

    fn hour_weight(&self, hour: u32) -> f64 {
        self.peak_bands
            .iter()
            .find(|band| band.contains(hour))
            .map(|band| band.weight)
            .unwrap_or(self.off_peak_weight)
    }

    /// Score a single instant
    pub fn score(&self, instant: DateTime<Utc>) -> f64 {
        self.day_weight(instant.weekday()) * self.hour_weight(instant.hour())
    }
}

/// Calendar window `[start, end)` for slot generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted ranges
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> SchedulerResult<Self> {
        if end <= start {
            return Err(SchedulerError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Bounds of the i-th of `n` equal segments
    fn segment(&self, index: usize, count: usize) -> (DateTime<Utc>, DateTime<Utc>) {
        let total = self.end - self.start;
        let step = total / count as i32;
        let seg_start = self.start + step * index as i32;
        let seg_end = if index + 1 == count {
            self.end
        } else {
            self.start + step * (index as i32 + 1)
        };
        (seg_start, seg_end)
    }
}

/// A recommended instant and its heuristic score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedSlot {
    pub instant: DateTime<Utc>,
    pub score: f64,
}

/// Finite, restartable recommendation sequence, best score first
#[derive(Debug, Clone, Default)]
pub struct Recommendations {
    slots: Vec<RankedSlot>,
}

impl Recommendations {
    /// Ranked slots, best first
    pub fn slots(&self) -> &[RankedSlot] {
        &self.slots
    }

    /// Iterate over the recommended instants in rank order
    pub fn instants(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.slots.iter().map(|s| s.instant)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl IntoIterator for Recommendations {
    type Item = RankedSlot;
    type IntoIter = std::vec::IntoIter<RankedSlot>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.into_iter()
    }
}

/// Deterministic time-slot recommender
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotRecommender;

impl SlotRecommender {
    pub fn new() -> Self {
        Self
    }

    /// Recommend up to `count` instants inside `window`, ranked by score
    ///
    /// For `count > 1` the window is split into `count` equal segments
    /// and the best slot of each segment is taken, so recommendations
    /// spread across the window instead of clustering in one peak band.
    /// Ties always resolve to the earlier instant.
    pub fn recommend(
        &self,
        window: TimeWindow,
        count: usize,
        rules: &HeuristicConfig,
    ) -> SchedulerResult<Recommendations> {
        if count == 0 {
            return Err(SchedulerError::InvalidSlotCount { count });
        }

        let grid = hour_grid(window);
        if grid.is_empty() {
            // window narrower than an hour boundary: the start is the
            // only slot on offer
            return Ok(Recommendations {
                slots: vec![RankedSlot {
                    instant: window.start,
                    score: rules.score(window.start),
                }],
            });
        }

        let mut selected: Vec<RankedSlot> = Vec::with_capacity(count);
        for i in 0..count {
            let (seg_start, seg_end) = window.segment(i, count);
            let best = grid
                .iter()
                .filter(|t| **t >= seg_start && **t < seg_end)
                .map(|t| RankedSlot {
                    instant: *t,
                    score: rules.score(*t),
                })
                // max_by on (score, Reverse(instant)) keeps the earlier
                // instant on equal scores
                .max_by(|a, b| {
                    a.score
                        .partial_cmp(&b.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.instant.cmp(&a.instant))
                });

            if let Some(slot) = best {
                selected.push(slot);
            }
        }

        selected.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.instant.cmp(&b.instant))
        });

        Ok(Recommendations { slots: selected })
    }
}

/// Hour-aligned instants inside the window
fn hour_grid(window: TimeWindow) -> Vec<DateTime<Utc>> {
    let mut grid = Vec::new();

    let mut t = window
        .start
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(window.start);
    if t < window.start {
        t += Duration::hours(1);
    }

    while t < window.end {
        grid.push(t);
        t += Duration::hours(1);
    }

    grid
}
