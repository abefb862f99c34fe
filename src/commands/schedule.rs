use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use waypost::config::Config;
use waypost::scheduler::{Frequency, PlacementOutcome, ScheduleOptions, TimeWindow};
use waypost::storage::DraftRepository;

use super::{build_scheduler, open_store};

/// Schedule a single draft at an explicit instant
pub async fn schedule(
    config: Config,
    draft_id: Uuid,
    at: DateTime<Utc>,
    override_spacing: bool,
    replace: bool,
) -> Result<()> {
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store);

    let entry = scheduler
        .schedule_one(
            draft_id,
            at,
            ScheduleOptions {
                override_spacing,
                replace_active: replace,
            },
        )
        .await
        .context("Failed to schedule draft")?;

    println!("Scheduled entry {} for {}", entry.id, entry.target_at);
    Ok(())
}

/// Schedule a batch of drafts into a window
pub async fn bulk(
    config: Config,
    draft_ids: Vec<Uuid>,
    window_days: i64,
    frequency: String,
) -> Result<()> {
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store.clone());

    let draft_ids = if draft_ids.is_empty() {
        // default to every unscheduled draft, newest first
        let mut ids = Vec::new();
        for draft in store.list_drafts(100).await? {
            ids.push(draft.id);
        }
        ids
    } else {
        draft_ids
    };

    if draft_ids.is_empty() {
        bail!("No drafts to schedule");
    }

    let frequency = parse_frequency(&frequency)?;
    let now = Utc::now();
    let window = TimeWindow::new(now, now + Duration::days(window_days))
        .context("Invalid scheduling window")?;

    let report = scheduler
        .schedule_bulk(&draft_ids, window, frequency, &config.heuristics())
        .await
        .context("Bulk scheduling failed")?;

    println!(
        "Placed {} of {} drafts",
        report.placed_count(),
        draft_ids.len()
    );
    for (draft_id, outcome) in &report.outcomes {
        match outcome {
            PlacementOutcome::Placed(entry) => {
                println!("  {} -> {}", draft_id, entry.target_at);
            }
            PlacementOutcome::Unplaceable { reason } => {
                println!("  {} -> not placed: {}", draft_id, reason);
            }
        }
    }

    Ok(())
}

/// Withdraw a pending entry
pub async fn cancel(config: Config, entry_id: Uuid) -> Result<()> {
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store);

    let entry = scheduler
        .cancel(entry_id)
        .await
        .context("Failed to cancel entry")?;

    println!("Canceled entry {} (was due {})", entry.id, entry.target_at);
    Ok(())
}

/// Move a pending entry to a new instant
pub async fn reschedule(config: Config, entry_id: Uuid, at: DateTime<Utc>) -> Result<()> {
    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store);

    let replacement = scheduler
        .reschedule(entry_id, at, ScheduleOptions::default())
        .await
        .context("Failed to reschedule entry")?;

    println!(
        "Rescheduled as entry {} for {}",
        replacement.id, replacement.target_at
    );
    Ok(())
}

fn parse_frequency(value: &str) -> Result<Frequency> {
    match value.to_lowercase().as_str() {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        other => {
            // accept "12h" / "36h" style custom cadences
            if let Some(hours) = other.strip_suffix('h').and_then(|h| h.parse::<i64>().ok()) {
                if hours > 0 {
                    return Ok(Frequency::Every(Duration::hours(hours)));
                }
            }
            bail!("Unknown frequency '{}' (expected daily, weekly, or e.g. 36h)", value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("daily").unwrap(), Frequency::Daily);
        assert_eq!(parse_frequency("WEEKLY").unwrap(), Frequency::Weekly);
        assert_eq!(
            parse_frequency("36h").unwrap(),
            Frequency::Every(Duration::hours(36))
        );
        assert!(parse_frequency("fortnightly").is_err());
        assert!(parse_frequency("0h").is_err());
    }
}
