use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use waypost::automation::{AutomationManager, SourceOutcome};
use waypost::config::Config;
use waypost::content::{ChatCompletionGenerator, HttpExtractor};
use waypost::utils::clock::system_clock;

use super::{build_scheduler, open_store};

/// Run one extract-generate-schedule cycle over the configured sources
pub async fn automate(config: Config, force: bool) -> Result<()> {
    let settings = config.automation_settings()?;
    if settings.sources.is_empty() {
        bail!("No automation sources configured (set WAYPOST_AUTOMATION_SOURCES)");
    }

    let store = open_store(&config)?;
    let scheduler = build_scheduler(&config, store.clone());

    let extractor = HttpExtractor::new(Duration::from_secs(30))
        .context("Failed to build content extractor")?;
    let generator = ChatCompletionGenerator::new(config.generator_settings())
        .context("Failed to build post generator")?;

    let manager = AutomationManager::new(
        Arc::new(extractor),
        Arc::new(generator),
        scheduler,
        store,
        settings,
        system_clock(),
    );

    let report = manager.run(force).await;

    println!(
        "Automation run finished: {} scheduled, {} skipped, {} failed (of {} sources)",
        report.scheduled, report.skipped, report.failed, report.total_sources
    );
    for outcome in &report.outcomes {
        match outcome {
            SourceOutcome::Scheduled {
                source,
                draft_id,
                target_at,
            } => println!("  scheduled {} for {} (draft {})", source, target_at, draft_id),
            SourceOutcome::Skipped {
                source,
                last_checked,
            } => println!("  skipped {} (checked {})", source, last_checked),
            SourceOutcome::Failed { source, reason } => {
                println!("  failed {}: {}", source, reason)
            }
        }
    }

    if report.failed > 0 && report.scheduled == 0 {
        bail!("All automation sources failed");
    }

    Ok(())
}
