use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;

use waypost::config::Config;
use waypost::dispatch::DispatchLoop;
use waypost::publish::{LinkedInTransport, Visibility};
use waypost::utils::clock::system_clock;

use super::open_store;

/// Run the dispatch loop, or a single tick with `once`
pub async fn dispatch(config: Config, once: bool) -> Result<()> {
    if config.linkedin.access_token.is_empty() {
        bail!("LINKEDIN_ACCESS_TOKEN is not set");
    }
    if config.linkedin.author_urn.is_empty() {
        bail!("LINKEDIN_AUTHOR_URN is not set");
    }

    let visibility = Visibility::parse(&config.linkedin.visibility)
        .context("Invalid LinkedIn visibility")?;

    let transport = LinkedInTransport::with_api_base(
        config.linkedin.api_base.clone(),
        config.linkedin.access_token.clone(),
        config.linkedin.author_urn.clone(),
        visibility,
        Duration::from_secs(config.linkedin.min_post_gap_secs),
    )
    .context("Failed to build LinkedIn transport")?;

    let store = open_store(&config)?;
    let dispatcher = DispatchLoop::new(
        store.clone(),
        store,
        Arc::new(transport),
        config.retry_policy(),
        system_clock(),
    )
    .with_tick_interval(config.tick_interval())
    .with_transport_timeout(config.transport_timeout())
    .with_max_claim_age(config.max_claim_age());

    if once {
        let report = dispatcher.tick().await?;
        println!(
            "Tick complete: {} published, {} retried, {} failed, {} stale claims reaped",
            report.published, report.retried, report.failed, report.reaped
        );
        return Ok(());
    }

    println!(
        "Dispatch loop running (tick every {}s). Ctrl-C to stop.",
        config.dispatch.tick_interval_secs
    );

    let dispatcher = Arc::new(dispatcher);
    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("Shutting down after current tick...");
    dispatcher.stop().await;
    handle.await.context("Dispatch loop task panicked")?;

    Ok(())
}
