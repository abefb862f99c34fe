use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use waypost::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "waypost",
    version,
    about = "LinkedIn post scheduling and dispatch engine",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (environment variables otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate draft posts from a source (URL, file, or raw text)
    Create {
        /// Source URL, file path, or pasted text
        source: String,

        /// Tone of the generated post
        #[arg(short, long, default_value = "professional")]
        tone: String,

        /// Type of post to generate
        #[arg(short, long, default_value = "informative")]
        post_type: String,

        /// Number of variants to generate (1-5)
        #[arg(short = 'n', long, default_value = "1")]
        variants: u32,

        /// Additional instructions for the generator
        #[arg(long)]
        context: Option<String>,
    },

    /// Schedule a draft for publication at an explicit instant
    Schedule {
        /// Draft identifier
        draft_id: Uuid,

        /// Target instant (RFC 3339, e.g. 2026-09-01T09:00:00Z)
        at: DateTime<Utc>,

        /// Skip the minimum-spacing check
        #[arg(long)]
        override_spacing: bool,

        /// Replace an existing active entry for this draft
        #[arg(long)]
        replace: bool,
    },

    /// Schedule a batch of drafts into the coming window
    Bulk {
        /// Draft identifiers (defaults to all stored drafts)
        draft_ids: Vec<Uuid>,

        /// Window length in days
        #[arg(short, long, default_value = "7")]
        window_days: i64,

        /// Cadence: daily, weekly, or e.g. 36h
        #[arg(short, long, default_value = "daily")]
        frequency: String,
    },

    /// Cancel a pending schedule entry
    Cancel {
        /// Entry identifier
        entry_id: Uuid,
    },

    /// Move a pending entry to a new instant
    Reschedule {
        /// Entry identifier
        entry_id: Uuid,

        /// New target instant (RFC 3339)
        at: DateTime<Utc>,
    },

    /// List schedule entries
    List {
        /// Filter by status (pending, dispatching, published, failed, canceled)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List stored drafts
    Drafts {
        /// Maximum drafts to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Publish due entries (loop, or a single pass with --once)
    Dispatch {
        /// Run one tick and exit
        #[arg(long)]
        once: bool,
    },

    /// Run the automated extract-generate-schedule cycle
    Automate {
        /// Ignore per-source check intervals
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Create {
            source,
            tone,
            post_type,
            variants,
            context,
        } => {
            tracing::info!(source = %source, tone = %tone, post_type = %post_type, "Starting create command");
            commands::create(config, source, tone, post_type, variants, context).await?;
        }

        Commands::Schedule {
            draft_id,
            at,
            override_spacing,
            replace,
        } => {
            tracing::info!(draft_id = %draft_id, at = %at, "Starting schedule command");
            commands::schedule(config, draft_id, at, override_spacing, replace).await?;
        }

        Commands::Bulk {
            draft_ids,
            window_days,
            frequency,
        } => {
            tracing::info!(
                drafts = draft_ids.len(),
                window_days,
                frequency = %frequency,
                "Starting bulk command"
            );
            commands::bulk(config, draft_ids, window_days, frequency).await?;
        }

        Commands::Cancel { entry_id } => {
            tracing::info!(entry_id = %entry_id, "Starting cancel command");
            commands::cancel(config, entry_id).await?;
        }

        Commands::Reschedule { entry_id, at } => {
            tracing::info!(entry_id = %entry_id, at = %at, "Starting reschedule command");
            commands::reschedule(config, entry_id, at).await?;
        }

        Commands::List { status, limit } => {
            commands::list_entries(config, status, limit).await?;
        }

        Commands::Drafts { limit } => {
            commands::list_drafts(config, limit).await?;
        }

        Commands::Dispatch { once } => {
            tracing::info!(once, "Starting dispatch command");
            commands::dispatch(config, once).await?;
        }

        Commands::Automate { force } => {
            tracing::info!(force, "Starting automate command");
            commands::automate(config, force).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("waypost=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("waypost=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
