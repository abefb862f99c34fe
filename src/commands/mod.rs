pub mod automate;
pub mod dispatch;
pub mod posts;
pub mod schedule;

// Re-export command functions for convenience
pub use automate::automate;
pub use dispatch::dispatch;
pub use posts::{create, list_drafts, list_entries};
pub use schedule::{bulk, cancel, reschedule, schedule};

use anyhow::{Context, Result};
use std::sync::Arc;

use waypost::config::Config;
use waypost::scheduler::Scheduler;
use waypost::storage::SqliteStore;
use waypost::utils::clock::system_clock;

/// Open the configured database, creating parent directories as needed
pub fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    if let Some(parent) = config.database.sqlite_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }
    }

    let store = SqliteStore::open(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.sqlite_path.display()
        )
    })?;

    Ok(Arc::new(store))
}

/// Build a scheduler over the configured store
pub fn build_scheduler(config: &Config, store: Arc<SqliteStore>) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(
        store.clone(),
        store,
        system_clock(),
        config.min_spacing(),
    ))
}
