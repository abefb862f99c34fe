//! waypost - LinkedIn post scheduling and dispatch engine
//!
//! Turns source material into drafted LinkedIn posts, books them into
//! well-spaced publication slots, and publishes them when due.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`content`] - Source extraction and AI post generation
//! - [`models`] - Core data structures and types
//! - [`scheduler`] - Slot recommendation, spacing, and entry lifecycle
//! - [`dispatch`] - Due-entry publication loop with retry backoff
//! - [`publish`] - Publication transports (LinkedIn UGC API)
//! - [`automation`] - Hands-off extract-generate-schedule cycles
//! - [`storage`] - Draft and schedule persistence (SQLite, in-memory)
//! - [`utils`] - Common utilities and the injected clock
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use waypost::scheduler::{ScheduleOptions, Scheduler};
//! use waypost::storage::SqliteStore;
//! use waypost::utils::clock::system_clock;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteStore::open("data/waypost.db".as_ref())?);
//!     let scheduler = Scheduler::new(
//!         store.clone(),
//!         store,
//!         system_clock(),
//!         chrono::Duration::hours(24),
//!     );
//!     // scheduler.schedule_one(draft_id, at, ScheduleOptions::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod automation;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod publish;
pub mod scheduler;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::content::{ContentExtractor, ExtractedContent, PostGenerator, StyleParams};
    pub use crate::dispatch::{DispatchLoop, RetryPolicy, TickReport};
    pub use crate::error::{Error, ErrorCategory, Result, WaypostErrorTrait};
    pub use crate::models::{Draft, PostTone, PostType, PublicationReceipt, ScheduleEntry};
    pub use crate::publish::{PublishError, PublisherTransport};
    pub use crate::scheduler::{EntryStatus, ScheduleOptions, Scheduler};
    pub use crate::storage::{DraftRepository, ScheduleRepository, SqliteStore};
}

// Direct re-exports for convenience
pub use models::{Draft, PostTone, PostType, PublicationReceipt, ScheduleEntry};
