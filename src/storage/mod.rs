//! Durable storage for drafts and schedule entries
//!
//! This module provides trait-based repository abstractions so the
//! scheduler and the dispatch loop never depend on a concrete backend:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Scheduler / Dispatch Loop / CLI                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        DraftRepository  +  ScheduleRepository traits        │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                         │
//!                   ▼                         ▼
//!          ┌─────────────────┐      ┌──────────────────┐
//!          │   SqliteStore   │      │  InMemoryStore   │
//!          │  (production)   │      │ (tests, dry run) │
//!          └─────────────────┘      └──────────────────┘
//! ```
//!
//! Both implementations provide the same conditional-update primitive:
//! a status transition only succeeds when the row still holds the
//! expected `from` status. That single-winner semantics is what makes
//! claiming safe across concurrent dispatch scans and across process
//! instances sharing one database file.

pub mod memory;
pub mod repository;

pub use memory::InMemoryStore;
pub use repository::{
    DraftRepository, ScheduleRepository, SqliteStore, StorageError, StorageResult,
};
