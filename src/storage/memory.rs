//! In-memory store
//!
//! Mirrors the SQLite repository semantics, including single-winner
//! conditional transitions, behind one mutex. Used by tests and by dry
//! runs that should not touch a database file.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::repository::{DraftRepository, ScheduleRepository, StorageResult};
use crate::models::{Draft, PublicationReceipt, ScheduleEntry};
use crate::scheduler::lifecycle::{self, EntryStatus};

#[derive(Default)]
struct Tables {
    drafts: HashMap<Uuid, Draft>,
    entries: HashMap<Uuid, ScheduleEntry>,
}

/// Mutex-guarded map-backed store implementing both repositories
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("in-memory store lock poisoned")
    }
}

#[async_trait]
impl DraftRepository for InMemoryStore {
    async fn insert_draft(&self, draft: &Draft) -> StorageResult<()> {
        self.lock().drafts.insert(draft.id, draft.clone());
        Ok(())
    }

    async fn get_draft(&self, id: Uuid) -> StorageResult<Option<Draft>> {
        Ok(self.lock().drafts.get(&id).cloned())
    }

    async fn list_drafts(&self, limit: usize) -> StorageResult<Vec<Draft>> {
        let mut drafts: Vec<Draft> = self.lock().drafts.values().cloned().collect();
        drafts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        drafts.truncate(limit);
        Ok(drafts)
    }

    async fn last_draft_from_source(&self, url: &str) -> StorageResult<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .drafts
            .values()
            .filter(|d| d.sources.iter().any(|s| s.url == url))
            .map(|d| d.created_at)
            .max())
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryStore {
    async fn insert_entry(&self, entry: &ScheduleEntry) -> StorageResult<()> {
        self.lock().entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get_entry(&self, id: Uuid) -> StorageResult<Option<ScheduleEntry>> {
        Ok(self.lock().entries.get(&id).cloned())
    }

    async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>> {
        let mut entries: Vec<ScheduleEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.target_at.cmp(&b.target_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn find_active_by_draft(
        &self,
        draft_id: Uuid,
    ) -> StorageResult<Option<ScheduleEntry>> {
        Ok(self
            .lock()
            .entries
            .values()
            .filter(|e| e.draft_id == draft_id && e.status.is_active())
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn active_instants(&self) -> StorageResult<Vec<DateTime<Utc>>> {
        let mut instants: Vec<DateTime<Utc>> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.status.is_active())
            .map(|e| e.target_at)
            .collect();
        instants.sort();
        Ok(instants)
    }

    async fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>> {
        let mut due: Vec<ScheduleEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.target_at.cmp(&b.target_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ScheduleEntry>> {
        let mut tables = self.lock();
        let Some(entry) = tables.entries.get_mut(&id) else {
            return Ok(None);
        };

        if entry.status != from || !lifecycle::can_transition(from, to) {
            return Ok(None);
        }

        entry.status = to;
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> StorageResult<Option<ScheduleEntry>> {
        let mut tables = self.lock();
        let Some(entry) = tables.entries.get_mut(&id) else {
            return Ok(None);
        };

        if entry.status != EntryStatus::Pending {
            return Ok(None);
        }

        entry.status = EntryStatus::Dispatching;
        entry.claimed_at = Some(now);
        entry.updated_at = now;
        Ok(Some(entry.clone()))
    }

    async fn record_published(
        &self,
        id: Uuid,
        receipt: &PublicationReceipt,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut tables = self.lock();
        let Some(entry) = tables.entries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.status != EntryStatus::Dispatching {
            return Ok(false);
        }

        entry.status = EntryStatus::Published;
        entry.receipt = Some(receipt.clone());
        entry.published_at = Some(now);
        entry.updated_at = now;
        entry.claimed_at = None;
        entry.last_error = None;
        Ok(true)
    }

    async fn record_failed(
        &self,
        id: Uuid,
        error: &str,
        attempt_count: u32,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut tables = self.lock();
        let Some(entry) = tables.entries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.status != EntryStatus::Dispatching {
            return Ok(false);
        }

        entry.status = EntryStatus::Failed;
        entry.last_error = Some(error.to_string());
        entry.attempt_count = attempt_count;
        entry.updated_at = now;
        entry.claimed_at = None;
        Ok(true)
    }

    async fn release_for_retry(
        &self,
        id: Uuid,
        next_due: DateTime<Utc>,
        attempt_count: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut tables = self.lock();
        let Some(entry) = tables.entries.get_mut(&id) else {
            return Ok(false);
        };

        if entry.status != EntryStatus::Dispatching {
            return Ok(false);
        }

        entry.status = EntryStatus::Pending;
        entry.target_at = next_due;
        entry.attempt_count = attempt_count;
        entry.last_error = Some(error.to_string());
        entry.updated_at = now;
        entry.claimed_at = None;
        Ok(true)
    }

    async fn reap_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let mut tables = self.lock();
        let mut reaped = 0;

        for entry in tables.entries.values_mut() {
            if entry.status == EntryStatus::Dispatching
                && entry.claimed_at.is_some_and(|claimed| claimed < cutoff)
            {
                entry.status = EntryStatus::Pending;
                entry.claimed_at = None;
                entry.updated_at = now;
                reaped += 1;
            }
        }

        Ok(reaped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_claim_single_winner() {
        let store = InMemoryStore::new();
        let now = fixed_now();
        let entry = ScheduleEntry::new(Uuid::new_v4(), now, now);
        store.insert_entry(&entry).await.unwrap();

        assert!(store.claim(entry.id, now).await.unwrap().is_some());
        assert!(store.claim(entry.id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_respects_lifecycle_table() {
        let store = InMemoryStore::new();
        let now = fixed_now();
        let entry = ScheduleEntry::new(Uuid::new_v4(), now, now);
        store.insert_entry(&entry).await.unwrap();

        // pending -> published is not a legal transition
        let result = store
            .transition(entry.id, EntryStatus::Pending, EntryStatus::Published, now)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_due_order() {
        let store = InMemoryStore::new();
        let now = fixed_now();

        let b = ScheduleEntry::new(Uuid::new_v4(), now - Duration::minutes(1), now);
        let a = ScheduleEntry::new(Uuid::new_v4(), now - Duration::minutes(10), now);
        store.insert_entry(&b).await.unwrap();
        store.insert_entry(&a).await.unwrap();

        let due = store.due_entries(now, 10).await.unwrap();
        assert_eq!(due.iter().map(|e| e.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    }
}
