//! Repository traits and the SQLite implementation
//!
//! The schedule repository exposes row CRUD plus a conditional-update
//! primitive: every status change names the status it expects to find,
//! and only one concurrent caller can win the update. Claiming a due
//! entry, canceling, rescheduling and the stale-claim reaper all ride on
//! that primitive.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Draft, PublicationReceipt, ScheduleEntry, SourceRef};
use crate::scheduler::lifecycle::EntryStatus;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying SQLite failure
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure (database directory creation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Row contents could not be interpreted
    #[error("Corrupt row: {reason}")]
    Corrupt { reason: String },
}

impl StorageError {
    fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Durable storage of drafts
#[async_trait]
pub trait DraftRepository: Send + Sync {
    /// Persist a new draft
    async fn insert_draft(&self, draft: &Draft) -> StorageResult<()>;

    /// Fetch a draft by id
    async fn get_draft(&self, id: Uuid) -> StorageResult<Option<Draft>>;

    /// Most recent drafts first
    async fn list_drafts(&self, limit: usize) -> StorageResult<Vec<Draft>>;

    /// Creation instant of the newest draft generated from the given
    /// source URL, if any (used by the automation check interval)
    async fn last_draft_from_source(&self, url: &str) -> StorageResult<Option<DateTime<Utc>>>;
}

/// Durable storage of schedule entries
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Persist a new entry
    async fn insert_entry(&self, entry: &ScheduleEntry) -> StorageResult<()>;

    /// Fetch an entry by id
    async fn get_entry(&self, id: Uuid) -> StorageResult<Option<ScheduleEntry>>;

    /// List entries, optionally filtered by status, ordered by target instant
    async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>>;

    /// The active (pending or dispatching) entry for a draft, if any
    async fn find_active_by_draft(&self, draft_id: Uuid)
        -> StorageResult<Option<ScheduleEntry>>;

    /// Target instants of all active entries
    async fn active_instants(&self) -> StorageResult<Vec<DateTime<Utc>>>;

    /// Pending entries whose target instant has passed, earliest first
    async fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>>;

    /// Conditional status transition. Succeeds only if the entry still
    /// holds `from`; returns the updated entry on the winning side and
    /// `None` when another caller got there first.
    async fn transition(
        &self,
        id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ScheduleEntry>>;

    /// Exclusive claim: pending -> dispatching, recording the claim
    /// instant. Single winner under concurrent scans.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> StorageResult<Option<ScheduleEntry>>;

    /// dispatching -> published with the transport receipt
    async fn record_published(
        &self,
        id: Uuid,
        receipt: &PublicationReceipt,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// dispatching -> failed, preserving the last error
    async fn record_failed(
        &self,
        id: Uuid,
        error: &str,
        attempt_count: u32,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// dispatching -> pending with a new due instant (retry backoff)
    async fn release_for_retry(
        &self,
        id: Uuid,
        next_due: DateTime<Utc>,
        attempt_count: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Revert dispatching entries whose claim started before `cutoff`
    /// back to pending. Returns the number of reaped entries.
    async fn reap_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>)
        -> StorageResult<usize>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

/// SQLite-backed store implementing both repositories
///
/// A single connection behind a mutex; statements are short and never
/// held across await points. WAL mode and a busy timeout keep the file
/// usable from multiple process instances.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        create_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an ephemeral in-memory database (single connection)
    pub fn open_ephemeral() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection lock poisoned")
    }
}

fn create_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS drafts (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            tone TEXT NOT NULL,
            post_type TEXT NOT NULL,
            hashtags TEXT NOT NULL,
            sources TEXT NOT NULL,
            model_used TEXT,
            notes TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS schedule_entries (
            id TEXT PRIMARY KEY,
            draft_id TEXT NOT NULL,
            target_at TEXT NOT NULL,
            status TEXT NOT NULL,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            receipt_post_id TEXT,
            receipt_post_url TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT,
            claimed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_entries_status
            ON schedule_entries(status);
        CREATE INDEX IF NOT EXISTS idx_entries_draft
            ON schedule_entries(draft_id);
        CREATE INDEX IF NOT EXISTS idx_entries_target
            ON schedule_entries(target_at);",
    )?;

    Ok(())
}

/// Fixed-width RFC 3339 so lexicographic comparison in SQL matches
/// chronological order
fn to_db(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StorageError::corrupt(format!("bad timestamp '{s}': {e}")))
}

fn from_db_opt(s: Option<&str>) -> StorageResult<Option<DateTime<Utc>>> {
    s.map(from_db).transpose()
}

fn parse_uuid(s: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::corrupt(format!("bad uuid '{s}': {e}")))
}

/// Raw row image used between rusqlite and the domain types
struct RawEntry {
    id: String,
    draft_id: String,
    target_at: String,
    status: String,
    attempt_count: u32,
    last_error: Option<String>,
    receipt_post_id: Option<String>,
    receipt_post_url: Option<String>,
    created_at: String,
    updated_at: String,
    published_at: Option<String>,
    claimed_at: Option<String>,
}

const ENTRY_COLUMNS: &str = "id, draft_id, target_at, status, attempt_count, last_error, \
     receipt_post_id, receipt_post_url, created_at, updated_at, published_at, claimed_at";

fn read_raw_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        id: row.get(0)?,
        draft_id: row.get(1)?,
        target_at: row.get(2)?,
        status: row.get(3)?,
        attempt_count: row.get(4)?,
        last_error: row.get(5)?,
        receipt_post_id: row.get(6)?,
        receipt_post_url: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        published_at: row.get(10)?,
        claimed_at: row.get(11)?,
    })
}

impl TryFrom<RawEntry> for ScheduleEntry {
    type Error = StorageError;

    fn try_from(raw: RawEntry) -> StorageResult<Self> {
        let status: EntryStatus = raw
            .status
            .parse()
            .map_err(|_| StorageError::corrupt(format!("unknown status '{}'", raw.status)))?;

        let receipt = raw.receipt_post_id.map(|post_id| PublicationReceipt {
            post_id,
            post_url: raw.receipt_post_url,
        });

        Ok(ScheduleEntry {
            id: parse_uuid(&raw.id)?,
            draft_id: parse_uuid(&raw.draft_id)?,
            target_at: from_db(&raw.target_at)?,
            status,
            attempt_count: raw.attempt_count,
            last_error: raw.last_error,
            receipt,
            created_at: from_db(&raw.created_at)?,
            updated_at: from_db(&raw.updated_at)?,
            published_at: from_db_opt(raw.published_at.as_deref())?,
            claimed_at: from_db_opt(raw.claimed_at.as_deref())?,
        })
    }
}

struct RawDraft {
    id: String,
    content: String,
    tone: String,
    post_type: String,
    hashtags: String,
    sources: String,
    model_used: Option<String>,
    notes: Option<String>,
    created_at: String,
}

fn read_raw_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawDraft> {
    Ok(RawDraft {
        id: row.get(0)?,
        content: row.get(1)?,
        tone: row.get(2)?,
        post_type: row.get(3)?,
        hashtags: row.get(4)?,
        sources: row.get(5)?,
        model_used: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl TryFrom<RawDraft> for Draft {
    type Error = StorageError;

    fn try_from(raw: RawDraft) -> StorageResult<Self> {
        let tone = crate::models::PostTone::parse(&raw.tone)
            .ok_or_else(|| StorageError::corrupt(format!("unknown tone '{}'", raw.tone)))?;
        let post_type = crate::models::PostType::parse(&raw.post_type).ok_or_else(|| {
            StorageError::corrupt(format!("unknown post type '{}'", raw.post_type))
        })?;

        let hashtags: Vec<String> = serde_json::from_str(&raw.hashtags)?;
        let sources: Vec<SourceRef> = serde_json::from_str(&raw.sources)?;

        Ok(Draft {
            id: parse_uuid(&raw.id)?,
            content: raw.content,
            tone,
            post_type,
            hashtags,
            sources,
            model_used: raw.model_used,
            notes: raw.notes,
            created_at: from_db(&raw.created_at)?,
        })
    }
}

#[async_trait]
impl DraftRepository for SqliteStore {
    async fn insert_draft(&self, draft: &Draft) -> StorageResult<()> {
        let hashtags = serde_json::to_string(&draft.hashtags)?;
        let sources = serde_json::to_string(&draft.sources)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO drafts (id, content, tone, post_type, hashtags, sources, model_used, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                draft.id.to_string(),
                draft.content,
                draft.tone.as_str(),
                draft.post_type.as_str(),
                hashtags,
                sources,
                draft.model_used,
                draft.notes,
                to_db(&draft.created_at),
            ],
        )?;

        Ok(())
    }

    async fn get_draft(&self, id: Uuid) -> StorageResult<Option<Draft>> {
        let raw = {
            let conn = self.lock();
            conn.query_row(
                "SELECT id, content, tone, post_type, hashtags, sources, model_used, notes, created_at
                 FROM drafts WHERE id = ?1",
                params![id.to_string()],
                read_raw_draft,
            )
            .optional()?
        };

        raw.map(Draft::try_from).transpose()
    }

    async fn list_drafts(&self, limit: usize) -> StorageResult<Vec<Draft>> {
        let raws = {
            let conn = self.lock();
            let mut stmt = conn.prepare(
                "SELECT id, content, tone, post_type, hashtags, sources, model_used, notes, created_at
                 FROM drafts ORDER BY created_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], read_raw_draft)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raws.into_iter().map(Draft::try_from).collect()
    }

    async fn last_draft_from_source(&self, url: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let pattern = format!("%\"url\":{}%", serde_json::to_string(url)?);

        let latest: Option<String> = {
            let conn = self.lock();
            conn.query_row(
                "SELECT MAX(created_at) FROM drafts WHERE sources LIKE ?1",
                params![pattern],
                |row| row.get(0),
            )?
        };

        from_db_opt(latest.as_deref())
    }
}

#[async_trait]
impl ScheduleRepository for SqliteStore {
    async fn insert_entry(&self, entry: &ScheduleEntry) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO schedule_entries
                (id, draft_id, target_at, status, attempt_count, last_error,
                 receipt_post_id, receipt_post_url, created_at, updated_at, published_at, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                entry.id.to_string(),
                entry.draft_id.to_string(),
                to_db(&entry.target_at),
                entry.status.as_str(),
                entry.attempt_count,
                entry.last_error,
                entry.receipt.as_ref().map(|r| r.post_id.clone()),
                entry.receipt.as_ref().and_then(|r| r.post_url.clone()),
                to_db(&entry.created_at),
                to_db(&entry.updated_at),
                entry.published_at.as_ref().map(to_db),
                entry.claimed_at.as_ref().map(to_db),
            ],
        )?;

        Ok(())
    }

    async fn get_entry(&self, id: Uuid) -> StorageResult<Option<ScheduleEntry>> {
        let raw = {
            let conn = self.lock();
            conn.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE id = ?1"),
                params![id.to_string()],
                read_raw_entry,
            )
            .optional()?
        };

        raw.map(ScheduleEntry::try_from).transpose()
    }

    async fn list_entries(
        &self,
        status: Option<EntryStatus>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>> {
        let raws = {
            let conn = self.lock();
            match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ENTRY_COLUMNS} FROM schedule_entries
                         WHERE status = ?1 ORDER BY target_at ASC LIMIT ?2"
                    ))?;
                    let rows =
                        stmt.query_map(params![status.as_str(), limit as i64], read_raw_entry)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ENTRY_COLUMNS} FROM schedule_entries
                         ORDER BY target_at ASC LIMIT ?1"
                    ))?;
                    let rows = stmt.query_map(params![limit as i64], read_raw_entry)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            }
        };

        raws.into_iter().map(ScheduleEntry::try_from).collect()
    }

    async fn find_active_by_draft(
        &self,
        draft_id: Uuid,
    ) -> StorageResult<Option<ScheduleEntry>> {
        let raw = {
            let conn = self.lock();
            conn.query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM schedule_entries
                     WHERE draft_id = ?1 AND status IN ('pending', 'dispatching')
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![draft_id.to_string()],
                read_raw_entry,
            )
            .optional()?
        };

        raw.map(ScheduleEntry::try_from).transpose()
    }

    async fn active_instants(&self) -> StorageResult<Vec<DateTime<Utc>>> {
        let raw: Vec<String> = {
            let conn = self.lock();
            let mut stmt = conn.prepare(
                "SELECT target_at FROM schedule_entries
                 WHERE status IN ('pending', 'dispatching')",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raw.iter().map(|s| from_db(s)).collect()
    }

    async fn due_entries(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<ScheduleEntry>> {
        let raws = {
            let conn = self.lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM schedule_entries
                 WHERE status = 'pending' AND target_at <= ?1
                 ORDER BY target_at ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![to_db(&now), limit as i64], read_raw_entry)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raws.into_iter().map(ScheduleEntry::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<ScheduleEntry>> {
        crate::scheduler::lifecycle::check_transition(from, to)
            .map_err(|e| StorageError::corrupt(e.to_string()))?;

        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), to_db(&now), id.to_string(), from.as_str()],
            )?
        };

        if changed == 0 {
            return Ok(None);
        }

        self.get_entry(id).await
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> StorageResult<Option<ScheduleEntry>> {
        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries
                 SET status = 'dispatching', claimed_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![to_db(&now), id.to_string()],
            )?
        };

        if changed == 0 {
            return Ok(None);
        }

        self.get_entry(id).await
    }

    async fn record_published(
        &self,
        id: Uuid,
        receipt: &PublicationReceipt,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries
                 SET status = 'published', receipt_post_id = ?1, receipt_post_url = ?2,
                     published_at = ?3, updated_at = ?3, claimed_at = NULL, last_error = NULL
                 WHERE id = ?4 AND status = 'dispatching'",
                params![
                    receipt.post_id,
                    receipt.post_url,
                    to_db(&now),
                    id.to_string()
                ],
            )?
        };

        Ok(changed == 1)
    }

    async fn record_failed(
        &self,
        id: Uuid,
        error: &str,
        attempt_count: u32,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries
                 SET status = 'failed', last_error = ?1, attempt_count = ?2,
                     updated_at = ?3, claimed_at = NULL
                 WHERE id = ?4 AND status = 'dispatching'",
                params![error, attempt_count, to_db(&now), id.to_string()],
            )?
        };

        Ok(changed == 1)
    }

    async fn release_for_retry(
        &self,
        id: Uuid,
        next_due: DateTime<Utc>,
        attempt_count: u32,
        error: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries
                 SET status = 'pending', target_at = ?1, attempt_count = ?2,
                     last_error = ?3, updated_at = ?4, claimed_at = NULL
                 WHERE id = ?5 AND status = 'dispatching'",
                params![
                    to_db(&next_due),
                    attempt_count,
                    error,
                    to_db(&now),
                    id.to_string()
                ],
            )?
        };

        Ok(changed == 1)
    }

    async fn reap_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<usize> {
        let changed = {
            let conn = self.lock();
            conn.execute(
                "UPDATE schedule_entries
                 SET status = 'pending', claimed_at = NULL, updated_at = ?1
                 WHERE status = 'dispatching' AND claimed_at < ?2",
                params![to_db(&now), to_db(&cutoff)],
            )?
        };

        Ok(changed)
    }
}
