//! Publication dispatch loop
//!
//! Drains due schedule entries and pushes their drafts through the
//! configured transport:
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────┐
//!   │                      tick()                         │
//!   │                                                     │
//!   │  reap stale claims ──► list due ──► claim (CAS)     │
//!   │                                        │            │
//!   │                              publish with timeout   │
//!   │                              │                │     │
//!   │                           receipt          failure  │
//!   │                              │                │     │
//!   │                          published    retryable?    │
//!   │                                        yes │ no     │
//!   │                                 release    │ failed │
//!   │                                 for retry  │        │
//!   └─────────────────────────────────────────────────────┘
//! ```
//!
//! Claiming is a conditional update, so any number of loop instances
//! can share one database and each due entry is still published at
//! most once.

pub mod backoff;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::models::Draft;
use crate::publish::{PublishError, PublisherTransport};
use crate::storage::{DraftRepository, ScheduleRepository, StorageResult};
use crate::utils::clock::SharedClock;

pub use backoff::RetryPolicy;

/// Entries drained per tick
const DUE_BATCH_SIZE: usize = 20;

/// What one pass over the due set did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Stale claims released back to pending
    pub reaped: usize,
    /// Entries published with a receipt
    pub published: usize,
    /// Entries released for a later retry
    pub retried: usize,
    /// Entries that failed terminally
    pub failed: usize,
}

impl TickReport {
    /// Entries the tick acted on
    pub fn total_handled(&self) -> usize {
        self.published + self.retried + self.failed
    }
}

/// Periodic dispatcher of due schedule entries
pub struct DispatchLoop {
    entries: Arc<dyn ScheduleRepository>,
    drafts: Arc<dyn DraftRepository>,
    transport: Arc<dyn PublisherTransport>,
    policy: RetryPolicy,
    tick_interval: Duration,
    transport_timeout: Duration,
    /// Claims older than this are considered abandoned
    max_claim_age: chrono::Duration,
    clock: SharedClock,
    running: Arc<RwLock<bool>>,
}

impl DispatchLoop {
    pub fn new(
        entries: Arc<dyn ScheduleRepository>,
        drafts: Arc<dyn DraftRepository>,
        transport: Arc<dyn PublisherTransport>,
        policy: RetryPolicy,
        clock: SharedClock,
    ) -> Self {
        Self {
            entries,
            drafts,
            transport,
            policy,
            tick_interval: Duration::from_secs(60),
            transport_timeout: Duration::from_secs(60),
            max_claim_age: chrono::Duration::minutes(10),
            clock,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Override the pause between ticks
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override the per-publish timeout
    pub fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = timeout;
        self
    }

    /// Override the stale-claim cutoff age
    pub fn with_max_claim_age(mut self, age: chrono::Duration) -> Self {
        self.max_claim_age = age;
        self
    }

    /// Run ticks until [`stop`](Self::stop) is called
    pub async fn run(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("dispatch loop already running");
                return;
            }
            *running = true;
        }

        info!(
            interval_secs = self.tick_interval.as_secs(),
            "dispatch loop started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if !*self.running.read().await {
                break;
            }

            match self.tick().await {
                Ok(report) if report.total_handled() > 0 || report.reaped > 0 => {
                    info!(
                        published = report.published,
                        retried = report.retried,
                        failed = report.failed,
                        reaped = report.reaped,
                        "dispatch tick complete"
                    );
                }
                Ok(_) => debug!("dispatch tick idle"),
                Err(e) => error!(error = %e, "dispatch tick failed"),
            }
        }

        info!("dispatch loop stopped");
    }

    /// Signal the loop to exit after its current tick
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    /// One pass: reap stale claims, then drain and publish due entries
    pub async fn tick(&self) -> StorageResult<TickReport> {
        let mut report = TickReport::default();
        let now = self.clock.now();

        report.reaped = self.entries.reap_stale(now - self.max_claim_age, now).await?;
        if report.reaped > 0 {
            warn!(count = report.reaped, "released stale dispatch claims");
        }

        let due = self.entries.due_entries(now, DUE_BATCH_SIZE).await?;

        for entry in due {
            let now = self.clock.now();

            // conditional claim: losing here just means another loop
            // instance got there first
            let Some(claimed) = self.entries.claim(entry.id, now).await? else {
                debug!(entry_id = %entry.id, "entry claimed elsewhere, skipping");
                continue;
            };

            match self.drafts.get_draft(claimed.draft_id).await? {
                Some(draft) => {
                    self.dispatch_one(&claimed, &draft, &mut report).await?;
                }
                None => {
                    // dangling entry; fail it rather than retry forever
                    error!(entry_id = %claimed.id, draft_id = %claimed.draft_id, "draft missing for due entry");
                    self.entries
                        .record_failed(
                            claimed.id,
                            "draft no longer exists",
                            claimed.attempt_count + 1,
                            self.clock.now(),
                        )
                        .await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn dispatch_one(
        &self,
        entry: &crate::models::ScheduleEntry,
        draft: &Draft,
        report: &mut TickReport,
    ) -> StorageResult<()> {
        let body = draft.publish_body();
        let attempt = entry.attempt_count + 1;
        debug!(entry_id = %entry.id, attempt, "publishing draft");

        let outcome =
            tokio::time::timeout(self.transport_timeout, self.transport.publish(&body)).await;

        match outcome {
            Ok(Ok(receipt)) => {
                let now = self.clock.now();
                if self.entries.record_published(entry.id, &receipt, now).await? {
                    info!(entry_id = %entry.id, post_id = %receipt.post_id, "post published");
                    report.published += 1;
                } else {
                    // entry moved under us (e.g. reaped and re-claimed);
                    // the receipt holder wins, nothing more to record
                    warn!(entry_id = %entry.id, "publish succeeded but entry was no longer dispatching");
                }
            }
            Ok(Err(publish_error)) => {
                self.handle_failure(entry, attempt, &publish_error, report)
                    .await?;
            }
            Err(_elapsed) => {
                let timeout_error = PublishError::Network {
                    reason: format!(
                        "publish timed out after {}s",
                        self.transport_timeout.as_secs()
                    ),
                };
                self.handle_failure(entry, attempt, &timeout_error, report)
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_failure(
        &self,
        entry: &crate::models::ScheduleEntry,
        attempt: u32,
        publish_error: &PublishError,
        report: &mut TickReport,
    ) -> StorageResult<()> {
        let now = self.clock.now();
        let message = publish_error.to_string();

        if publish_error.is_retryable() && !self.policy.is_exhausted(attempt) {
            let next_due = self.policy.next_due(now, attempt);
            warn!(
                entry_id = %entry.id,
                attempt,
                next_due = %next_due,
                error = %message,
                "publish failed, scheduling retry"
            );
            if self
                .entries
                .release_for_retry(entry.id, next_due, attempt, &message, now)
                .await?
            {
                report.retried += 1;
            }
        } else {
            error!(
                entry_id = %entry.id,
                attempt,
                error = %message,
                "publish failed terminally"
            );
            if self
                .entries
                .record_failed(entry.id, &message, attempt, now)
                .await?
            {
                report.failed += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PublicationReceipt, ScheduleEntry};
    use crate::storage::InMemoryStore;
    use crate::utils::clock::{Clock, ManualClock};
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<PublicationReceipt, PublishError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<PublicationReceipt, PublishError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl PublisherTransport for ScriptedTransport {
        async fn publish(&self, _body: &str) -> Result<PublicationReceipt, PublishError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(PublishError::Network {
                        reason: "script exhausted".into(),
                    })
                })
        }
    }

    fn receipt() -> PublicationReceipt {
        PublicationReceipt {
            post_id: "urn:li:share:1".into(),
            post_url: Some("https://www.linkedin.com/feed/update/urn:li:share:1".into()),
        }
    }

    async fn seed_due_entry(store: &Arc<InMemoryStore>, clock: &ManualClock) -> ScheduleEntry {
        let now = clock.now();
        let draft = Draft::new("Test post body", now);
        store.insert_draft(&draft).await.unwrap();

        let entry = ScheduleEntry::new(draft.id, now - chrono::Duration::minutes(1), now);
        store.insert_entry(&entry).await.unwrap();
        entry
    }

    fn make_loop(
        store: Arc<InMemoryStore>,
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
    ) -> DispatchLoop {
        DispatchLoop::new(
            store.clone(),
            store,
            transport,
            RetryPolicy::new(3),
            clock,
        )
    }

    fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_tick_publishes_due_entry() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let entry = seed_due_entry(&store, &clock).await;

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(receipt())]));
        let dispatcher = make_loop(store.clone(), transport.clone(), clock);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(transport.call_count(), 1);

        let updated = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::scheduler::EntryStatus::Published);
        assert!(updated.receipt.is_some());
        assert!(updated.published_at.is_some());
    }

    #[tokio::test]
    async fn test_retryable_failure_releases_with_backoff() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let entry = seed_due_entry(&store, &clock).await;

        let transport = Arc::new(ScriptedTransport::new(vec![Err(PublishError::Network {
            reason: "connection reset".into(),
        })]));
        let dispatcher = make_loop(store.clone(), transport, clock.clone());

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.retried, 1);

        let updated = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::scheduler::EntryStatus::Pending);
        assert_eq!(updated.attempt_count, 1);
        assert_eq!(
            updated.target_at,
            clock.now() + chrono::Duration::seconds(60)
        );
        assert!(updated.last_error.is_some());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_terminal() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let entry = seed_due_entry(&store, &clock).await;

        let transport = Arc::new(ScriptedTransport::new(vec![Err(
            PublishError::AuthExpired,
        )]));
        let dispatcher = make_loop(store.clone(), transport.clone(), clock);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(transport.call_count(), 1);

        let updated = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::scheduler::EntryStatus::Failed);
    }

    #[tokio::test]
    async fn test_retries_exhaust_into_failure() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let entry = seed_due_entry(&store, &clock).await;

        let network_err = || {
            Err(PublishError::Network {
                reason: "flaky".into(),
            })
        };
        let transport = Arc::new(ScriptedTransport::new(vec![
            network_err(),
            network_err(),
            network_err(),
        ]));
        let dispatcher = make_loop(store.clone(), transport.clone(), clock.clone());

        // each failed attempt pushes target_at forward; advance past the
        // backoff before the next tick
        for _ in 0..3 {
            dispatcher.tick().await.unwrap();
            clock.advance(chrono::Duration::hours(2));
        }

        assert_eq!(transport.call_count(), 3);
        let updated = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::scheduler::EntryStatus::Failed);
        assert_eq!(updated.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_missing_draft_fails_entry() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let now = clock.now();

        let entry = ScheduleEntry::new(uuid::Uuid::new_v4(), now - chrono::Duration::minutes(1), now);
        store.insert_entry(&entry).await.unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(receipt())]));
        let dispatcher = make_loop(store.clone(), transport.clone(), clock);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(transport.call_count(), 0);

        let updated = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::scheduler::EntryStatus::Failed);
    }

    #[tokio::test]
    async fn test_stale_claim_reaped_then_republished() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let entry = seed_due_entry(&store, &clock).await;

        // simulate a crashed dispatcher holding a stale claim
        store.claim(entry.id, clock.now()).await.unwrap();
        clock.advance(chrono::Duration::minutes(30));

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(receipt())]));
        let dispatcher = make_loop(store.clone(), transport, clock);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.reaped, 1);
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn test_future_entry_not_dispatched() {
        let store = Arc::new(InMemoryStore::new());
        let clock = manual_clock();
        let now = clock.now();

        let draft = Draft::new("later", now);
        store.insert_draft(&draft).await.unwrap();
        let entry = ScheduleEntry::new(draft.id, now + chrono::Duration::hours(2), now);
        store.insert_entry(&entry).await.unwrap();

        let transport = Arc::new(ScriptedTransport::new(vec![Ok(receipt())]));
        let dispatcher = make_loop(store.clone(), transport.clone(), clock);

        let report = dispatcher.tick().await.unwrap();
        assert_eq!(report.total_handled(), 0);
        assert_eq!(transport.call_count(), 0);
    }
}
