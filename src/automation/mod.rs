//! Hands-off content pipeline
//!
//! One automation run walks the configured sources and, for each source
//! with fresh material, extracts content, generates a draft, and books
//! it into the next open posting slot. Sources checked recently are
//! skipped so repeated runs stay cheap.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::content::{
    ContentExtractor, PostGenerator, SourceInput, StyleParams,
};
use crate::models::{Draft, SourceRef};
use crate::scheduler::{ScheduleOptions, Scheduler};
use crate::storage::DraftRepository;
use crate::utils::clock::SharedClock;

/// Behavior knobs for an automation run
#[derive(Debug, Clone)]
pub struct AutomationSettings {
    /// Source URLs (or file paths) to check each run
    pub sources: Vec<String>,
    pub style: StyleParams,
    /// Calendar days kept between automatically booked posts
    pub min_days_between_posts: u32,
    /// Sources checked within this interval are skipped
    pub check_interval: Duration,
    /// Hour of day (UTC) for automatically booked slots
    pub posting_hour: u32,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            style: StyleParams::default(),
            min_days_between_posts: 1,
            check_interval: Duration::hours(24),
            posting_hour: 9,
        }
    }
}

/// Per-source outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Scheduled {
        source: String,
        draft_id: uuid::Uuid,
        target_at: DateTime<Utc>,
    },
    Skipped {
        source: String,
        last_checked: DateTime<Utc>,
    },
    Failed {
        source: String,
        reason: String,
    },
}

/// Summary of one automation run
#[derive(Debug, Clone)]
pub struct AutomationReport {
    pub total_sources: usize,
    pub scheduled: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<SourceOutcome>,
    pub finished_at: DateTime<Utc>,
}

/// Drives extract-generate-schedule cycles over configured sources
pub struct AutomationManager {
    extractor: Arc<dyn ContentExtractor>,
    generator: Arc<dyn PostGenerator>,
    scheduler: Arc<Scheduler>,
    drafts: Arc<dyn DraftRepository>,
    settings: AutomationSettings,
    clock: SharedClock,
}

impl AutomationManager {
    pub fn new(
        extractor: Arc<dyn ContentExtractor>,
        generator: Arc<dyn PostGenerator>,
        scheduler: Arc<Scheduler>,
        drafts: Arc<dyn DraftRepository>,
        settings: AutomationSettings,
        clock: SharedClock,
    ) -> Self {
        Self {
            extractor,
            generator,
            scheduler,
            drafts,
            settings,
            clock,
        }
    }

    /// Execute one automation cycle
    ///
    /// With `force` set, the per-source check interval is ignored and
    /// every configured source is processed.
    pub async fn run(&self, force: bool) -> AutomationReport {
        info!(
            sources = self.settings.sources.len(),
            force, "starting automation run"
        );

        let mut outcomes = Vec::with_capacity(self.settings.sources.len());

        for source in &self.settings.sources {
            let outcome = self.process_source(source, force).await;
            match &outcome {
                SourceOutcome::Scheduled {
                    draft_id,
                    target_at,
                    ..
                } => {
                    info!(source, draft_id = %draft_id, target_at = %target_at, "source scheduled");
                }
                SourceOutcome::Skipped { .. } => {
                    info!(source, "source checked recently, skipping");
                }
                SourceOutcome::Failed { reason, .. } => {
                    error!(source, reason, "source processing failed");
                }
            }
            outcomes.push(outcome);
        }

        let report = AutomationReport {
            total_sources: self.settings.sources.len(),
            scheduled: outcomes
                .iter()
                .filter(|o| matches!(o, SourceOutcome::Scheduled { .. }))
                .count(),
            skipped: outcomes
                .iter()
                .filter(|o| matches!(o, SourceOutcome::Skipped { .. }))
                .count(),
            failed: outcomes
                .iter()
                .filter(|o| matches!(o, SourceOutcome::Failed { .. }))
                .count(),
            outcomes,
            finished_at: self.clock.now(),
        };

        info!(
            scheduled = report.scheduled,
            skipped = report.skipped,
            failed = report.failed,
            "automation run finished"
        );

        report
    }

    async fn process_source(&self, source: &str, force: bool) -> SourceOutcome {
        let now = self.clock.now();

        if !force {
            match self.drafts.last_draft_from_source(source).await {
                Ok(Some(last_checked)) if now - last_checked < self.settings.check_interval => {
                    return SourceOutcome::Skipped {
                        source: source.to_string(),
                        last_checked,
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    return SourceOutcome::Failed {
                        source: source.to_string(),
                        reason: format!("dedup lookup failed: {}", e),
                    };
                }
            }
        }

        match self.extract_generate_schedule(source, now).await {
            Ok((draft_id, target_at)) => SourceOutcome::Scheduled {
                source: source.to_string(),
                draft_id,
                target_at,
            },
            Err(reason) => SourceOutcome::Failed {
                source: source.to_string(),
                reason,
            },
        }
    }

    async fn extract_generate_schedule(
        &self,
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<(uuid::Uuid, DateTime<Utc>), String> {
        let input = SourceInput::from_arg(source);
        let content = self
            .extractor
            .extract(&input)
            .await
            .map_err(|e| format!("extraction failed: {}", e))?;

        let posts = self
            .generator
            .generate(&[content.clone()], self.settings.style, None)
            .await
            .map_err(|e| format!("generation failed: {}", e))?;

        let Some(post) = posts.into_iter().next() else {
            return Err("generation returned no candidates".to_string());
        };

        let mut draft = Draft::new(post.content, now);
        draft.tone = post.tone;
        draft.post_type = post.post_type;
        draft.model_used = Some(post.model_used);
        draft.sources = vec![SourceRef {
            url: source.to_string(),
            title: content.title.clone(),
        }];
        draft.notes = Some(format!("Generated automatically from {}", source));

        self.drafts
            .insert_draft(&draft)
            .await
            .map_err(|e| format!("draft insert failed: {}", e))?;

        let target_at = self.next_open_slot().await.map_err(|e| e.to_string())?;

        // the slot finder already keeps the configured cadence, so the
        // scheduler's generic spacing check is bypassed here
        self.scheduler
            .schedule_one(
                draft.id,
                target_at,
                ScheduleOptions {
                    override_spacing: true,
                    replace_active: false,
                },
            )
            .await
            .map_err(|e| format!("scheduling failed: {}", e))?;

        Ok((draft.id, target_at))
    }

    /// Next bookable instant: the configured number of days after the
    /// latest active entry (or today, whichever is later), at the
    /// configured posting hour
    async fn next_open_slot(&self) -> crate::scheduler::SchedulerResult<DateTime<Utc>> {
        let now = self.clock.now();
        let instants = self.scheduler.active_instants().await?;

        let mut start_date = now.date_naive();
        if let Some(latest) = instants.last() {
            start_date = start_date.max(latest.date_naive());
        }

        let slot_date = start_date + Duration::days(self.settings.min_days_between_posts as i64);
        let slot = slot_date
            .and_hms_opt(self.settings.posting_hour, 0, 0)
            .unwrap_or_else(|| slot_date.and_hms_opt(9, 0, 0).expect("9:00 is a valid time"))
            .and_utc();

        if slot <= now {
            warn!(slot = %slot, "computed slot already passed, pushing one day");
            return Ok(slot + Duration::days(1));
        }

        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ExtractError, ExtractResult, ExtractedContent, GenerateResult, GeneratedPost};
    use crate::models::{PostTone, PostType};
    use crate::storage::{InMemoryStore, ScheduleRepository};
    use crate::utils::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StubExtractor {
        fail: bool,
    }

    #[async_trait]
    impl ContentExtractor for StubExtractor {
        async fn extract(&self, input: &SourceInput) -> ExtractResult<ExtractedContent> {
            if self.fail {
                return Err(ExtractError::UnreachableSource {
                    source_id: input.identifier(),
                    reason: "boom".to_string(),
                });
            }
            Ok(ExtractedContent {
                source: input.identifier(),
                title: Some("Stub Page".to_string()),
                text: "Stub body text for generation.".to_string(),
                content_hash: "hash".to_string(),
                extracted_at: Utc::now(),
            })
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl PostGenerator for StubGenerator {
        async fn generate(
            &self,
            _sources: &[ExtractedContent],
            style: StyleParams,
            _context: Option<&str>,
        ) -> GenerateResult<Vec<GeneratedPost>> {
            Ok(vec![GeneratedPost {
                content: "Generated post #stub".to_string(),
                tone: style.tone,
                post_type: style.post_type,
                model_used: "stub-model".to_string(),
                variant: 1,
                generated_at: Utc::now(),
            }])
        }
    }

    fn manager(
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        sources: Vec<String>,
        fail_extract: bool,
    ) -> AutomationManager {
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            Duration::hours(24),
        ));
        AutomationManager::new(
            Arc::new(StubExtractor { fail: fail_extract }),
            Arc::new(StubGenerator),
            scheduler,
            store,
            AutomationSettings {
                sources,
                style: StyleParams {
                    tone: PostTone::Professional,
                    post_type: PostType::NewsSharing,
                    variant_count: 1,
                },
                ..Default::default()
            },
            clock,
        )
    }

    fn monday_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_run_schedules_fresh_source() {
        let store = Arc::new(InMemoryStore::new());
        let clock = monday_clock();
        let mgr = manager(
            store.clone(),
            clock,
            vec!["https://example.com/blog".to_string()],
            false,
        );

        let report = mgr.run(false).await;
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.failed, 0);

        // the draft records its provenance
        let drafts = store.list_drafts(10).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].sources[0].url, "https://example.com/blog");

        // booked one day out at the posting hour
        match &report.outcomes[0] {
            SourceOutcome::Scheduled { target_at, .. } => {
                assert_eq!(
                    *target_at,
                    Utc.with_ymd_and_hms(2024, 6, 4, 9, 0, 0).unwrap()
                );
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recently_checked_source_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let clock = monday_clock();
        let mgr = manager(
            store.clone(),
            clock.clone(),
            vec!["https://example.com/blog".to_string()],
            false,
        );

        let first = mgr.run(false).await;
        assert_eq!(first.scheduled, 1);

        clock.advance(Duration::hours(2));
        let second = mgr.run(false).await;
        assert_eq!(second.skipped, 1);
        assert_eq!(second.scheduled, 0);
    }

    #[tokio::test]
    async fn test_force_overrides_check_interval() {
        let store = Arc::new(InMemoryStore::new());
        let clock = monday_clock();
        let mgr = manager(
            store.clone(),
            clock.clone(),
            vec!["https://example.com/blog".to_string()],
            false,
        );

        mgr.run(false).await;
        clock.advance(Duration::hours(1));

        let forced = mgr.run(true).await;
        assert_eq!(forced.scheduled, 1);
        assert_eq!(forced.skipped, 0);
    }

    #[tokio::test]
    async fn test_consecutive_slots_keep_cadence() {
        let store = Arc::new(InMemoryStore::new());
        let clock = monday_clock();
        let mgr = manager(
            store.clone(),
            clock,
            vec![
                "https://example.com/a".to_string(),
                "https://example.com/b".to_string(),
            ],
            false,
        );

        let report = mgr.run(false).await;
        assert_eq!(report.scheduled, 2);

        let instants = store.active_instants().await.unwrap();
        assert_eq!(
            instants,
            vec![
                Utc.with_ymd_and_hms(2024, 6, 4, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_reported_not_fatal() {
        let store = Arc::new(InMemoryStore::new());
        let clock = monday_clock();
        let mgr = manager(
            store,
            clock,
            vec!["https://example.com/broken".to_string()],
            true,
        );

        let report = mgr.run(false).await;
        assert_eq!(report.failed, 1);
        assert!(matches!(
            report.outcomes[0],
            SourceOutcome::Failed { .. }
        ));
    }
}
