// Core data structures for waypost

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::scheduler::lifecycle::EntryStatus;

/// Post tone requested from the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostTone {
    #[default]
    Professional,
    Friendly,
    Casual,
    Formal,
    Enthusiastic,
    Informative,
    Inspirational,
}

impl PostTone {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Friendly => "friendly",
            Self::Casual => "casual",
            Self::Formal => "formal",
            Self::Enthusiastic => "enthusiastic",
            Self::Informative => "informative",
            Self::Inspirational => "inspirational",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "professional" => Some(Self::Professional),
            "friendly" => Some(Self::Friendly),
            "casual" => Some(Self::Casual),
            "formal" => Some(Self::Formal),
            "enthusiastic" => Some(Self::Enthusiastic),
            "informative" => Some(Self::Informative),
            "inspirational" => Some(Self::Inspirational),
            _ => None,
        }
    }
}

/// Kind of LinkedIn post the generator should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    #[default]
    Informative,
    NewsSharing,
    ThoughtLeadership,
    CompanyUpdate,
    IndustryInsight,
    SuccessStory,
    TipsAndTricks,
}

impl PostType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informative => "informative",
            Self::NewsSharing => "news_sharing",
            Self::ThoughtLeadership => "thought_leadership",
            Self::CompanyUpdate => "company_update",
            Self::IndustryInsight => "industry_insight",
            Self::SuccessStory => "success_story",
            Self::TipsAndTricks => "tips_and_tricks",
        }
    }

    /// Create from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "informative" => Some(Self::Informative),
            "news_sharing" => Some(Self::NewsSharing),
            "thought_leadership" => Some(Self::ThoughtLeadership),
            "company_update" => Some(Self::CompanyUpdate),
            "industry_insight" => Some(Self::IndustryInsight),
            "success_story" => Some(Self::SuccessStory),
            "tips_and_tricks" => Some(Self::TipsAndTricks),
            _ => None,
        }
    }
}

/// Reference to the source material a draft was generated from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub url: String,
    pub title: Option<String>,
}

/// Unpublished candidate post plus its style metadata
///
/// Owned by the content-generation side; read-only to the scheduler
/// once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    pub content: String,
    pub tone: PostTone,
    pub post_type: PostType,
    pub hashtags: Vec<String>,
    pub sources: Vec<SourceRef>,
    pub model_used: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    /// Create a new draft with the given body
    pub fn new(content: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            tone: PostTone::default(),
            post_type: PostType::default(),
            hashtags: Vec::new(),
            sources: Vec::new(),
            model_used: None,
            notes: None,
            created_at,
        }
    }

    /// Body sent to the publisher: content plus any hashtags not
    /// already present in the text
    pub fn publish_body(&self) -> String {
        let inline = extract_hashtags(&self.content);
        let extra: Vec<&str> = self
            .hashtags
            .iter()
            .map(String::as_str)
            .filter(|tag| !inline.iter().any(|t| t == tag))
            .collect();

        if extra.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n\n{}", self.content.trim_end(), extra.join(" "))
        }
    }

    /// All hashtags for the draft: stored plus inline, deduplicated
    /// preserving order
    pub fn all_hashtags(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tag in self
            .hashtags
            .iter()
            .cloned()
            .chain(extract_hashtags(&self.content))
        {
            if !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        seen
    }
}

/// External identifier returned by the publisher on success
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationReceipt {
    pub post_id: String,
    pub post_url: Option<String>,
}

/// Binding of a draft to a future publish instant and its lifecycle status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub draft_id: Uuid,
    /// Target publish instant; doubles as the retry-due instant after a
    /// retryable failure
    pub target_at: DateTime<Utc>,
    pub status: EntryStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub receipt: Option<PublicationReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    /// Set while the entry is being dispatched; stale claims are reaped
    pub claimed_at: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    /// Create a new pending entry
    pub fn new(draft_id: Uuid, target_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            draft_id,
            target_at,
            status: EntryStatus::Pending,
            attempt_count: 0,
            last_error: None,
            receipt: None,
            created_at: now,
            updated_at: now,
            published_at: None,
            claimed_at: None,
        }
    }

    /// Whether the entry is due at the given instant
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EntryStatus::Pending && self.target_at <= now
    }
}

/// Extract `#hashtags` from text, deduplicated preserving order
pub fn extract_hashtags(text: &str) -> Vec<String> {
    static HASHTAG_RE: OnceLock<Regex> = OnceLock::new();

    let re = HASHTAG_RE.get_or_init(|| Regex::new(r"#\w+").expect("Invalid regex pattern"));

    let mut seen = Vec::new();
    for m in re.find_iter(text) {
        let tag = m.as_str().to_string();
        if !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

/// SHA-256 hex digest used to deduplicate extracted source content
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_tone_round_trip() {
        for tone in [
            PostTone::Professional,
            PostTone::Friendly,
            PostTone::Casual,
            PostTone::Formal,
            PostTone::Enthusiastic,
            PostTone::Informative,
            PostTone::Inspirational,
        ] {
            assert_eq!(PostTone::parse(tone.as_str()), Some(tone));
        }
        assert_eq!(PostTone::parse("sarcastic"), None);
    }

    #[test]
    fn test_post_type_round_trip() {
        assert_eq!(
            PostType::parse("thought_leadership"),
            Some(PostType::ThoughtLeadership)
        );
        assert_eq!(PostType::parse("haiku"), None);
    }

    #[test]
    fn test_extract_hashtags_dedup_preserves_order() {
        let tags = extract_hashtags("Big news! #rust #async #rust #tokio");
        assert_eq!(tags, vec!["#rust", "#async", "#tokio"]);
    }

    #[test]
    fn test_publish_body_appends_missing_hashtags() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut draft = Draft::new("Shipping day. #release", now);
        draft.hashtags = vec!["#release".to_string(), "#engineering".to_string()];

        let body = draft.publish_body();
        assert!(body.ends_with("#engineering"));
        // already inline, must not be duplicated
        assert_eq!(body.matches("#release").count(), 1);
    }

    #[test]
    fn test_publish_body_without_extra_hashtags() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let draft = Draft::new("Plain update", now);
        assert_eq!(draft.publish_body(), "Plain update");
    }

    #[test]
    fn test_entry_is_due() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let entry = ScheduleEntry::new(Uuid::new_v4(), now, now - chrono::Duration::hours(1));
        assert!(entry.is_due(now));
        assert!(!entry.is_due(now - chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }
}
