//! Configuration management
//!
//! Settings load from environment variables (WAYPOST_ prefix) with a
//! TOML file as an alternative source. Every knob carries a sensible
//! default so `waypost` runs out of the box against a local SQLite
//! database.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::automation::AutomationSettings;
use crate::content::generator::GeneratorSettings;
use crate::content::StyleParams;
use crate::dispatch::RetryPolicy;
use crate::models::{PostTone, PostType};
use crate::publish::Visibility;
use crate::scheduler::HeuristicConfig;

fn env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub dispatch: DispatchConfig,
    pub linkedin: LinkedInConfig,
    pub generator: GeneratorConfig,
    pub automation: AutomationConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Scheduling heuristics and constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum hours between any two scheduled posts
    pub min_spacing_hours: u32,

    /// Hours of day (UTC) favored by the slot recommender
    pub posting_hours: Vec<u32>,

    /// Score multiplier applied to weekend slots
    pub weekend_weight: f64,
}

/// Dispatch loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks
    pub tick_interval_secs: u64,

    /// Per-publish timeout in seconds
    pub transport_timeout_secs: u64,

    /// Maximum publish attempts per entry
    pub max_attempts: u32,

    /// First retry delay in seconds
    pub retry_base_delay_secs: u64,

    /// Retry delay cap in seconds
    pub retry_max_delay_secs: u64,

    /// Minutes after which a claim is considered abandoned
    pub max_claim_age_mins: i64,
}

/// LinkedIn API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedInConfig {
    /// API base URL (override for testing)
    pub api_base: String,

    /// Member access token
    pub access_token: String,

    /// Author URN (urn:li:person:... or urn:li:organization:...)
    pub author_urn: String,

    /// Post audience (PUBLIC or CONNECTIONS)
    pub visibility: String,

    /// Minimum seconds between consecutive API posts
    pub min_post_gap_secs: u64,
}

/// Post generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// OpenAI-compatible endpoint base URL
    pub endpoint: String,

    /// API key
    pub api_key: String,

    /// Model name
    pub model: String,

    /// Base sampling temperature
    pub temperature: f32,

    /// Maximum completion tokens
    pub max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Automation run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Source URLs or file paths checked each run
    pub sources: Vec<String>,

    /// Default tone for generated posts
    pub tone: String,

    /// Default post type for generated posts
    pub post_type: String,

    /// Calendar days kept between automatically booked posts
    pub min_days_between_posts: u32,

    /// Hours before a source is re-checked
    pub check_interval_hours: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let posting_hours = std::env::var("WAYPOST_POSTING_HOURS")
            .ok()
            .map(|v| {
                v.split(',')
                    .filter_map(|h| h.trim().parse::<u32>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|hours| !hours.is_empty())
            .unwrap_or_else(|| vec![9, 10, 14, 15]);

        let sources = std::env::var("WAYPOST_AUTOMATION_SOURCES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            database: DatabaseConfig {
                sqlite_path: env_string("WAYPOST_SQLITE_PATH", "data/waypost.db").into(),
            },
            scheduler: SchedulerConfig {
                min_spacing_hours: env_var("WAYPOST_MIN_SPACING_HOURS", 24),
                posting_hours,
                weekend_weight: env_var("WAYPOST_WEEKEND_WEIGHT", 0.4),
            },
            dispatch: DispatchConfig {
                tick_interval_secs: env_var("WAYPOST_TICK_INTERVAL", 60),
                transport_timeout_secs: env_var("WAYPOST_TRANSPORT_TIMEOUT", 60),
                max_attempts: env_var("WAYPOST_MAX_ATTEMPTS", 3),
                retry_base_delay_secs: env_var("WAYPOST_RETRY_BASE_DELAY", 60),
                retry_max_delay_secs: env_var("WAYPOST_RETRY_MAX_DELAY", 3600),
                max_claim_age_mins: env_var("WAYPOST_MAX_CLAIM_AGE_MINS", 10),
            },
            linkedin: LinkedInConfig {
                api_base: env_string("WAYPOST_LINKEDIN_API_BASE", "https://api.linkedin.com"),
                access_token: env_string("LINKEDIN_ACCESS_TOKEN", ""),
                author_urn: env_string("LINKEDIN_AUTHOR_URN", ""),
                visibility: env_string("WAYPOST_LINKEDIN_VISIBILITY", "PUBLIC"),
                min_post_gap_secs: env_var("WAYPOST_MIN_POST_GAP", 30),
            },
            generator: GeneratorConfig {
                endpoint: env_string("WAYPOST_LLM_ENDPOINT", "https://api.openai.com"),
                api_key: std::env::var("OPENAI_API_KEY")
                    .or_else(|_| std::env::var("WAYPOST_LLM_API_KEY"))
                    .unwrap_or_default(),
                model: env_string("WAYPOST_LLM_MODEL", "gpt-4o-mini"),
                temperature: env_var("WAYPOST_LLM_TEMPERATURE", 0.7),
                max_tokens: env_var("WAYPOST_LLM_MAX_TOKENS", 1024),
                timeout_secs: env_var("WAYPOST_LLM_TIMEOUT", 60),
            },
            automation: AutomationConfig {
                sources,
                tone: env_string("WAYPOST_AUTOMATION_TONE", "professional"),
                post_type: env_string("WAYPOST_AUTOMATION_POST_TYPE", "news_sharing"),
                min_days_between_posts: env_var("WAYPOST_MIN_DAYS_BETWEEN_POSTS", 1),
                check_interval_hours: env_var("WAYPOST_CHECK_INTERVAL_HOURS", 24),
            },
            logging: LoggingConfig {
                level: env_string("WAYPOST_LOG_LEVEL", "info"),
                format: env_string("WAYPOST_LOG_FORMAT", "text"),
            },
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load from the given file if present, otherwise from environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.min_spacing_hours == 0 {
            anyhow::bail!("min_spacing_hours must be greater than 0");
        }

        if self.scheduler.posting_hours.is_empty() {
            anyhow::bail!("posting_hours must not be empty");
        }

        if self.scheduler.posting_hours.iter().any(|h| *h > 23) {
            anyhow::bail!("posting_hours must be between 0 and 23");
        }

        if self.dispatch.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if Visibility::parse(&self.linkedin.visibility).is_none() {
            anyhow::bail!(
                "linkedin visibility must be PUBLIC or CONNECTIONS, got '{}'",
                self.linkedin.visibility
            );
        }

        Ok(())
    }

    // --- derived views consumed by the components ---

    /// Minimum spacing as a chrono duration
    #[must_use]
    pub fn min_spacing(&self) -> chrono::Duration {
        chrono::Duration::hours(self.scheduler.min_spacing_hours as i64)
    }

    /// Slot-scoring heuristics derived from the posting hours
    #[must_use]
    pub fn heuristics(&self) -> HeuristicConfig {
        let mut rules = HeuristicConfig::from_posting_hours(&self.scheduler.posting_hours);
        rules.weekend_weight = self.scheduler.weekend_weight;
        rules
    }

    /// Retry policy for the dispatch loop
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delays(
            self.dispatch.max_attempts,
            Duration::from_secs(self.dispatch.retry_base_delay_secs),
            Duration::from_secs(self.dispatch.retry_max_delay_secs),
        )
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.tick_interval_secs)
    }

    #[must_use]
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.transport_timeout_secs)
    }

    #[must_use]
    pub fn max_claim_age(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.dispatch.max_claim_age_mins)
    }

    /// Generator settings for the chat-completion client
    #[must_use]
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            endpoint: self.generator.endpoint.clone(),
            api_key: self.generator.api_key.clone(),
            model: self.generator.model.clone(),
            temperature: self.generator.temperature,
            max_tokens: self.generator.max_tokens,
            timeout_secs: self.generator.timeout_secs,
        }
    }

    /// Automation settings with tone/type strings resolved
    pub fn automation_settings(&self) -> Result<AutomationSettings> {
        let tone = PostTone::parse(&self.automation.tone)
            .with_context(|| format!("unknown tone '{}'", self.automation.tone))?;
        let post_type = PostType::parse(&self.automation.post_type)
            .with_context(|| format!("unknown post type '{}'", self.automation.post_type))?;

        let posting_hour = self.scheduler.posting_hours.first().copied().unwrap_or(9);

        Ok(AutomationSettings {
            sources: self.automation.sources.clone(),
            style: StyleParams {
                tone,
                post_type,
                variant_count: 1,
            },
            min_days_between_posts: self.automation.min_days_between_posts,
            check_interval: chrono::Duration::hours(self.automation.check_interval_hours),
            posting_hour,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/waypost.db"),
            },
            scheduler: SchedulerConfig {
                min_spacing_hours: 24,
                posting_hours: vec![9, 10, 14, 15],
                weekend_weight: 0.4,
            },
            dispatch: DispatchConfig {
                tick_interval_secs: 60,
                transport_timeout_secs: 60,
                max_attempts: 3,
                retry_base_delay_secs: 60,
                retry_max_delay_secs: 3600,
                max_claim_age_mins: 10,
            },
            linkedin: LinkedInConfig {
                api_base: String::from("https://api.linkedin.com"),
                access_token: String::new(),
                author_urn: String::new(),
                visibility: String::from("PUBLIC"),
                min_post_gap_secs: 30,
            },
            generator: GeneratorConfig {
                endpoint: String::from("https://api.openai.com"),
                api_key: String::new(),
                model: String::from("gpt-4o-mini"),
                temperature: 0.7,
                max_tokens: 1024,
                timeout_secs: 60,
            },
            automation: AutomationConfig {
                sources: Vec::new(),
                tone: String::from("professional"),
                post_type: String::from("news_sharing"),
                min_days_between_posts: 1,
                check_interval_hours: 24,
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
