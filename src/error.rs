//! Unified error handling for the waypost crate
//!
//! Consolidates the domain-specific errors into a single [`Error`] enum
//! for callers that cross module boundaries, while each module keeps
//! its own error type for precise matching.
//!
//! - [`WaypostErrorTrait`] - common interface implemented by error types
//! - [`ErrorCategory`] - classification for handling strategies
//! - [`Error`] - unified enum wrapping the domain errors

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::content::extractor::ExtractError;
pub use crate::content::generator::GenerateError;
pub use crate::publish::PublishError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::repository::StorageError;

/// Common trait for waypost error types
pub trait WaypostErrorTrait: std::error::Error {
    /// Whether a retry of the failed operation could succeed
    fn is_recoverable(&self) -> bool;

    /// Category used to pick a handling strategy
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Content extraction and parsing errors
    Extraction,
    /// Storage and I/O errors
    Storage,
    /// Model/generation errors
    Generation,
    /// Publication transport errors
    Publishing,
    /// Configuration and validation errors
    Config,
    /// Scheduling and lifecycle errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the waypost crate
#[derive(Error, Debug)]
pub enum Error {
    /// Scheduling and lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Repository errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Content extraction errors
    #[error("Extract error: {0}")]
    Extract(#[from] ExtractError),

    /// Post generation errors
    #[error("Generate error: {0}")]
    Generate(#[from] GenerateError),

    /// Publication transport errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl WaypostErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Storage(_) => false,
            Self::Extract(e) => matches!(e, ExtractError::UnreachableSource { .. }),
            Self::Generate(e) => {
                matches!(
                    e,
                    GenerateError::ProviderUnavailable(_) | GenerateError::RateLimited
                )
            }
            Self::Publish(e) => e.is_retryable(),
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Http(_) => true,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Scheduler(SchedulerError::Storage(_)) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Storage(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Extract(_) => ErrorCategory::Extraction,
            Self::Generate(_) => ErrorCategory::Generation,
            Self::Publish(PublishError::Network { .. }) => ErrorCategory::Network,
            Self::Publish(_) => ErrorCategory::Publishing,
            Self::Json(_) => ErrorCategory::Extraction,
            Self::Http(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_error_category() {
        let publish = Error::Publish(PublishError::Network {
            reason: "reset".into(),
        });
        assert_eq!(publish.category(), ErrorCategory::Network);

        let rejected = Error::Publish(PublishError::ContentRejected {
            reason: "dup".into(),
        });
        assert_eq!(rejected.category(), ErrorCategory::Publishing);

        let scheduler = Error::Scheduler(SchedulerError::InvalidInstant {
            target: Utc::now(),
            now: Utc::now(),
        });
        assert_eq!(scheduler.category(), ErrorCategory::Scheduler);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::Publish(PublishError::RateLimited {
            retry_after_secs: None
        })
        .is_recoverable());
        assert!(!Error::Publish(PublishError::AuthExpired).is_recoverable());
        assert!(!Error::Generate(GenerateError::InvalidStyleParams("x".into())).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let extract = ExtractError::EmptyContent("pasted_text".into());
        let unified: Error = extract.into();
        assert!(matches!(unified, Error::Extract(_)));
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing access token");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }
}
