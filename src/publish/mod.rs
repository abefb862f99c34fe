//! Publication transports
//!
//! The dispatch loop hands a finished post body to a
//! [`PublisherTransport`] and gets back either a receipt or a
//! classified error. Classification is what drives retry behavior:
//! network hiccups and rate limits are retryable, auth expiry and
//! content rejection are not.

pub mod linkedin;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PublicationReceipt;

pub use linkedin::{LinkedInTransport, Visibility};

// ============================================================
// Errors
// ============================================================

/// Classified publication failure
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("access token expired or rejected")]
    AuthExpired,

    #[error("rate limited by the platform (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("content rejected: {reason}")]
    ContentRejected { reason: String },

    #[error("network failure: {reason}")]
    Network { reason: String },
}

impl PublishError {
    /// Whether a later attempt with the same body could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

// ============================================================
// Transport contract
// ============================================================

/// Something that can push a post body to a social platform
#[async_trait]
pub trait PublisherTransport: Send + Sync {
    /// Publish `body` and return the platform's receipt
    async fn publish(&self, body: &str) -> Result<PublicationReceipt, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PublishError::Network {
            reason: "timeout".into()
        }
        .is_retryable());
        assert!(PublishError::RateLimited {
            retry_after_secs: Some(30)
        }
        .is_retryable());

        assert!(!PublishError::AuthExpired.is_retryable());
        assert!(!PublishError::ContentRejected {
            reason: "duplicate".into()
        }
        .is_retryable());
    }
}
