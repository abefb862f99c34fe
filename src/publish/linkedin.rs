//! LinkedIn UGC post transport
//!
//! Publishes text posts through the `/v2/ugcPosts` endpoint using a
//! member access token. HTTP statuses are folded into the classified
//! [`PublishError`] variants so the dispatch loop never inspects raw
//! responses. A local rate limiter paces consecutive posts to stay
//! clear of the platform's request budget.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{header, Client, Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use super::{PublishError, PublisherTransport};
use crate::models::PublicationReceipt;

const DEFAULT_API_BASE: &str = "https://api.linkedin.com";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Audience for a published post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Connections,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Connections => "CONNECTIONS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "PUBLIC" => Some(Self::Public),
            "CONNECTIONS" => Some(Self::Connections),
            _ => None,
        }
    }
}

/// Transport posting through the LinkedIn UGC API
pub struct LinkedInTransport {
    client: Client,
    api_base: String,
    access_token: String,
    author_urn: String,
    visibility: Visibility,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl LinkedInTransport {
    /// Create a transport for the production API
    pub fn new(
        access_token: String,
        author_urn: String,
        visibility: Visibility,
        min_post_gap: Duration,
    ) -> Result<Self, PublishError> {
        Self::with_api_base(
            DEFAULT_API_BASE.to_string(),
            access_token,
            author_urn,
            visibility,
            min_post_gap,
        )
    }

    /// Create a transport against a custom base URL (mock servers)
    pub fn with_api_base(
        api_base: String,
        access_token: String,
        author_urn: String,
        visibility: Visibility,
        min_post_gap: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PublishError::Network {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        let quota = Quota::with_period(min_post_gap)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).expect("1 is non-zero")));

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token,
            author_urn,
            visibility,
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    fn post_payload(&self, body: &str) -> serde_json::Value {
        json!({
            "author": self.author_urn,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": {
                    "shareCommentary": { "text": body },
                    "shareMediaCategory": "NONE"
                }
            },
            "visibility": {
                "com.linkedin.ugc.MemberNetworkVisibility": self.visibility.as_str()
            }
        })
    }

    async fn extract_receipt(response: Response) -> Result<PublicationReceipt, PublishError> {
        // the post URN arrives in the x-restli-id header; fall back to
        // the response body's id field
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let post_id = match header_id {
            Some(id) => id,
            None => {
                let parsed: serde_json::Value =
                    response.json().await.map_err(|e| PublishError::Network {
                        reason: format!("unreadable publish response: {}", e),
                    })?;
                parsed
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| PublishError::Network {
                        reason: "publish response carried no post id".to_string(),
                    })?
            }
        };

        let post_url = Some(format!("https://www.linkedin.com/feed/update/{}", post_id));
        Ok(PublicationReceipt { post_id, post_url })
    }
}

/// Map a non-success status to a classified error
pub(crate) fn status_to_error(
    status: StatusCode,
    retry_after_secs: Option<u64>,
    body: &str,
) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::AuthExpired,
        StatusCode::TOO_MANY_REQUESTS => PublishError::RateLimited { retry_after_secs },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PublishError::ContentRejected {
                reason: summarize_body(body),
            }
        }
        other => PublishError::Network {
            reason: format!("unexpected status {}: {}", other, summarize_body(body)),
        },
    }
}

fn summarize_body(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

    let text = message.unwrap_or_else(|| body.trim().to_string());
    crate::utils::truncate_text(&text, 200)
}

#[async_trait::async_trait]
impl PublisherTransport for LinkedInTransport {
    async fn publish(&self, body: &str) -> Result<PublicationReceipt, PublishError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v2/ugcPosts", self.api_base);
        debug!(url = %url, "publishing post");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("X-Restli-Protocol-Version", RESTLI_PROTOCOL_VERSION)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&self.post_payload(body))
            .send()
            .await
            .map_err(|e| PublishError::Network {
                reason: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return Self::extract_receipt(response).await;
        }

        let retry_after_secs = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let error_body = response.text().await.unwrap_or_default();

        warn!(status = %status, "publish rejected");
        Err(status_to_error(status, retry_after_secs, &error_body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_to_error(StatusCode::UNAUTHORIZED, None, ""),
            PublishError::AuthExpired
        ));
        assert!(matches!(
            status_to_error(StatusCode::FORBIDDEN, None, ""),
            PublishError::AuthExpired
        ));
        assert!(matches!(
            status_to_error(StatusCode::TOO_MANY_REQUESTS, Some(30), ""),
            PublishError::RateLimited {
                retry_after_secs: Some(30)
            }
        ));
        assert!(matches!(
            status_to_error(StatusCode::UNPROCESSABLE_ENTITY, None, "dup"),
            PublishError::ContentRejected { .. }
        ));
        assert!(matches!(
            status_to_error(StatusCode::INTERNAL_SERVER_ERROR, None, ""),
            PublishError::Network { .. }
        ));
    }

    #[test]
    fn test_rejection_reason_prefers_api_message() {
        let error = status_to_error(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"message":"Duplicate post detected","status":400}"#,
        );
        match error {
            PublishError::ContentRejected { reason } => {
                assert_eq!(reason, "Duplicate post detected")
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_visibility_round_trip() {
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(
            Visibility::parse("CONNECTIONS"),
            Some(Visibility::Connections)
        );
        assert_eq!(Visibility::parse("friends"), None);
    }

    #[tokio::test]
    async fn test_publish_reads_restli_id_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/ugcPosts")
            .match_header("authorization", "Bearer token-123")
            .with_status(201)
            .with_header("x-restli-id", "urn:li:share:42")
            .create_async()
            .await;

        let transport = LinkedInTransport::with_api_base(
            server.url(),
            "token-123".to_string(),
            "urn:li:person:abc".to_string(),
            Visibility::Public,
            Duration::from_millis(1),
        )
        .unwrap();

        let receipt = transport.publish("hello").await.unwrap();
        assert_eq!(receipt.post_id, "urn:li:share:42");
        assert_eq!(
            receipt.post_url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:42")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_publish_classifies_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v2/ugcPosts")
            .with_status(401)
            .with_body(r#"{"message":"Expired access token"}"#)
            .create_async()
            .await;

        let transport = LinkedInTransport::with_api_base(
            server.url(),
            "stale".to_string(),
            "urn:li:person:abc".to_string(),
            Visibility::Public,
            Duration::from_millis(1),
        )
        .unwrap();

        let error = transport.publish("hello").await.unwrap_err();
        assert!(matches!(error, PublishError::AuthExpired));
        assert!(!error.is_retryable());
    }
}
