//! Common test utilities

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use waypost::models::{Draft, PublicationReceipt};
use waypost::publish::{PublishError, PublisherTransport};
use waypost::utils::clock::ManualClock;

/// Monday 2024-06-03 08:00 UTC, the anchor instant for deterministic tests
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
}

/// Manual clock frozen at [`monday_morning`]
pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(monday_morning()))
}

/// Create a test draft with default values
pub fn make_draft(content: &str, now: DateTime<Utc>) -> Draft {
    Draft::new(content, now)
}

/// Receipt returned by the mock transport on success
#[allow(dead_code)]
pub fn test_receipt(n: u32) -> PublicationReceipt {
    PublicationReceipt {
        post_id: format!("urn:li:share:{n}"),
        post_url: Some(format!(
            "https://www.linkedin.com/feed/update/urn:li:share:{n}"
        )),
    }
}

/// Transport that replays a scripted sequence of responses
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<PublicationReceipt, PublishError>>>,
    calls: Mutex<usize>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(responses: Vec<Result<PublicationReceipt, PublishError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(0),
        })
    }

    /// Transport that always succeeds with sequential receipts
    pub fn always_ok(count: u32) -> Arc<Self> {
        Self::new((1..=count).map(|n| Ok(test_receipt(n))).collect())
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PublisherTransport for MockTransport {
    async fn publish(&self, _body: &str) -> Result<PublicationReceipt, PublishError> {
        *self.calls.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(PublishError::Network {
                    reason: "mock transport script exhausted".into(),
                })
            })
    }
}
