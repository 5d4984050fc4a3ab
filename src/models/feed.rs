use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Announcement of one prompt about to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    pub concurrent_requests: usize,
    pub prompt: String,
    pub steps: u32,
    pub timestamp: DateTime<Utc>,
}

impl FeedEvent {
    pub fn new(prompt: impl Into<String>, steps: u32, concurrent_requests: usize) -> Self {
        Self {
            concurrent_requests,
            prompt: prompt.into(),
            steps,
            timestamp: Utc::now(),
        }
    }
}
