//! Event feed upstream contract and HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use quad_cache::{RetryPolicy, UpstreamError};

use crate::types::{DateWindow, EventRecord};

/// Days of lookahead requested when the caller gives no window.
const DEFAULT_FUTURE_DAYS: i64 = 90;

/// Contract the upstream events feed must satisfy. The fetch is
/// all-or-nothing; no partial-page streaming is assumed.
#[async_trait]
pub trait EventFeed: Send + Sync {
    async fn fetch_events(
        &self,
        window: Option<DateWindow>,
    ) -> Result<Vec<EventRecord>, UpstreamError>;
}

/// The feed answers either with a wrapped object or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedPayload {
    Wrapped { events: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

impl FeedPayload {
    fn into_records(self) -> Vec<EventRecord> {
        let raw = match self {
            FeedPayload::Wrapped { events } => events,
            FeedPayload::Bare(events) => events,
        };
        let total = raw.len();
        let mut records = Vec::with_capacity(total);
        for value in raw {
            match serde_json::from_value::<EventRecord>(value) {
                Ok(record) if !record.id.is_empty() => records.push(record),
                Ok(_) => {}
                Err(err) => debug!(error = %err, "dropping malformed feed record"),
            }
        }
        let dropped = total - records.len();
        if dropped > 0 {
            warn!(dropped, "dropped feed records without usable ids");
        }
        records
    }
}

/// HTTP client for the campus events feed.
pub struct HttpEventFeed {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpEventFeed {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            retry,
        }
    }
}

#[async_trait]
impl EventFeed for HttpEventFeed {
    async fn fetch_events(
        &self,
        window: Option<DateWindow>,
    ) -> Result<Vec<EventRecord>, UpstreamError> {
        let future_days = window
            .map(|w| (w.end - Utc::now().date_naive()).num_days().max(0))
            .unwrap_or(DEFAULT_FUTURE_DAYS)
            .to_string();

        self.retry
            .run("event feed", || {
                let future_days = future_days.as_str();
                async move {
                    let response = self
                        .http
                        .get(&self.base_url)
                        .query(&[("future_days", future_days), ("feed_type", "simple")])
                        .send()
                        .await?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(UpstreamError::Status {
                            status: status.as_u16(),
                        });
                    }

                    let payload: FeedPayload = response
                        .json()
                        .await
                        .map_err(|err| UpstreamError::InvalidPayload(err.to_string()))?;
                    let records = payload.into_records();
                    debug!(count = records.len(), "fetched event feed");
                    Ok(records)
                }
            })
            .await
    }
}
