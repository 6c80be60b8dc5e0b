//! HTTP tests for the event feed client against a mock upstream.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quad_cache::{RetryPolicy, UpstreamError};
use quad_events::{EventFeed, HttpEventFeed};

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn fetches_wrapped_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("feed_type", "simple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [
                {"id": "CAL-1", "summary": "Organ Recital", "start_timestamp": "2025-04-05T19:00:00Z"},
                {"id": "CAL-2", "summary": "Basketball", "start_timestamp": "2025-04-06T18:00:00Z"},
                {"summary": "record without id, dropped"},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let records = feed.fetch_events(None).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "CAL-1");
    assert_eq!(records[0].summary.as_deref(), Some("Organ Recital"));
}

#[tokio::test]
async fn fetches_bare_array_feed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"id": "CAL-1"}, {"id": "CAL-2"}])),
        )
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let records = feed.fetch_events(None).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn retries_transient_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "CAL-1"}])))
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let records = feed.fetch_events(None).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn surfaces_status_after_retry_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let err = feed.fetch_events(None).await.unwrap_err();
    assert_eq!(err, UpstreamError::Status { status: 500 });
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let err = feed.fetch_events(None).await.unwrap_err();
    assert_eq!(err, UpstreamError::Status { status: 404 });
}

#[tokio::test]
async fn malformed_body_is_invalid_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let feed = HttpEventFeed::new(server.uri(), fast_retry());
    let err = feed.fetch_events(None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::InvalidPayload(_)));
}
