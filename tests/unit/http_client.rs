//! Unit tests for AtlasHttpClient

use httpmock::prelude::*;
use reqwest::Client;
use rtt_harvester::fetcher::http::AtlasHttpClient;
use rtt_harvester::fetcher::{AtlasConfig, FetcherError};
use rtt_harvester::harvester::RateLimiter;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::request_based(100, Duration::from_secs(1)))
}

#[tokio::test]
async fn test_api_key_is_sent_as_query_parameter() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v2/anchors/")
                .query_param("key", "secret")
                .query_param("page_size", "10");
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    let http = AtlasHttpClient::new(Client::new(), limiter(), Some("secret".to_string()));
    let body: Value = http
        .get_url(
            &server.url("/api/v2/anchors/"),
            &[("page_size", "10".to_string())],
        )
        .await
        .unwrap();

    assert_eq!(body, json!({"ok": true}));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_from_config_applies_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow/");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!([]));
        })
        .await;

    let config = AtlasConfig {
        request_timeout: Some(Duration::from_millis(50)),
        ..AtlasConfig::with_base_url(server.base_url())
    };
    let http = AtlasHttpClient::from_config(&config, limiter()).unwrap();
    let result: Result<Vec<Value>, _> = http.get_url(&server.url("/slow/"), &[]).await;

    assert!(matches!(result, Err(FetcherError::Network(_))));
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let http = AtlasHttpClient::new(Client::new(), limiter(), None);
    let result: Result<Value, _> = http.get_url("http://127.0.0.1:1/api/v2/anchors/", &[]).await;

    let err = result.unwrap_err();
    assert!(matches!(err, FetcherError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_not_found_carries_status_and_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v2/measurements/9/results/");
            then.status(404).body(r#"{"detail": "Not found."}"#);
        })
        .await;

    let http = AtlasHttpClient::new(Client::new(), limiter(), None);
    let url = server.url("/api/v2/measurements/9/results/");
    let result: Result<Value, _> = http.get_url(&url, &[]).await;

    match result {
        Err(FetcherError::HttpStatus { status, url: failed, body }) => {
            assert_eq!(status, 404);
            assert_eq!(failed, url);
            assert!(body.contains("Not found"));
        }
        other => panic!("expected HTTP status error, got {other:?}"),
    }
}
