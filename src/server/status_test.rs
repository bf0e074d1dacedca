//! Tests for the status endpoint and response helper
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::status::*;
use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tower::ServiceExt;

async fn send(path: &str) -> axum::response::Response {
    build_router(Duration::from_secs(10))
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_status_returns_ok_json() {
    let response = send("/v1/status").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], br#"{"status":"ok"}"#);
}

#[tokio::test]
async fn test_unknown_path_returns_404() {
    let response = send("/v1/unknown").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send("/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_answers_any_method() {
    for method in ["POST", "PUT", "DELETE"] {
        let response = build_router(Duration::from_secs(10))
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/v1/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK, "{} /v1/status", method);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"ok"}"#);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_handler_hits_write_timeout() {
    let router = axum::Router::new()
        .route(
            "/slow",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "late"
            }),
        )
        .layer(tower_http::timeout::TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ));

    let response = router
        .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

#[tokio::test]
async fn test_respond_ok_without_body_is_204() {
    let response = respond_ok::<Status>(None);

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_respond_ok_encodes_arbitrary_body() {
    #[derive(Serialize)]
    struct Payload {
        name: &'static str,
        count: u32,
    }

    let response = respond_ok(Some(&Payload {
        name: "widget",
        count: 3,
    }));

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value, serde_json::json!({"name": "widget", "count": 3}));
}

#[tokio::test]
async fn test_respond_ok_reports_encoding_failure() {
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("nope"))
        }
    }

    let response = respond_ok(Some(&Unserializable));
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
