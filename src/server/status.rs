//! Status endpoint and JSON response helper
//!
//! - `/v1/status` - always `{"status":"ok"}` while the process serves, for
//!   any method
//!
//! Anything else falls through to the router's default 404.

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::error;

/// Path of the status endpoint
pub const STATUS_PATH: &str = "/v1/status";

/// Body returned by the status endpoint
#[derive(Debug, Serialize)]
pub struct Status {
    pub status: &'static str,
}

/// Write a JSON response
///
/// `None` becomes 204 with an empty body, `Some` becomes 200 with the body
/// JSON-encoded. The content type is set either way.
pub fn respond_ok<T: Serialize>(body: Option<&T>) -> Response {
    let json = HeaderValue::from_static("application/json");

    let Some(body) = body else {
        return (StatusCode::NO_CONTENT, [(CONTENT_TYPE, json)]).into_response();
    };

    match serde_json::to_vec(body) {
        Ok(bytes) => (StatusCode::OK, [(CONTENT_TYPE, json)], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Status handler
///
/// Returns 200 OK for as long as the server accepts requests.
async fn status() -> Response {
    respond_ok(Some(&Status { status: "ok" }))
}

/// Build the route table
///
/// `write_timeout` bounds how long a request may take from dispatch to a
/// complete response; requests over it get 408.
pub fn build_router(write_timeout: Duration) -> Router {
    Router::new()
        .route(STATUS_PATH, any(status))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            write_timeout,
        ))
}
