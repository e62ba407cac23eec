//! Shared-secret guard for the management API.
//!
//! Management requests carry the configured service token as `?key=...`.
//! Certificate authentication and the health check are mounted outside this
//! guard.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::debug;

use super::router::AppState;
use crate::Error;

/// Value of the `key` query parameter, if any.
fn query_key(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == "key")
        .map(|(_, value)| value.into_owned())
}

/// Constant-time comparison of the presented key with the service token.
#[must_use]
pub fn key_matches(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

/// Reject management requests without the right `?key=`.
pub async fn service_token_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let presented = query_key(request.uri().query()).unwrap_or_default();

    if key_matches(&presented, &state.service_token) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected management request");
        Error::Unauthorized("Wrong Credentials".to_string()).into_response()
    }
}
