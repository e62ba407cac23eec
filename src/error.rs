//! Error types for the authentication gateway

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// The API variants carry the exact message returned to the caller. They are
/// built where the problem is detected and translated into a response only at
/// the HTTP boundary (see the [`IntoResponse`] impl).
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input or missing client certificate
    #[error("{0}")]
    BadRequest(String),

    /// Wrong management credentials
    #[error("{0}")]
    Unauthorized(String),

    /// Credential rejected (expired, revoked, no CRL distribution points)
    #[error("{0}")]
    Forbidden(String),

    /// Referenced resource does not exist
    #[error("{0} was not found")]
    NotFound(String),

    /// Creation collides with an existing unique record
    #[error("{0}")]
    Conflict(String),

    /// Structurally valid but semantically invalid input
    #[error("{0}")]
    Unprocessable(String),

    /// Configuration inconsistency or misbehaving downstream service
    #[error("Internal Error: {0}")]
    Internal(String),

    /// Datastore inconsistency (duplicated unique records)
    #[error("Database Error: {0}")]
    Database(String),

    /// A CRL distribution point could not be fetched or decoded
    #[error("Could not access CRL {0}")]
    CrlUnreachable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build a "Poorly formatted JSON" bad request error
    pub fn malformed_json(detail: impl std::fmt::Display) -> Self {
        Self::BadRequest(format!("Poorly formatted JSON. {detail}"))
    }

    /// Build a conflict error for a unique field collision
    pub fn conflict(resource: &str, field: &str, value: &str) -> Self {
        Self::Conflict(format!("{resource} object with {field}: {value} already exists"))
    }

    /// Build an "is not yet supported" error
    pub fn unsupported(place: &str, content: &str) -> Self {
        Self::Unprocessable(format!("{place}: {content} is not yet supported"))
    }

    /// Build an empty-required-field error
    pub fn empty_field(resource: &str, field: &str) -> Self {
        Self::Unprocessable(format!(
            "{resource} object contains empty fields. empty value for field: {field}"
        ))
    }

    /// Build an invalid-field-content error
    pub fn invalid_field(field: &str, detail: &str) -> Self {
        Self::Unprocessable(format!("Field: {field} contains invalid data. {detail}"))
    }

    /// HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::CrlUnreachable(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status text mirrored in the error body
    #[must_use]
    pub fn status_text(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "BAD REQUEST",
            StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
            StatusCode::FORBIDDEN => "ACCESS_FORBIDDEN",
            StatusCode::NOT_FOUND => "NOT FOUND",
            StatusCode::CONFLICT => "CONFLICT",
            StatusCode::UNPROCESSABLE_ENTITY => "UNPROCESSABLE ENTITY",
            _ => "INTERNAL SERVER ERROR",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "code": status.as_u16(),
                "status": self.status_text(),
            }
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_resource() {
        let err = Error::NotFound("Binding".to_string());
        assert_eq!(err.to_string(), "Binding was not found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.status_text(), "NOT FOUND");
    }

    #[test]
    fn crl_unreachable_is_forbidden() {
        let err = Error::CrlUnreachable("http://crl.example.org/ca.crl".to_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.status_text(), "ACCESS_FORBIDDEN");
        assert_eq!(
            err.to_string(),
            "Could not access CRL http://crl.example.org/ca.crl"
        );
    }

    #[test]
    fn infrastructure_errors_map_to_internal() {
        let err = Error::Config("bad".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.status_text(), "INTERNAL SERVER ERROR");
    }

    #[test]
    fn helper_constructors_format_messages() {
        assert_eq!(
            Error::conflict("binding", "name", "b1").to_string(),
            "binding object with name: b1 already exists"
        );
        assert_eq!(
            Error::unsupported("Auth type", "x509").to_string(),
            "Auth type: x509 is not yet supported"
        );
        assert_eq!(
            Error::malformed_json("EOF").to_string(),
            "Poorly formatted JSON. EOF"
        );
        assert_eq!(
            Error::Internal("boom".to_string()).to_string(),
            "Internal Error: boom"
        );
    }

    #[tokio::test]
    async fn into_response_mirrors_status_in_body() {
        // GIVEN: a forbidden error
        let err = Error::Forbidden("Your certificate has been revoked".to_string());
        // WHEN: converting to a response
        let response = err.into_response();
        // THEN: header status and body agree
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], 403);
        assert_eq!(body["error"]["status"], "ACCESS_FORBIDDEN");
        assert_eq!(body["error"]["message"], "Your certificate has been revoked");
    }
}
