//! Error types for the document store

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::models::LinkDenial;

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Message shared by every permission failure so that a caller cannot tell
/// a missing document from one it may not see.
pub const GENERIC_NOT_FOUND: &str = "Document not found";

/// Document store error types
#[derive(Debug, Error)]
pub enum VaultError {
    /// Document, share, link or revision absent
    #[error("{}", GENERIC_NOT_FOUND)]
    NotFound,

    /// Exists, but the requester lacks the level for this operation
    #[error("{}", GENERIC_NOT_FOUND)]
    Denied,

    #[error("Share link has been revoked")]
    LinkRevoked,

    #[error("Share link has expired")]
    LinkExpired,

    #[error("Share link has reached its maximum number of uses")]
    LinkUseLimitReached,

    #[error("Version conflict: expected {expected}, current {current}")]
    Conflict { expected: i64, current: i64 },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid file name: {name}")]
    InvalidFileName { name: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        VaultError::Database(err.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

impl From<LinkDenial> for VaultError {
    fn from(denial: LinkDenial) -> Self {
        match denial {
            LinkDenial::NotFound => VaultError::NotFound,
            LinkDenial::Revoked => VaultError::LinkRevoked,
            LinkDenial::Expired => VaultError::LinkExpired,
            LinkDenial::UseLimitReached => VaultError::LinkUseLimitReached,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl VaultError {
    /// Convert to API error code
    pub fn code(&self) -> &'static str {
        match self {
            // Never distinguish these two
            VaultError::NotFound | VaultError::Denied => "DOCUMENT_NOT_FOUND",
            VaultError::LinkRevoked => "LINK_REVOKED",
            VaultError::LinkExpired => "LINK_EXPIRED",
            VaultError::LinkUseLimitReached => "LINK_USE_LIMIT_REACHED",
            VaultError::Conflict { .. } => "VERSION_CONFLICT",
            VaultError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            VaultError::InvalidFileName { .. } => "INVALID_FILE_NAME",
            VaultError::Validation(_) => "VALIDATION_ERROR",
            VaultError::Database(_) => "DATABASE_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Serialization(_) => "SERIALIZATION_ERROR",
            VaultError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            VaultError::NotFound | VaultError::Denied => StatusCode::NOT_FOUND,

            VaultError::LinkRevoked
            | VaultError::LinkExpired
            | VaultError::LinkUseLimitReached => StatusCode::GONE,

            VaultError::Conflict { .. } => StatusCode::CONFLICT,

            VaultError::InvalidFileName { .. } | VaultError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }

            VaultError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

            VaultError::Database(_)
            | VaultError::Io(_)
            | VaultError::Serialization(_)
            | VaultError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error is one of the access failures that must render
    /// identically to a missing document.
    pub fn is_concealed(&self) -> bool {
        matches!(self, VaultError::NotFound | VaultError::Denied)
    }
}

impl IntoResponse for VaultError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiError {
            code: self.code().to_string(),
            message: self.to_string(),
            details: None,
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_is_indistinguishable_from_not_found() {
        let missing = VaultError::NotFound;
        let denied = VaultError::Denied;

        assert_eq!(missing.code(), denied.code());
        assert_eq!(missing.status_code(), denied.status_code());
        assert_eq!(missing.to_string(), denied.to_string());
        assert!(missing.is_concealed() && denied.is_concealed());
    }

    #[test]
    fn test_link_denials_keep_their_reason() {
        assert_eq!(VaultError::from(LinkDenial::Expired).code(), "LINK_EXPIRED");
        assert_eq!(VaultError::from(LinkDenial::Revoked).code(), "LINK_REVOKED");
        assert_eq!(
            VaultError::from(LinkDenial::UseLimitReached).code(),
            "LINK_USE_LIMIT_REACHED"
        );
        assert!(VaultError::from(LinkDenial::NotFound).is_concealed());
        assert_eq!(VaultError::LinkExpired.status_code(), StatusCode::GONE);
    }

    #[test]
    fn test_conflict_status() {
        let err = VaultError::Conflict {
            expected: 2,
            current: 3,
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_into_response_uses_generic_status_for_denied() {
        let response = VaultError::Denied.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
