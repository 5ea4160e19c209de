//! Crate-wide error taxonomy.
//!
//! Repository and component functions return `HaResult<T>`; the HTTP
//! layer maps each variant to a status code per spec §7.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("crawl failed: {0}")]
    CrawlFailure(String),

    #[error("extraction warning: {0}")]
    ExtractionWarning(String),

    #[error("indexing error: {0}")]
    Indexing(String),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type HaResult<T> = Result<T, HaError>;

impl HaError {
    /// True when `errno` matches a stale-mount / transport-endpoint signature.
    ///
    /// Linux reports `ENOTCONN` (107) for "Transport endpoint is not
    /// connected" on a dropped FUSE/NFS mount; `ESTALE` (116) on a stale
    /// NFS handle. Both are retryable infra conditions, never crawl
    /// failures.
    pub fn is_stale_mount_errno(errno: i32) -> bool {
        matches!(errno, 107 | 116)
    }

    pub fn from_io_classified(context: &str, err: &io::Error) -> HaError {
        if let Some(errno) = err.raw_os_error() {
            if HaError::is_stale_mount_errno(errno) {
                return HaError::StorageUnavailable(format!("{context}: {err}"));
            }
        }
        HaError::Backend(format!("{context}: {err}"))
    }
}

impl From<diesel::result::Error> for HaError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => HaError::NotFound("row not found".to_string()),
            other => HaError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for HaError {
    fn from(err: serde_json::Error) -> Self {
        HaError::Validation(format!("invalid json: {err}"))
    }
}

impl From<io::Error> for HaError {
    fn from(err: io::Error) -> Self {
        HaError::from_io_classified("io", &err)
    }
}

/// HTTP mapping (spec §7 "propagation policy" / SPEC_FULL.md §B):
/// `Validation -> 422`, `NotFound -> 404`, `StorageUnavailable -> 503`
/// (raw-snapshot reads are the case spec §7 calls out by name, but the
/// mapping is the same wherever else a handler surfaces the variant),
/// everything else -> 500.
impl IntoResponse for HaError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            HaError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            HaError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            HaError::StorageUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            HaError::CrawlFailure(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            HaError::ExtractionWarning(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            HaError::Indexing(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            HaError::Backend(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_stale_mount_errno() {
        assert!(HaError::is_stale_mount_errno(107));
        assert!(HaError::is_stale_mount_errno(116));
        assert!(!HaError::is_stale_mount_errno(2));
    }

    #[test]
    fn not_found_maps_from_diesel() {
        let e: HaError = diesel::result::Error::NotFound.into();
        assert!(matches!(e, HaError::NotFound(_)));
    }

    #[test]
    fn status_codes_match_propagation_policy() {
        assert_eq!(
            HaError::Validation("x".into()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(HaError::NotFound("x".into()).into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            HaError::StorageUnavailable("x".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HaError::Backend("x".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
