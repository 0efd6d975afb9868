//! Uniform error taxonomy and HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type ClResult<T> = Result<T, Error>;

/// The single error type used across storage, maps, crdt and admin.
///
/// Variants correspond to the taxonomy kinds, not to concrete source
/// exceptions; external errors are folded into the closest kind via the
/// `From` impls below.
#[derive(Debug)]
pub enum Error {
	Invalid(String),
	TooLarge(String),
	NotFound(String),
	Conflict(String),
	Unauthorized,
	Forbidden,
	RateLimited,
	StorageUnavailable(String),
	Corruption(String),
	Timeout,
	Cancelled,
	Internal(String),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Invalid(m) => write!(f, "invalid: {m}"),
			Error::TooLarge(m) => write!(f, "too large: {m}"),
			Error::NotFound(m) => write!(f, "not found: {m}"),
			Error::Conflict(m) => write!(f, "conflict: {m}"),
			Error::Unauthorized => write!(f, "unauthorized"),
			Error::Forbidden => write!(f, "forbidden"),
			Error::RateLimited => write!(f, "rate limited"),
			Error::StorageUnavailable(m) => write!(f, "storage unavailable: {m}"),
			Error::Corruption(m) => write!(f, "corruption: {m}"),
			Error::Timeout => write!(f, "timeout"),
			Error::Cancelled => write!(f, "cancelled"),
			Error::Internal(m) => write!(f, "internal: {m}"),
		}
	}
}

impl std::error::Error for Error {}

#[derive(Serialize)]
struct ErrorDetails {
	code: &'static str,
	message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
	error: ErrorDetails,
}

impl Error {
	fn parts(&self) -> (StatusCode, &'static str, String) {
		match self {
			Error::Invalid(m) => (StatusCode::BAD_REQUEST, "E-MAP-INVALID", m.clone()),
			Error::TooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, "E-MAP-TOOLARGE", m.clone()),
			Error::NotFound(m) => (StatusCode::NOT_FOUND, "E-MAP-NOTFOUND", m.clone()),
			Error::Conflict(m) => (StatusCode::CONFLICT, "E-MAP-CONFLICT", m.clone()),
			Error::Unauthorized => (
				StatusCode::UNAUTHORIZED,
				"E-AUTH-UNAUTHORIZED",
				"unauthorized".into(),
			),
			Error::Forbidden => (
				StatusCode::FORBIDDEN,
				"E-AUTH-FORBIDDEN",
				"forbidden".into(),
			),
			Error::RateLimited => (
				StatusCode::TOO_MANY_REQUESTS,
				"E-RATE-LIMITED",
				"rate limit exceeded".into(),
			),
			Error::StorageUnavailable(m) => (
				StatusCode::SERVICE_UNAVAILABLE,
				"E-STORE-UNAVAILABLE",
				m.clone(),
			),
			Error::Corruption(m) => {
				(StatusCode::INTERNAL_SERVER_ERROR, "E-STORE-CORRUPT", m.clone())
			}
			Error::Timeout => (
				StatusCode::GATEWAY_TIMEOUT,
				"E-TIMEOUT",
				"deadline exceeded".into(),
			),
			Error::Cancelled => (
				StatusCode::INTERNAL_SERVER_ERROR,
				"E-CANCELLED",
				"operation cancelled".into(),
			),
			Error::Internal(m) => {
				tracing::error!(error = %m, "internal error");
				(StatusCode::INTERNAL_SERVER_ERROR, "E-INTERNAL", m.clone())
			}
		}
	}
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let (status, code, message) = self.parts();
		(status, Json(ErrorResponse { error: ErrorDetails { code, message } })).into_response()
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::StorageUnavailable(e.to_string())
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Invalid(e.to_string())
	}
}

impl From<sqlx::Error> for Error {
	fn from(e: sqlx::Error) -> Self {
		match e {
			sqlx::Error::RowNotFound => Error::NotFound("row not found".into()),
			other => {
				tracing::warn!(error = %other, "storage error");
				Error::StorageUnavailable(other.to_string())
			}
		}
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(e: tokio::task::JoinError) -> Self {
		Error::Internal(format!("task join failed: {e}"))
	}
}

// vim: ts=4
