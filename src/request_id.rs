//! Request correlation id (§10): every request is tagged with a `req_id`,
//! echoed back in the `x-request-id` response header and attached to the
//! request's tracing span so every log line emitted while handling it --
//! including `Internal` error logs -- carries the same id.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Reads `x-request-id` off the incoming request if the caller supplied one
/// (so a request can be traced across services), otherwise mints a new one.
pub async fn attach_request_id(req: Request<Body>, next: Next) -> Response {
	let req_id = req
		.headers()
		.get(&REQUEST_ID_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(str::to_string)
		.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

	let span = tracing::info_span!("request", req_id = %req_id);
	let mut response = tracing::Instrument::instrument(next.run(req), span).await;

	if let Ok(value) = HeaderValue::from_str(&req_id) {
		response.headers_mut().insert(REQUEST_ID_HEADER, value);
	}
	response
}

// vim: ts=4
