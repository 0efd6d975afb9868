//! HTTP + WebSocket surface (§6): a thin adapter over the Map Repository,
//! Document Registry and Session Hub.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::error::{ClResult, Error};
use crate::maps::{MapFull, MapSummary, MapWriteResult};
use crate::ratelimit::{RateLimitLayer, RateLimitManager};
use crate::request_id::attach_request_id;

pub fn build_router(app: App) -> Router {
	let mut router = Router::new()
		.route("/health", get(health))
		.route("/ready", get(ready));

	if app.config.feature_maps_api {
		router = router
			.route("/maps", get(list_maps).post(create_map))
			.route("/maps/{id}", get(get_map).put(update_map).delete(delete_map));
	}

	// §6: the live WebSocket channel is only meaningful under the `crdt`
	// data provider; `json` serves snapshots only, so it has nothing to sync.
	if app.config.server_sync && app.config.data_provider == crate::config::DataProvider::Crdt {
		router = router.route("/sync/{map_id}", get(sync_ws));
	}

	let cors = if app.config.cors_origin == "*" {
		CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
	} else {
		let origin = app
			.config
			.cors_origin
			.parse::<HeaderValue>()
			.unwrap_or_else(|_| HeaderValue::from_static("null"));
		CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any)
	};

	let rate_limiter = Arc::new(RateLimitManager::new(50, 100));

	router
		.layer(RateLimitLayer::new(rate_limiter))
		.layer(CompressionLayer::new())
		.layer(cors)
		.layer(axum::middleware::from_fn(attach_request_id))
		.with_state(app)
}

#[derive(Serialize)]
struct Liveness {
	status: &'static str,
}

async fn health() -> impl IntoResponse {
	Json(Liveness { status: "ok" })
}

#[derive(Serialize)]
struct Readiness {
	status: &'static str,
	db_reachable: bool,
}

async fn ready(State(app): State<App>) -> impl IntoResponse {
	let db_reachable = app.storage.integrity_check().await.is_ok();
	let status = if db_reachable { "ok" } else { "degraded" };
	(
		if db_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE },
		Json(Readiness { status, db_reachable }),
	)
}

fn etag_header(etag: &str) -> HeaderMap {
	let mut headers = HeaderMap::new();
	if let Ok(v) = HeaderValue::from_str(etag) {
		headers.insert(header::ETAG, v);
	}
	headers
}

#[derive(Deserialize)]
struct ListQuery {
	cursor: Option<String>,
	limit: Option<i64>,
}

#[derive(Serialize)]
struct ListResponse {
	items: Vec<MapSummary>,
	next_cursor: Option<String>,
}

async fn list_maps(State(app): State<App>, Query(q): Query<ListQuery>) -> Result<Response, Error> {
	let page = app.maps.list(q.cursor.as_deref(), q.limit.unwrap_or(50)).await?;
	Ok(Json(ListResponse { items: page.items, next_cursor: page.next_cursor }).into_response())
}

#[derive(Deserialize)]
struct CreateMapBody {
	name: String,
	data: serde_json::Value,
}

async fn create_map(State(app): State<App>, Json(body): Json<CreateMapBody>) -> Result<Response, Error> {
	let result = app.maps.create(&body.name, &body.data).await?;
	let mut headers = etag_header(&result.etag);
	if let Ok(loc) = HeaderValue::from_str(&format!("/maps/{}", result.id)) {
		headers.insert(header::LOCATION, loc);
	}
	Ok((StatusCode::CREATED, headers, Json(to_write_json(&result))).into_response())
}

#[derive(Serialize)]
struct WriteResultJson {
	id: String,
	version: i64,
	#[serde(rename = "updatedAt")]
	updated_at: String,
}

fn to_write_json(r: &MapWriteResult) -> WriteResultJson {
	WriteResultJson { id: r.id.clone(), version: r.version, updated_at: r.updated_at.clone() }
}

#[derive(Serialize)]
struct MapJson {
	id: String,
	name: String,
	version: i64,
	#[serde(rename = "updatedAt")]
	updated_at: String,
	data: serde_json::Value,
}

fn to_map_json(m: &MapFull) -> MapJson {
	MapJson {
		id: m.id.clone(),
		name: m.name.clone(),
		version: m.version,
		updated_at: m.updated_at.clone(),
		data: m.data.clone(),
	}
}

async fn get_map(State(app): State<App>, Path(id): Path<String>) -> Result<Response, Error> {
	let map = app.maps.get(&id).await?;
	let headers = etag_header(&map.etag);
	Ok((headers, Json(to_map_json(&map))).into_response())
}

#[derive(Deserialize)]
struct UpdateMapBody {
	version: Option<i64>,
	name: Option<String>,
	data: Option<serde_json::Value>,
}

/// Resolves the expected version from the body, or from `If-Match` when the
/// body omits it (§6: "`If-Match` with a strong ETag is accepted as an
/// alternative to the body `version` field"). The ETag is a hash, not an
/// invertible encoding of the version, so an `If-Match`-only request is
/// resolved by comparing against the currently stored ETag.
async fn resolve_expected_version(app: &App, id: &str, headers: &HeaderMap, body_version: Option<i64>) -> ClResult<i64> {
	if let Some(v) = body_version {
		return Ok(v);
	}
	let if_match = headers
		.get(header::IF_MATCH)
		.and_then(|v| v.to_str().ok())
		.ok_or_else(|| Error::Conflict("missing version in body and no If-Match header".into()))?;

	let current = app.maps.get(id).await?;
	if if_match.trim() != current.etag {
		return Err(Error::Conflict("If-Match does not match current ETag".into()));
	}
	Ok(current.version)
}

async fn update_map(
	State(app): State<App>,
	Path(id): Path<String>,
	headers: HeaderMap,
	Json(body): Json<UpdateMapBody>,
) -> Result<Response, Error> {
	let version = resolve_expected_version(&app, &id, &headers, body.version).await?;

	let result = app
		.maps
		.update(&id, version, body.name.as_deref(), body.data.as_ref())
		.await?;

	// §4.B side effect: a successful write invalidates any loaded replica
	// so the next binary session reloads from the fresh row.
	app.registry.invalidate(&id);

	let response_headers = etag_header(&result.etag);
	Ok((response_headers, Json(to_write_json(&result))).into_response())
}

async fn delete_map(State(app): State<App>, Path(id): Path<String>) -> Result<Response, Error> {
	app.maps.delete(&id).await?;
	app.crdt_persistence.delete_snapshot(&id).await?;
	app.registry.invalidate(&id);
	Ok(StatusCode::NO_CONTENT.into_response())
}

async fn sync_ws(
	State(app): State<App>,
	Path(map_id): Path<String>,
	ws: WebSocketUpgrade,
	ConnectInfo(_addr): ConnectInfo<SocketAddr>,
) -> Response {
	if map_id.trim().is_empty() || map_id.contains('/') {
		return ws.on_upgrade(|socket| async move {
			use axum::extract::ws::{CloseFrame, Message};
			use futures::SinkExt;
			let mut socket = socket;
			let _ = socket
				.send(Message::Close(Some(CloseFrame {
					code: crate::crdt::session::CLOSE_INVALID_URL,
					reason: "invalid mapId".into(),
				})))
				.await;
		});
	}

	ws.on_upgrade(move |socket| handle_sync_session(socket, app, map_id))
}

async fn handle_sync_session(socket: axum::extract::ws::WebSocket, app: App, map_id: String) {
	// `acquire` creates the backing `maps` row on first touch (§3 Lifecycle).
	let handle = match app.registry.acquire(&map_id).await {
		Ok(h) => h,
		Err(e) => {
			use axum::extract::ws::{CloseFrame, Message};
			use futures::SinkExt;
			let mut socket = socket;
			tracing::error!(error = %e, %map_id, "failed to acquire CRDT replica");
			let _ = socket
				.send(Message::Close(Some(CloseFrame {
					code: crate::crdt::session::CLOSE_INTERNAL_ERROR,
					reason: "replica unavailable".into(),
				})))
				.await;
			return;
		}
	};

	let initial_state = app.registry.snapshot(&handle).await;
	let session_tag = crate::crdt::session::new_session_tag();

	let registry = app.registry.clone();
	let apply_handle = handle.clone();
	let apply_tag = session_tag.clone();

	crate::crdt::session::run_session(
		socket,
		app.hub.clone(),
		map_id.clone(),
		session_tag,
		initial_state,
		move |bytes| {
			let registry = registry.clone();
			let handle = apply_handle.clone();
			let tag = apply_tag.clone();
			async move {
				if let Err(e) = registry.apply(&handle, &bytes, &tag).await {
					tracing::warn!(error = %e, "failed to apply inbound CRDT update");
				}
			}
		},
	)
	.await;

	app.registry.release(handle);
}

/// Narrow result-to-response bridge used by handlers that return `ClResult`.
pub type RouteResult = ClResult<Response>;

// vim: ts=4
