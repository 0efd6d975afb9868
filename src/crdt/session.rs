//! Session Hub (§4.E): one bidirectional binary session per client
//! connection, fanned out per `mapId` with origin suppression.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;

/// Close codes in the private-use range (RFC 6455 §7.4.2), one per §4.E
/// error case.
pub const CLOSE_INVALID_URL: u16 = 4004;
pub const CLOSE_INVALID_FRAME: u16 = 4008;
pub const CLOSE_SLOW_CONSUMER: u16 = 4429;
pub const CLOSE_SERVER_SHUTDOWN: u16 = 4503;
pub const CLOSE_INTERNAL_ERROR: u16 = 4500;
pub const CLOSE_INVALIDATED: u16 = 4409;

const ROOM_CHANNEL_CAPACITY: usize = 256;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
enum HubEvent {
	Update { bytes: Bytes, origin_tag: String },
	Invalidate,
	Shutdown,
}

struct Room {
	tx: broadcast::Sender<HubEvent>,
}

/// Owns the per-map broadcast rooms. Sessions subscribe on entering `Live`
/// and are dropped from the room implicitly when their receiver is dropped.
#[derive(Debug, Default)]
pub struct SessionHub {
	rooms: DashMap<String, Room>,
}

impl std::fmt::Debug for Room {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Room").finish()
	}
}

impl SessionHub {
	pub fn new() -> Self {
		Self { rooms: DashMap::new() }
	}

	fn room_sender(&self, map_id: &str) -> broadcast::Sender<HubEvent> {
		self.rooms
			.entry(map_id.to_string())
			.or_insert_with(|| Room { tx: broadcast::channel(ROOM_CHANNEL_CAPACITY).0 })
			.tx
			.clone()
	}

	fn subscribe(&self, map_id: &str) -> broadcast::Receiver<HubEvent> {
		self.room_sender(map_id).subscribe()
	}

	/// Called by the Document Registry after a successful `apply`.
	pub fn broadcast_update(&self, map_id: &str, bytes: Bytes, origin_tag: String) {
		let tx = self.room_sender(map_id);
		let _ = tx.send(HubEvent::Update { bytes, origin_tag });
	}

	/// Called by the Document Registry when a map's replica is invalidated
	/// by a REST write; forces every live session on that map to close so
	/// clients reconnect against the fresh snapshot.
	pub fn invalidate(&self, map_id: &str) {
		if let Some(room) = self.rooms.get(map_id) {
			let _ = room.tx.send(HubEvent::Invalidate);
		}
	}

	/// Broadcasts a shutdown event to every room, used during graceful
	/// server shutdown.
	pub fn shutdown_all(&self) {
		for room in self.rooms.iter() {
			let _ = room.tx.send(HubEvent::Shutdown);
		}
	}
}

/// Per-session identity used to suppress echo during fan-out.
pub fn new_session_tag() -> String {
	uuid::Uuid::new_v4().to_string()
}

/// Drives one session end to end: `Opening` has already happened by the
/// time this is called (the caller has parsed and validated the URL);
/// `initial_state` is the full-state frame sent immediately on entering
/// `Syncing`. `on_inbound` is invoked for every binary frame received from
/// the client while `Live`.
pub async fn run_session<F, Fut>(
	socket: WebSocket,
	hub: Arc<SessionHub>,
	map_id: String,
	session_tag: String,
	initial_state: Vec<u8>,
	on_inbound: F,
) where
	F: Fn(Vec<u8>) -> Fut + Send + 'static,
	Fut: std::future::Future<Output = ()> + Send + 'static,
{
	let (mut sink, mut stream) = socket.split();

	if sink.send(Message::Binary(initial_state.into())).await.is_err() {
		return;
	}

	let mut rx = hub.subscribe(&map_id);

	let mut last_activity = tokio::time::Instant::now();
	let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
	heartbeat.tick().await;

	loop {
		tokio::select! {
			incoming = stream.next() => {
				match incoming {
					Some(Ok(Message::Binary(data))) => {
						last_activity = tokio::time::Instant::now();
						on_inbound(data.to_vec()).await;
					}
					Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
						last_activity = tokio::time::Instant::now();
					}
					Some(Ok(Message::Close(_))) | None => {
						break;
					}
					Some(Ok(_)) => {
						close_with(&mut sink, CLOSE_INVALID_FRAME, "binary frames only").await;
						break;
					}
					Some(Err(_)) => {
						break;
					}
				}
			}
			event = rx.recv() => {
				match event {
					Ok(HubEvent::Update { bytes, origin_tag }) => {
						if origin_tag != session_tag
							&& sink.send(Message::Binary(bytes)).await.is_err()
						{
							break;
						}
					}
					Ok(HubEvent::Invalidate) => {
						close_with(&mut sink, CLOSE_INVALIDATED, "map invalidated by a write").await;
						break;
					}
					Ok(HubEvent::Shutdown) => {
						close_with(&mut sink, CLOSE_SERVER_SHUTDOWN, "server shutting down").await;
						break;
					}
					Err(broadcast::error::RecvError::Lagged(_)) => {
						close_with(&mut sink, CLOSE_SLOW_CONSUMER, "slow consumer").await;
						break;
					}
					Err(broadcast::error::RecvError::Closed) => {
						break;
					}
				}
			}
			_ = heartbeat.tick() => {
				if last_activity.elapsed() > HEARTBEAT_TIMEOUT {
					close_with(&mut sink, CLOSE_SLOW_CONSUMER, "heartbeat timeout").await;
					break;
				}
				if sink.send(Message::Ping(Bytes::new())).await.is_err() {
					break;
				}
			}
		}
	}
}

async fn close_with(
	sink: &mut futures::stream::SplitSink<WebSocket, Message>,
	code: u16,
	reason: &'static str,
) {
	let _ = sink
		.send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
		.await;
}

// vim: ts=4
