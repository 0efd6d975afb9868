//! Process wiring (§10 Application Shell): assembles the components behind
//! a shared `AppState` and drives the listen/serve/shutdown lifecycle.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::crdt::{CrdtPersistence, DocumentRegistry, SessionHub};
use crate::error::{ClResult, Error};
use crate::maps::MapRepository;
use crate::storage::StorageEngine;

pub struct AppState {
	pub config: Config,
	pub storage: StorageEngine,
	pub maps: MapRepository,
	pub crdt_persistence: CrdtPersistence,
	pub registry: DocumentRegistry,
	pub hub: Arc<SessionHub>,
	pub shutdown: CancellationToken,
}

pub type App = Arc<AppState>;

pub struct AppBuilder {
	config: Option<Config>,
}

impl AppBuilder {
	pub fn new() -> Self {
		Self { config: None }
	}

	pub fn config(&mut self, config: Config) -> &mut Self {
		self.config = Some(config);
		self
	}

	/// Builds the `AppState` (opening storage, applying the base schema)
	/// without starting the HTTP listener. Used directly by tests that want
	/// an isolated instance.
	pub async fn build(self) -> ClResult<App> {
		let config = match self.config {
			Some(c) => c,
			None => Config::from_env()?,
		};

		tracing::info!(port = config.port, db = %config.sqlite_file.display(), "starting mindmeld-server");

		let storage = StorageEngine::open(&config.sqlite_file).await?;
		let maps = MapRepository::new(storage.clone());
		let crdt_persistence = CrdtPersistence::new(storage.clone());
		let hub = Arc::new(SessionHub::new());
		let registry = DocumentRegistry::new(crdt_persistence.clone(), hub.clone(), maps.clone());

		Ok(Arc::new(AppState {
			config,
			storage,
			maps,
			crdt_persistence,
			registry,
			hub,
			shutdown: CancellationToken::new(),
		}))
	}

	/// Builds the app and serves it until a shutdown signal (SIGINT/SIGTERM)
	/// arrives, then drains sessions and closes storage.
	pub async fn run(self) -> ClResult<()> {
		let app = self.build().await?;
		let router = crate::routes::build_router(app.clone());

		let addr = format!("0.0.0.0:{}", app.config.port);
		let listener = tokio::net::TcpListener::bind(&addr)
			.await
			.map_err(|e| Error::StorageUnavailable(format!("failed to bind {addr}: {e}")))?;
		tracing::info!(%addr, "listening");

		let shutdown = app.shutdown.clone();
		let hub = app.hub.clone();
		let make_service = router.into_make_service_with_connect_info::<std::net::SocketAddr>();
		let server = axum::serve(listener, make_service).with_graceful_shutdown(async move {
			shutdown_signal().await;
			shutdown.cancel();
			hub.shutdown_all();
		});

		server.await.map_err(|e| Error::Internal(format!("server error: {e}")))?;
		app.storage.close().await;
		Ok(())
	}
}

impl Default for AppBuilder {
	fn default() -> Self {
		Self::new()
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		let mut sig = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(s) => s,
			Err(_) => return,
		};
		sig.recv().await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}

// vim: ts=4
