use mindmeld::app::AppBuilder;
use mindmeld::config::Config;
use serde_json::json;

async fn test_app(dir: &tempfile::TempDir) -> mindmeld::app::App {
	let config = Config {
		port: 0,
		cors_origin: "*".to_string(),
		sqlite_file: dir.path().join("test.sqlite"),
		log_level: "error".to_string(),
		feature_maps_api: true,
		feature_mcp: false,
		server_sync: true,
		data_provider: mindmeld::config::DataProvider::Crdt,
	};
	AppBuilder::new().config(config).build().await.expect("build app")
}

#[tokio::test]
async fn updating_a_map_invalidates_its_loaded_replica() {
	let dir = tempfile::tempdir().expect("tempdir");
	let app = test_app(&dir).await;

	let data = json!({"n": [], "c": [], "meta": {}});
	let created = app.maps.create("Map", &data).await.expect("create");

	// A binary session touches the map first, loading it into the registry.
	let handle = app.registry.acquire(&created.id).await.expect("acquire");
	app.registry.release(handle);

	// A REST write lands next; it must invalidate the cached replica so a
	// fresh binary session reloads from the updated row rather than stale
	// in-memory state.
	app.maps
		.update(&created.id, created.version, Some("Renamed"), None)
		.await
		.expect("update");
	app.registry.invalidate(&created.id);

	// Re-acquiring should not error, and the map row itself reflects the
	// REST write.
	let handle = app.registry.acquire(&created.id).await.expect("re-acquire after invalidate");
	app.registry.release(handle);

	let fetched = app.maps.get(&created.id).await.expect("get");
	assert_eq!(fetched.name, "Renamed");
}

#[tokio::test]
async fn deleting_a_map_removes_its_snapshot() {
	let dir = tempfile::tempdir().expect("tempdir");
	let app = test_app(&dir).await;

	let data = json!({"n": [], "c": [], "meta": {}});
	let created = app.maps.create("Map", &data).await.expect("create");

	let handle = app.registry.acquire(&created.id).await.expect("acquire");
	app.registry.release(handle);

	app.maps.delete(&created.id).await.expect("delete");
	app.crdt_persistence.delete_snapshot(&created.id).await.expect("delete snapshot");
	app.registry.invalidate(&created.id);

	let result = app.maps.get(&created.id).await;
	assert!(result.is_err());
}
