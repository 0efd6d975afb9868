use mindmeld::admin::export_import::{self, ExportFilter, ExportFormat, ImportConflictPolicy};
use mindmeld::maps::MapRepository;
use mindmeld::storage::StorageEngine;
use serde_json::json;

#[tokio::test]
async fn export_then_import_into_a_fresh_database_recreates_rows() {
	let dir = tempfile::tempdir().expect("tempdir");
	let storage_a = StorageEngine::open(dir.path().join("a.sqlite")).await.expect("open a");
	let maps_a = MapRepository::new(storage_a.clone());
	let data = json!({"n": [], "c": [], "meta": {}});
	maps_a.create("Exported Map", &data).await.expect("create");

	let export_path = dir.path().join("export.json");
	let result = export_import::export(&storage_a, ExportFormat::Json, &ExportFilter::default(), &export_path)
		.await
		.expect("export");
	assert_eq!(result.record_count, 1);
	storage_a.close().await;

	let storage_b = StorageEngine::open(dir.path().join("b.sqlite")).await.expect("open b");
	let import_result = export_import::import(&storage_b, &export_path, ImportConflictPolicy::Skip)
		.await
		.expect("import");
	assert_eq!(import_result.imported, 1);

	let maps_b = MapRepository::new(storage_b.clone());
	let page = maps_b.list(None, 50).await.expect("list");
	assert_eq!(page.items.len(), 1);
	assert_eq!(page.items[0].name, "Exported Map");
	storage_b.close().await;
}

#[tokio::test]
async fn import_skip_policy_leaves_existing_row_untouched() {
	let dir = tempfile::tempdir().expect("tempdir");
	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	let maps = MapRepository::new(storage.clone());
	let data = json!({"n": [], "c": [], "meta": {}});
	let created = maps.create("Original Name", &data).await.expect("create");

	let export_path = dir.path().join("export.json");
	let exported = serde_json::json!([{
		"id": created.id,
		"name": "Imported Name",
		"version": 99,
		"created_at": created.updated_at,
		"updated_at": created.updated_at,
		"data": data,
	}]);
	tokio::fs::write(&export_path, serde_json::to_vec(&exported).unwrap()).await.expect("write export");

	let result = export_import::import(&storage, &export_path, ImportConflictPolicy::Skip)
		.await
		.expect("import");
	assert_eq!(result.skipped, 1);
	assert_eq!(result.imported, 0);

	let fetched = maps.get(&created.id).await.expect("get");
	assert_eq!(fetched.name, "Original Name");
}

#[tokio::test]
async fn import_merge_policy_bumps_version_past_both_sides() {
	let dir = tempfile::tempdir().expect("tempdir");
	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	let maps = MapRepository::new(storage.clone());
	let data = json!({"n": [], "c": [], "meta": {}});
	let created = maps.create("Existing", &data).await.expect("create");
	// Bump the existing row to version 3 so the import's version (5) is the
	// higher of the two, exercising the max(existing, import) + 1 rule.
	maps.update(&created.id, 1, Some("Existing v2"), None).await.expect("update to v2");
	maps.update(&created.id, 2, Some("Existing v3"), None).await.expect("update to v3");

	let export_path = dir.path().join("export.json");
	let exported = serde_json::json!([{
		"id": created.id,
		"name": "Imported Newer",
		"version": 5,
		"created_at": created.updated_at,
		"updated_at": "2999-01-01T00:00:00Z",
		"data": data,
	}]);
	tokio::fs::write(&export_path, serde_json::to_vec(&exported).unwrap()).await.expect("write export");

	let result = export_import::import(&storage, &export_path, ImportConflictPolicy::Merge)
		.await
		.expect("import");
	assert_eq!(result.merged, 1);

	let fetched = maps.get(&created.id).await.expect("get");
	// max(existing=3, import=5) + 1 = 6
	assert_eq!(fetched.version, 6);
}
