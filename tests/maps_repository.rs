use mindmeld::error::Error;
use mindmeld::maps::MapRepository;
use mindmeld::storage::StorageEngine;
use serde_json::json;

async fn repo() -> (tempfile::TempDir, MapRepository) {
	let dir = tempfile::tempdir().expect("tempdir");
	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	(dir, MapRepository::new(storage))
}

#[tokio::test]
async fn create_then_get_round_trips() {
	let (_dir, repo) = repo().await;
	let data = json!({"n": [], "c": [], "meta": {}});

	let created = repo.create("My Map", &data).await.expect("create");
	assert_eq!(created.version, 1);

	let fetched = repo.get(&created.id).await.expect("get");
	assert_eq!(fetched.name, "My Map");
	assert_eq!(fetched.version, 1);
	assert_eq!(fetched.etag, created.etag);
}

#[tokio::test]
async fn update_with_stale_version_conflicts() {
	let (_dir, repo) = repo().await;
	let data = json!({"n": [], "c": [], "meta": {}});
	let created = repo.create("Map", &data).await.expect("create");

	repo.update(&created.id, 1, Some("Renamed"), None).await.expect("first update succeeds");

	let result = repo.update(&created.id, 1, Some("Renamed Again"), None).await;
	assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn update_with_correct_version_succeeds_and_bumps_version() {
	let (_dir, repo) = repo().await;
	let data = json!({"n": [], "c": [], "meta": {}});
	let created = repo.create("Map", &data).await.expect("create");

	let updated = repo
		.update(&created.id, created.version, Some("New Name"), None)
		.await
		.expect("update");
	assert_eq!(updated.version, 2);

	let fetched = repo.get(&created.id).await.expect("get");
	assert_eq!(fetched.name, "New Name");
}

#[tokio::test]
async fn delete_removes_the_row() {
	let (_dir, repo) = repo().await;
	let data = json!({"n": [], "c": [], "meta": {}});
	let created = repo.create("Map", &data).await.expect("create");

	repo.delete(&created.id).await.expect("delete");
	let result = repo.get(&created.id).await;
	assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn delete_missing_id_is_not_found() {
	let (_dir, repo) = repo().await;
	let result = repo.delete("does-not-exist").await;
	assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn create_rejects_oversized_note_content() {
	let (_dir, repo) = repo().await;
	let huge = "x".repeat(mindmeld::maps::MAX_NOTE_CONTENT + 1);
	let data = json!({"n": [{"i": "n1", "c": huge, "p": [0, 0]}], "c": [], "meta": {}});

	let result = repo.create("Map", &data).await;
	assert!(matches!(result, Err(Error::TooLarge(_))));
}

#[tokio::test]
async fn list_paginates_with_cursor() {
	let (_dir, repo) = repo().await;
	let data = json!({"n": [], "c": [], "meta": {}});
	for i in 0..5 {
		repo.create(&format!("Map {i}"), &data).await.expect("create");
	}

	let first_page = repo.list(None, 2).await.expect("list");
	assert_eq!(first_page.items.len(), 2);
	assert!(first_page.next_cursor.is_some());

	let second_page = repo
		.list(first_page.next_cursor.as_deref(), 2)
		.await
		.expect("list page 2");
	assert_eq!(second_page.items.len(), 2);
}

#[tokio::test]
async fn ensure_exists_is_idempotent() {
	let (_dir, repo) = repo().await;
	repo.ensure_exists("fixed-id").await.expect("first ensure");
	repo.ensure_exists("fixed-id").await.expect("second ensure is a no-op");

	let fetched = repo.get("fixed-id").await.expect("get");
	assert_eq!(fetched.version, 1);
}
