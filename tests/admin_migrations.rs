use mindmeld::admin::migrations::{self, load_migrations};
use mindmeld::storage::StorageEngine;

async fn write_migration(dir: &std::path::Path, version: &str, name: &str, up: &str, down: Option<&str>) {
	tokio::fs::write(dir.join(format!("{version}_{name}.up.sql")), up).await.expect("write up");
	if let Some(down) = down {
		tokio::fs::write(dir.join(format!("{version}_{name}.down.sql")), down).await.expect("write down");
	}
}

#[tokio::test]
async fn migrate_applies_pending_migrations_in_order() {
	let dir = tempfile::tempdir().expect("tempdir");
	let migrations_dir = dir.path().join("migrations");
	tokio::fs::create_dir_all(&migrations_dir).await.expect("mkdir");

	write_migration(
		&migrations_dir,
		"0001",
		"add_tags_table",
		"CREATE TABLE tags (id TEXT PRIMARY KEY, name TEXT NOT NULL);",
		Some("DROP TABLE tags;"),
	)
	.await;
	write_migration(
		&migrations_dir,
		"0002",
		"add_tag_color",
		"ALTER TABLE tags ADD COLUMN color TEXT;",
		None,
	)
	.await;

	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	let migs = load_migrations(&migrations_dir).await.expect("load migrations");
	assert_eq!(migs.len(), 2);

	let applied = migrations::migrate(&storage, &migs, false).await.expect("migrate");
	assert_eq!(applied.len(), 2);
	assert_eq!(applied[0].version, "0001");
	assert_eq!(applied[1].version, "0002");

	let status = migrations::status(&storage, &migs).await.expect("status");
	assert!(status.iter().all(|s| s.applied));

	// Second run should be a no-op: both migrations are already applied.
	let applied_again = migrations::migrate(&storage, &migs, false).await.expect("migrate again");
	assert!(applied_again.is_empty());
}

#[tokio::test]
async fn rollback_without_a_down_script_fails_without_mutating() {
	let dir = tempfile::tempdir().expect("tempdir");
	let migrations_dir = dir.path().join("migrations");
	tokio::fs::create_dir_all(&migrations_dir).await.expect("mkdir");

	write_migration(
		&migrations_dir,
		"0001",
		"irreversible_change",
		"CREATE TABLE widgets (id TEXT PRIMARY KEY);",
		None,
	)
	.await;

	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	let migs = load_migrations(&migrations_dir).await.expect("load migrations");
	migrations::migrate(&storage, &migs, false).await.expect("migrate");

	let result = migrations::rollback_last(&storage, &migs).await;
	assert!(result.is_err());

	let history = migrations::history(&storage).await.expect("history");
	assert_eq!(history.len(), 1, "the migration record must still be present after a failed rollback attempt");
}

#[tokio::test]
async fn rollback_last_reverts_and_removes_the_record() {
	let dir = tempfile::tempdir().expect("tempdir");
	let migrations_dir = dir.path().join("migrations");
	tokio::fs::create_dir_all(&migrations_dir).await.expect("mkdir");

	write_migration(
		&migrations_dir,
		"0001",
		"add_widgets_table",
		"CREATE TABLE widgets (id TEXT PRIMARY KEY);",
		Some("DROP TABLE widgets;"),
	)
	.await;

	let storage = StorageEngine::open(dir.path().join("test.sqlite")).await.expect("open storage");
	let migs = load_migrations(&migrations_dir).await.expect("load migrations");
	migrations::migrate(&storage, &migs, false).await.expect("migrate");

	let rolled_back_version = migrations::rollback_last(&storage, &migs).await.expect("rollback");
	assert_eq!(rolled_back_version, "0001");

	let history = migrations::history(&storage).await.expect("history");
	assert!(history.is_empty());
}
