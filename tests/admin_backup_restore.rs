use mindmeld::admin::backup::{self, BackupOptions};
use mindmeld::admin::restore::{self, RestoreOptions};
use mindmeld::storage::StorageEngine;
use serde_json::json;

#[tokio::test]
async fn backup_then_restore_round_trips_data() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("live.sqlite");
	let backups_dir = dir.path().join("backups");

	let storage = StorageEngine::open(&db_path).await.expect("open storage");
	let maps = mindmeld::maps::MapRepository::new(storage.clone());
	let data = json!({"n": [], "c": [], "meta": {}});
	maps.create("Before Backup", &data).await.expect("create");

	let opts = BackupOptions { dest_dir: backups_dir.clone(), ..Default::default() };
	let backup_result = backup::backup(&storage, &opts).await.expect("backup");
	assert!(backup_result.verified);
	storage.close().await;

	// Simulate data loss / drift after the backup was taken.
	let storage2 = StorageEngine::open(&db_path).await.expect("reopen storage");
	let maps2 = mindmeld::maps::MapRepository::new(storage2.clone());
	maps2.create("After Backup", &data).await.expect("create second map");
	storage2.close().await;

	let restore_opts = RestoreOptions {
		backup_path: backup_result.path.clone(),
		decrypt_password: None,
		skip_safety_backup: false,
	};
	let restore_result = restore::restore(&db_path, &restore_opts).await.expect("restore");
	assert!(restore_result.safety_backup_path.is_some());

	let storage3 = StorageEngine::open(&db_path).await.expect("reopen after restore");
	let maps3 = mindmeld::maps::MapRepository::new(storage3.clone());
	let page = maps3.list(None, 50).await.expect("list");
	assert_eq!(page.items.len(), 1);
	assert_eq!(page.items[0].name, "Before Backup");
	storage3.close().await;
}

#[tokio::test]
async fn compressed_and_encrypted_backup_round_trips() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("live.sqlite");
	let backups_dir = dir.path().join("backups");

	let storage = StorageEngine::open(&db_path).await.expect("open storage");
	let maps = mindmeld::maps::MapRepository::new(storage.clone());
	let data = json!({"n": [], "c": [], "meta": {}});
	maps.create("Secret Map", &data).await.expect("create");

	let opts = BackupOptions {
		dest_dir: backups_dir,
		compress: true,
		encrypt_password: Some("correct horse battery staple".to_string()),
		..Default::default()
	};
	let backup_result = backup::backup(&storage, &opts).await.expect("encrypted backup");
	assert!(backup_result.path.to_string_lossy().ends_with(".enc"));
	storage.close().await;

	unsafe {
		std::env::set_var("MINDMELD_BACKUP_PASSWORD", "correct horse battery staple");
	}
	backup::verify(&backup_result.path).await.expect("verify encrypted backup");
	unsafe {
		std::env::remove_var("MINDMELD_BACKUP_PASSWORD");
	}
}

#[tokio::test]
async fn retention_keeps_only_newest_n() {
	let dir = tempfile::tempdir().expect("tempdir");
	let db_path = dir.path().join("live.sqlite");
	let backups_dir = dir.path().join("backups");

	let storage = StorageEngine::open(&db_path).await.expect("open storage");

	for i in 0..3 {
		let opts = BackupOptions { dest_dir: backups_dir.clone(), keep_newest: Some(1), ..Default::default() };
		backup::backup(&storage, &opts).await.unwrap_or_else(|e| panic!("backup {i} failed: {e}"));
	}
	storage.close().await;

	let mut count = 0;
	let mut read_dir = tokio::fs::read_dir(&backups_dir).await.expect("read backups dir");
	while let Some(entry) = read_dir.next_entry().await.expect("next entry") {
		let name = entry.file_name().to_string_lossy().to_string();
		if name.starts_with("mindmeld-backup-") && !name.ends_with(".meta.json") {
			count += 1;
		}
	}
	assert_eq!(count, 1);
}
