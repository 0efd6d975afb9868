//! Admin Facade CLI (§4.F / §6): offline maintenance operations run against
//! a stopped server's database file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mindmeld::admin::backup::{self, BackupOptions};
use mindmeld::admin::export_import::{self, ExportFilter, ExportFormat, ImportConflictPolicy};
use mindmeld::admin::migrations::{self, load_migrations};
use mindmeld::admin::restore::{self, RestoreOptions};
use mindmeld::error::ClResult;
use mindmeld::storage::StorageEngine;

#[derive(Parser)]
#[command(name = "mindmeld-admin", about = "Offline maintenance for a mindmeld-server database")]
struct Cli {
	/// Path to the SQLite database file.
	#[arg(long, env = "SQLITE_FILE", default_value = "./data/mindmeld.sqlite", global = true)]
	db: PathBuf,

	/// Emit machine-readable JSON instead of text to stdout.
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Take a backup of the database.
	Backup {
		#[arg(long, default_value = "./backups")]
		dest_dir: PathBuf,
		#[arg(long)]
		compress: bool,
		#[arg(long, env = "MINDMELD_BACKUP_PASSWORD")]
		encrypt_password: Option<String>,
		#[arg(long)]
		keep_newest: Option<usize>,
		#[arg(long)]
		delete_older_than_days: Option<u32>,
	},
	/// Restore the database from a backup file.
	Restore {
		/// Path to a specific backup file; defaults to the newest in --dest-dir.
		#[arg(long)]
		from: Option<PathBuf>,
		#[arg(long, default_value = "./backups")]
		dest_dir: PathBuf,
		#[arg(long, env = "MINDMELD_BACKUP_PASSWORD")]
		password: Option<String>,
		#[arg(long)]
		skip_safety_backup: bool,
	},
	/// List backups in a directory.
	List {
		#[arg(long, default_value = "./backups")]
		dest_dir: PathBuf,
	},
	/// Verify a backup file's integrity without restoring it.
	Verify {
		path: PathBuf,
	},
	/// Delete old backups per a retention policy.
	Cleanup {
		#[arg(long, default_value = "./backups")]
		dest_dir: PathBuf,
		#[arg(long)]
		keep_newest: Option<usize>,
		#[arg(long)]
		delete_older_than_days: Option<u32>,
	},
	/// Export maps to a file.
	Export {
		path: PathBuf,
		#[arg(long, default_value = "json")]
		format: String,
		#[arg(long)]
		name_contains: Option<String>,
		#[arg(long)]
		updated_after: Option<String>,
		#[arg(long)]
		updated_before: Option<String>,
	},
	/// Import maps from a JSON export.
	Import {
		path: PathBuf,
		#[arg(long, default_value = "skip")]
		on_conflict: String,
	},
	/// Apply pending migrations.
	Migrate {
		#[arg(long, default_value = "./migrations")]
		migrations_dir: PathBuf,
		#[arg(long)]
		dry_run: bool,
	},
	/// Roll back the most recently applied migration, or a specific version.
	Rollback {
		#[arg(long, default_value = "./migrations")]
		migrations_dir: PathBuf,
		version: Option<String>,
	},
	/// Show which migrations are applied/pending.
	Status {
		#[arg(long, default_value = "./migrations")]
		migrations_dir: PathBuf,
	},
	/// Show the history of applied migrations.
	History,
}

fn print_result<T: serde::Serialize + std::fmt::Debug>(value: &T, as_json: bool) {
	if as_json {
		match serde_json::to_string_pretty(value) {
			Ok(s) => println!("{s}"),
			Err(e) => eprintln!("failed to serialize result: {e}"),
		}
	} else {
		println!("{value:#?}");
	}
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
		.with_target(false)
		.init();

	let cli = Cli::parse();
	if let Err(e) = run(cli).await {
		eprintln!("error: {e}");
		std::process::exit(1);
	}
}

async fn run(cli: Cli) -> ClResult<()> {
	match cli.command {
		Command::Backup { dest_dir, compress, encrypt_password, keep_newest, delete_older_than_days } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let opts = BackupOptions { dest_dir, compress, encrypt_password, keep_newest, delete_older_than_days };
			let result = backup::backup(&storage, &opts).await?;
			storage.close().await;
			print_result(&result, cli.json);
		}
		Command::Restore { from, dest_dir, password, skip_safety_backup } => {
			let backup_path = match from {
				Some(p) => p,
				None => restore::find_newest(&dest_dir).await?,
			};
			let opts = RestoreOptions { backup_path, decrypt_password: password, skip_safety_backup };
			let result = restore::restore(&cli.db, &opts).await?;
			print_result(&result, cli.json);
		}
		Command::List { dest_dir } => {
			let mut names = Vec::new();
			let mut read_dir = tokio::fs::read_dir(&dest_dir).await?;
			while let Some(entry) = read_dir.next_entry().await? {
				let name = entry.file_name().to_string_lossy().to_string();
				if name.starts_with("mindmeld-backup-") && !name.ends_with(".meta.json") {
					names.push(name);
				}
			}
			names.sort();
			print_result(&names, cli.json);
		}
		Command::Verify { path } => {
			backup::verify(&path).await?;
			println!("ok");
		}
		Command::Cleanup { dest_dir, keep_newest, delete_older_than_days } => {
			let opts = BackupOptions { dest_dir, keep_newest, delete_older_than_days, ..Default::default() };
			tokio::fs::create_dir_all(&opts.dest_dir).await?;
			// Reuses the retention sweep that backup() runs after each new
			// backup, with no new backup created.
			let before = list_backup_names(&opts.dest_dir).await?;
			backup::apply_retention_standalone(&opts.dest_dir, opts.keep_newest, opts.delete_older_than_days).await?;
			let after = list_backup_names(&opts.dest_dir).await?;
			println!("removed {} of {} backups", before.len().saturating_sub(after.len()), before.len());
		}
		Command::Export { path, format, name_contains, updated_after, updated_before } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let format: ExportFormat = format.parse()?;
			let filter = ExportFilter { name_contains, updated_after, updated_before };
			let result = export_import::export(&storage, format, &filter, &path).await?;
			storage.close().await;
			print_result(&result, cli.json);
		}
		Command::Import { path, on_conflict } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let policy: ImportConflictPolicy = on_conflict.parse()?;
			let result = export_import::import(&storage, &path, policy).await?;
			storage.close().await;
			print_result(&result, cli.json);
		}
		Command::Migrate { migrations_dir, dry_run } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let migrations = load_migrations(&migrations_dir).await?;
			let applied = migrations::migrate(&storage, &migrations, dry_run).await?;
			storage.close().await;
			print_result(&applied, cli.json);
		}
		Command::Rollback { migrations_dir, version } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let migrations = load_migrations(&migrations_dir).await?;
			let rolled_back = match version {
				Some(v) => {
					migrations::rollback_to_version(&storage, &migrations, &v).await?;
					v
				}
				None => migrations::rollback_last(&storage, &migrations).await?,
			};
			storage.close().await;
			println!("rolled back {rolled_back}");
		}
		Command::Status { migrations_dir } => {
			let storage = StorageEngine::open(&cli.db).await?;
			let migrations = load_migrations(&migrations_dir).await?;
			let statuses = migrations::status(&storage, &migrations).await?;
			storage.close().await;
			print_result(&statuses, cli.json);
		}
		Command::History => {
			let storage = StorageEngine::open(&cli.db).await?;
			let records = migrations::history(&storage).await?;
			storage.close().await;
			print_result(&records, cli.json);
		}
	}
	Ok(())
}

async fn list_backup_names(dir: &std::path::Path) -> ClResult<Vec<String>> {
	let mut names = Vec::new();
	let mut read_dir = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = read_dir.next_entry().await? {
		let name = entry.file_name().to_string_lossy().to_string();
		if name.starts_with("mindmeld-backup-") && !name.ends_with(".meta.json") {
			names.push(name);
		}
	}
	Ok(names)
}

// vim: ts=4
