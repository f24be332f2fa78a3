use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod ui;

use blogfeed::config::Config;
use blogfeed::feed::{FeedController, FeedOptions};
use blogfeed::storage::{parse_import, SqliteStore, StoreError};

/// Maximum import file size (16 MB)
const MAX_IMPORT_SIZE: u64 = 16 * 1_048_576;

/// Get the config directory path (~/.config/blogfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("blogfeed"))
}

/// Create the config directory with user-only permissions.
fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

/// Read and load a JSON seed file into `collection`.
async fn import_file(store: &SqliteStore, collection: &str, path: &Path) -> Result<usize> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve import file: {}", path.display()))?;

    let metadata = std::fs::metadata(&canonical)?;
    if !metadata.is_file() {
        anyhow::bail!("Import path must be a regular file");
    }
    if metadata.len() > MAX_IMPORT_SIZE {
        anyhow::bail!(
            "Import file is {} bytes (max {} bytes)",
            metadata.len(),
            MAX_IMPORT_SIZE
        );
    }

    let content = std::fs::read_to_string(&canonical)
        .with_context(|| format!("Failed to read import file: {}", canonical.display()))?;
    let documents = parse_import(&content)
        .with_context(|| format!("Invalid import file: {}", canonical.display()))?;

    store
        .import_documents(collection, documents)
        .await
        .context("Failed to import documents")
}

#[derive(Parser, Debug)]
#[command(
    name = "blogfeed",
    about = "Paginated, searchable blog feed with live tag and category counts"
)]
struct Args {
    /// Config file (default: ~/.config/blogfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the config file)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Document collection to show (overrides the config file)
    #[arg(long, value_name = "NAME")]
    collection: Option<String>,

    /// Import documents from a JSON file before starting
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Start with this search applied
    #[arg(long, value_name = "TERM")]
    search: Option<String>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // CLI flags win over the config file
    if let Some(collection) = args.collection {
        config.collection = collection;
    }
    if let Some(database) = args.database {
        config.database = Some(database);
    }

    let db_path = config
        .database
        .clone()
        .unwrap_or_else(|| config_dir.join("blogfeed.db"));

    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = match SqliteStore::open(db_path_str).await {
        Ok(store) => store,
        Err(StoreError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of blogfeed appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    if let Some(path) = &args.import {
        let count = import_file(&store, &config.collection, path).await?;
        println!("Imported {} documents into '{}'", count, config.collection);
    }

    let total = store
        .count(&config.collection)
        .await
        .context("Failed to count documents")?;
    println!(
        "Collection '{}': {} documents ({})",
        config.collection,
        total,
        db_path.display()
    );

    let mut controller = FeedController::mount(Arc::new(store), FeedOptions::from(&config)).await;
    controller.apply_search_query(args.search.as_deref());

    let result = ui::run(&mut controller).await;
    controller.unmount();
    result?;

    println!("Goodbye!");
    Ok(())
}
