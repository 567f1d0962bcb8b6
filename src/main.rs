use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use feedcache::feed::HttpResolver;
use feedcache::storage::{
    CollectionId, CollectionStore, Database, PostCache, SourceId, SourceStore,
};
use feedcache::{Config, Scheduler, SourceAssigner};

/// Get the config directory path (~/.config/feedcache/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedcache"))
}

#[derive(Parser, Debug)]
#[command(name = "feedcache", about = "Keeps a local cache of RSS/Atom posts fresh")]
struct Args {
    /// Config file (default: ~/.config/feedcache/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database, overriding the config file
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the refresh pipeline until interrupted
    Run,
    /// Create an empty collection and print its id
    CollectionCreate { name: String },
    /// Replace a collection's sources with the given URLs
    Assign {
        collection: CollectionId,
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// List every known source
    Sources,
    /// List cached posts, newest first
    Posts {
        /// Source id, or collection id with --collection
        id: i64,
        #[arg(long)]
        collection: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| config_dir.join("feedcache.db"));
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path_str)
        .await
        .context("Failed to open database")?;

    let client = HttpResolver::build_client(&config.resolver.user_agent)
        .context("Failed to build HTTP client")?;
    let resolver = Arc::new(HttpResolver::new(client, config.resolver_options()));
    let store = Arc::new(db);
    let scheduler = Scheduler::new(
        store.clone(),
        store.clone(),
        resolver,
        config.scheduler_options(),
    );

    match args.command {
        Command::Run => run(&scheduler).await?,
        Command::CollectionCreate { name } => {
            let collection = store
                .create_collection(&name)
                .await
                .context("Failed to create collection")?;
            println!("{}\t{}", collection.id, collection.name);
        }
        Command::Assign { collection, urls } => {
            let assigner = SourceAssigner::new(store.clone(), store.clone(), scheduler.clone())
                .with_placeholder_title(config.placeholder_title.clone());
            let ids = assigner
                .update_collection_sources(collection, &urls)
                .await
                .with_context(|| format!("Failed to update sources of collection {collection}"))?;
            println!(
                "Collection {collection} now has {} source(s); new ones resolve on the next `feedcache run`",
                ids.len()
            );
        }
        Command::Sources => {
            for source in store.list_all().await.context("Failed to list sources")? {
                println!("{}\t{}\t{}", source.id, source.title, source.url);
            }
        }
        Command::Posts { id, collection } => {
            if collection {
                let items = store
                    .list_for_collection(id)
                    .await
                    .context("Failed to list collection posts")?;
                for item in items {
                    println!(
                        "{}\t{}\t{}",
                        published(item.post.published_at),
                        item.source.title,
                        item.post.url
                    );
                }
            } else {
                let source_id: SourceId = id;
                let posts = store
                    .list_for_source(source_id)
                    .await
                    .context("Failed to list posts")?;
                for post in posts {
                    println!(
                        "{}\t{}\t{}",
                        published(post.published_at),
                        post.title,
                        post.url
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run(scheduler: &Scheduler) -> Result<()> {
    let queued = scheduler
        .start()
        .await
        .context("Failed to list sources at start-up")?;
    tracing::info!(queued, "Refresh pipeline running, Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    scheduler.shutdown().await;
    Ok(())
}

fn published(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
