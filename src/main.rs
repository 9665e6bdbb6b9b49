use mimalloc::MiMalloc;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wordle_db::WordleStorage;
use wordle_db::db::SCHEMA;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &wordle_db::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        max_connections = cfg.max_connections,
        loglevel = %cfg.loglevel
    );

    if let Some(dir) = sqlite_parent_dir(&cfg.database_url) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "failed to create database directory");
        }
    }

    let storage = WordleStorage::open(&cfg.database_url, cfg.max_connections).await?;
    storage.init_schema().await?;

    for table in SCHEMA {
        let rows = storage.count_rows(table).await?;
        info!(
            table = table.name,
            columns = table.columns.len(),
            relations = table.relations.len(),
            rows,
            "table ready"
        );
    }

    if cfg.dump_schema {
        println!("{}", serde_json::to_string_pretty(SCHEMA)?);
    }

    storage.pool().close().await;
    Ok(())
}

/// Directory holding the database file of a `sqlite:` URL, if any.
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}
