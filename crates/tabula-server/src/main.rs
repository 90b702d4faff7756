//! tabula server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) overlaid by
//! `TABULA_*` environment variables, opens the metadata store and blob root,
//! and serves the JSON API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tabula_engine::{blob::FsBlobStore, oracle::HttpOracle};
use tabula_server::{AppState, ServerConfig};
use tabula_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "tabula data Q&A server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TABULA"))
    .build()
    .context("failed to read config file")?;

  let mut server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if server_cfg.blob_secret.is_empty() {
    anyhow::bail!("blob_secret must be set (TABULA_BLOB_SECRET)");
  }

  server_cfg.metadata_path = expand_tilde(&server_cfg.metadata_path);
  server_cfg.blob_root = expand_tilde(&server_cfg.blob_root);
  server_cfg.scratch_dir = expand_tilde(&server_cfg.scratch_dir);

  if let Some(parent) = server_cfg.metadata_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let meta = SqliteStore::open(&server_cfg.metadata_path)
    .await
    .with_context(|| format!("failed to open metadata store at {:?}", server_cfg.metadata_path))?;

  let blob = FsBlobStore::open(&server_cfg.blob_root, &server_cfg.blob_secret)
    .await
    .with_context(|| format!("failed to open blob root {:?}", server_cfg.blob_root))?;

  let oracle = HttpOracle::new(server_cfg.oracle()).context("failed to build oracle client")?;
  if server_cfg.oracle_api_key.is_empty() {
    tracing::warn!("oracle_api_key is empty; chat requests will likely be rejected upstream");
  }

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let state = AppState::new(Arc::new(blob), Arc::new(meta), Arc::new(oracle), server_cfg);
  let app = tabula_server::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
