//! lanyard-passkit server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens an
//! in-process SQLite store, and serves the pass update protocol plus the
//! enrollment boundary API over HTTP.
//!
//! # Token minting
//!
//! To print a currently valid auth token for a serial (useful when driving
//! the protocol by hand):
//!
//! ```
//! cargo run -p lanyard-passkit --bin server -- --mint-token 207100001
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use lanyard_builder::{
  HttpSigner, PassAssembler, PassSigner, SignRequest, SignedPass,
  StaticSigner,
};
use lanyard_passkit::{
  AppState, Environment, ServerConfig,
  auth::{AuthMode, TokenScheme},
};
use lanyard_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Lanyard pass service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print a currently valid auth token for this serial and exit.
  #[arg(long, value_name = "SERIAL")]
  mint_token: Option<String>,
}

/// Signer selected by configuration: an external signing service when
/// `signer_url` is set, the deterministic in-process signer otherwise.
#[derive(Clone)]
enum ConfiguredSigner {
  Http(HttpSigner),
  Static(StaticSigner),
}

impl PassSigner for ConfiguredSigner {
  async fn sign(
    &self,
    request: SignRequest,
  ) -> lanyard_builder::Result<SignedPass> {
    match self {
      ConfiguredSigner::Http(s)   => s.sign(request).await,
      ConfiguredSigner::Static(s) => s.sign(request).await,
    }
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("LANYARD"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let tokens = TokenScheme::new(server_cfg.auth_secret.as_bytes());

  // Helper mode: mint a token and exit.
  if let Some(raw) = cli.mint_token {
    let serial: lanyard_core::serial::StudentId = raw
      .parse()
      .with_context(|| format!("invalid serial {raw:?}"))?;
    println!("{}", tokens.mint(&serial));
    return Ok(());
  }

  if server_cfg.auth_mode == AuthMode::Permissive {
    tracing::warn!(
      "auth mode is PERMISSIVE: requests proceed without valid tokens"
    );
  }

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  // Select the signing collaborator.
  let signer = match server_cfg.signer_url.as_deref() {
    Some(url) => ConfiguredSigner::Http(HttpSigner::new(url)),
    None => {
      if server_cfg.environment == Environment::Production {
        anyhow::bail!("production deployments must configure signer_url");
      }
      tracing::warn!("no signer_url configured; using the in-process signer");
      ConfiguredSigner::Static(StaticSigner)
    }
  };

  // Build application state.
  let store = Arc::new(store);
  let state = AppState {
    store:   store.clone(),
    builder: Arc::new(PassAssembler::new(signer)),
    tokens:  Arc::new(tokens),
    config:  Arc::new(server_cfg.clone()),
  };

  let app = lanyard_passkit::router(state)
    .nest("/api", lanyard_api::api_router(store))
    .layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

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
