//! Registry server for a local content store
//!
//! Run with: cargo run -p content-registry --features cli -- --config registry.toml

use std::net::SocketAddr;

use camino::Utf8PathBuf;
use clap::Parser;
use content_registry::RegistryBuilder;
use content_store::StoreConfig;
use eyre::WrapErr as _;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Serve a content store as a read-only container registry.
#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Address to listen on, overriding the configuration file
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Config {
    #[serde(default = "default_listen")]
    listen: SocketAddr,

    #[serde(default = "default_store")]
    store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            store: default_store(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_store() -> StoreConfig {
    StoreConfig::Memory
}

impl Config {
    async fn load(path: Option<&Utf8PathBuf>) -> eyre::Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("reading configuration from {path}"))?;
        toml_edit::de::from_str(&text).wrap_err_with(|| format!("parsing configuration {path}"))
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(args.config.as_ref()).await?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    let store = config
        .store
        .clone()
        .build()
        .await
        .wrap_err("opening content store")?;
    let app = RegistryBuilder::new().store(store).build();

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .wrap_err_with(|| format!("binding {}", config.listen))?;
    tracing::info!(listen = %config.listen, store = ?config.store, "registry listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    tracing::info!("registry stopped");
    Ok(())
}

async fn shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
