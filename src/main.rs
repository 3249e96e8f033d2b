mod api;
mod config;
mod connection;
mod documents;
mod driver;
mod error;
mod explorer;
mod http;
mod operations;
mod schema;
#[cfg(test)]
mod testing;
mod translator;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use connection::Connector;
use driver::{DriverConnector, PooledConnector};
use explorer::Explorer;

/// An HTTP backend for browsing `MongoDB` deployments.
///
/// Lists databases and collections with sampled documents, runs filtered
/// queries, applies single-document writes, and translates natural-language
/// requests into filters through a hosted language model.
#[derive(Parser)]
#[command(name = "mongodb-explorer-rs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HTTP backend for exploring MongoDB databases", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "MONGODB_EXPLORER_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides server.bind from the configuration
    #[arg(long, env = "MONGODB_EXPLORER_BIND")]
    bind: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mongodb_explorer_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.init_config {
        let path = config::Config::resolve_path(cli.config.as_deref())?;
        config::Config::write_example(&path)?;
        tracing::info!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    let addr = config.bind_addr()?;

    let connector: Arc<dyn Connector> = if config.pool.enabled {
        tracing::info!(
            "Client pooling enabled: max {} clients, {}s idle timeout",
            config.pool.max_clients,
            config.pool.idle_timeout_secs
        );
        Arc::new(PooledConnector::new(config.explorer.clone(), &config.pool))
    } else {
        Arc::new(DriverConnector::new(config.explorer.clone()))
    };

    let state = http::AppState {
        explorer: Arc::new(Explorer::new(connector, config.explorer.clone())),
        translator: Arc::from(translator::from_config(&config.translator)?),
    };

    let app = http::router(state, &config.server.cors_origins);
    http::serve(app, addr).await?;

    Ok(())
}
