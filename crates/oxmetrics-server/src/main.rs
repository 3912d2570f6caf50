use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use oxmetrics_server::app;
use oxmetrics_server::backend::Backend;
use oxmetrics_server::config::ServerConfig;
use oxmetrics_server::state::AppState;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  oxmetrics-server [config.toml]    Start the server (default: config/server.toml)");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("oxmetrics=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        path => run_server(path.unwrap_or("config/server.toml")).await,
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    tracing::info!(
        address = %config.address,
        store_interval_secs = config.store_interval_secs,
        store_file = config.store_file.as_deref().unwrap_or("-"),
        database = config.database_dsn.is_some(),
        keyed = !config.key.is_empty(),
        "oxmetrics-server starting"
    );

    let backend = Backend::open(&config)?;
    let state = AppState::new(backend.storage(), backend.flush_trigger(), config.key.clone());
    let app = app::build_http_app(state);

    let listener = tokio::net::TcpListener::bind(&config.address).await?;
    tracing::info!(http = %listener.local_addr()?, "Server started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
            tracing::info!("Shutting down gracefully");
        })
        .await;
    if let Err(e) = &served {
        tracing::error!(error = %e, "HTTP server error");
    }

    backend.shutdown().await;
    tracing::info!("Server stopped");
    served.map_err(Into::into)
}
