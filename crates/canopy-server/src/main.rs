use std::sync::Arc;

use canopy_server::cli::{Cli, Command};
use canopy_server::config::{AppConfig, LogFormat};
use canopy_server::metrics::Metrics;
use canopy_server::rest;
use canopy_server::service::CollectionService;
use canopy_storage::InMemoryStore;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Serve) | None => run_serve(config).await,
    }
}

fn run_check_config(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Configuration is valid");
    println!("  HTTP address:  {}", config.http_addr());
    println!("  Max depth:     {}", config.engine.max_depth);
    println!("  Log level:     {}", config.log.level);
    println!("  Log format:    {:?}", config.log.format);
    Ok(())
}

async fn run_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let http_addr = config.http_addr();
    tracing::info!(
        %http_addr,
        max_depth = config.engine.max_depth,
        "starting canopy server"
    );

    let store = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let service = Arc::new(
        CollectionService::new(store, config.to_engine_config())
            .with_metrics(Arc::clone(&metrics)),
    );

    let router = rest::create_router(rest::AppState { service, metrics });

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(shutdown_signal(shutdown_tx));

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(%http_addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: tokio::sync::watch::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }

    let _ = shutdown_tx.send(());
}
