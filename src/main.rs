use pingtrail::config::{load_endpoints, ConfigError, ServerConfig};
use pingtrail::db::LogStore;
use pingtrail::probe::{ProbeError, Prober};
use pingtrail::scheduler::Scheduler;
use pingtrail::web::Server;

use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid log filter: {0}")]
    Logging(#[from] tracing_subscriber::filter::ParseError),
}

impl AppError {
    fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Config(_) => ExitCode::from(2),
            _ => ExitCode::FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Fatal: {}", e);
            eprintln!("pingtrail: {}", e);
            e.exit_code()
        }
    }
}

async fn run() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pingtrail=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting pingtrail on port {}...", cfg.http_port);

    let endpoints = load_endpoints(&cfg.config_path)?;
    tracing::info!(
        "Monitoring {} endpoints from {}",
        endpoints.len(),
        cfg.config_path.display()
    );

    let store = Arc::new(LogStore::open(&cfg.logs_path, cfg.max_entries));
    let prober = Prober::new(cfg.timeout, cfg.success_policy)?;

    // Start scheduler
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        prober,
        cfg.config_path.clone(),
        cfg.interval,
    ));
    let scheduler_task = scheduler.start().await;

    // Start web server
    let server = Server::new(cfg, store.clone());
    let served = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    let _ = scheduler_task.await;
    if let Err(e) = store.flush() {
        tracing::error!("Failed to flush logs on shutdown: {}", e);
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
