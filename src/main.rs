//! FormPulse - live form analytics server
//!
//! Collects responses to user-defined forms over a JSON API and pushes a
//! freshly computed analytics snapshot to every dashboard watching a form
//! each time a response for it is recorded.
//!
//! Exit codes:
//!   0 - Clean shutdown
//!   1 - Startup or runtime error (bad config, port in use, unreadable data file, etc.)

mod analysis;
mod broker;
mod cli;
mod config;
mod error;
mod live;
mod models;
mod seed;
mod server;
mod store;
mod validation;

use anyhow::{Context, Result};
use broker::Broker;
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use live::LiveAnalytics;
use server::AppState;
use std::sync::Arc;
use std::time::Duration;
use store::{MemoryStore, Store};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging starts so `general.verbose` can apply
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &config)?;

    info!("FormPulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    if let Err(e) = run(config).await {
        error!("Server failed: {:#}", e);
        eprintln!("\nError: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .formpulse.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the port, allowed origin, data file, and more.");
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the CLI level.
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load the config file (explicit path, then the default location) and
/// apply CLI overrides.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(Some(config)) => config,
            Ok(None) => Config::default(),
            Err(e) => {
                eprintln!("Warning: ignoring {}: {:#}", DEFAULT_CONFIG_FILE, e);
                Config::default()
            }
        }
    };

    config.merge_with_args(args);
    Ok(config)
}

/// Open the configured store, seed it if asked, and serve until a shutdown
/// signal arrives.
async fn run(config: Config) -> Result<()> {
    let store: Arc<dyn Store> = match config.store.data_file {
        Some(ref path) => {
            info!("Using data file: {}", path.display());
            Arc::new(
                MemoryStore::open(path)
                    .with_context(|| format!("Failed to open data file: {}", path.display()))?,
            )
        }
        None => {
            info!("No data file configured, data is kept in memory only");
            Arc::new(MemoryStore::in_memory())
        }
    };

    if config.seed.on_startup {
        let form = seed::seed_demo(store.as_ref(), config.seed.responses)
            .context("Failed to seed demo data")?;
        info!(
            "Demo form ready: /api/forms/{}/analytics/stream",
            form.id
        );
    }

    let broker = Broker::new();
    let live = LiveAnalytics::new(store, broker.clone());
    let state = AppState::new(
        live,
        Duration::from_secs(config.server.keep_alive_secs.max(1)),
        config.seed.responses,
    );
    let router = server::build_router(state, &config.server)?;

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!(
        "Listening on http://{} (allowed origin: {})",
        listener.local_addr()?,
        config.server.allowed_origin
    );

    server::serve(listener, router, async move {
        shutdown_signal().await;
        let closed = broker.close_all();
        info!("Shutting down, closed {} analytics stream(s)", closed);
    })
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
