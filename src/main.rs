//! TableSync - Table replication between analytics dashboard instances
//!
//! Pulls replicated tables from peer instances on a schedule and serves
//! this instance's tables to them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablesync::api::HttpServer;
use tablesync::config::TableSyncConfig;
use tablesync::error::Result;
use tablesync::network::PeerClient;
use tablesync::store::Store;
use tablesync::sync::SyncCoordinator;

/// TableSync - Table replication between dashboard instances
#[derive(Parser)]
#[command(name = "tablesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tablesync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start periodic syncing and the retrieval API
    Start,

    /// Run a single sweep over all sources and exit
    Sweep,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "tablesync.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show instance information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config level is only known once the file is read
    let configured_level = TableSyncConfig::from_file(&cli.config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.log_level.as_deref().unwrap_or(&configured_level));

    match cli.command {
        Commands::Start => run_start(cli.config).await,
        Commands::Sweep => run_sweep(cli.config).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open every store and register tables and sources
fn build_coordinator(config: &TableSyncConfig) -> Result<SyncCoordinator> {
    let local = match Store::open(&config.store.path, "local") {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open local store {:?}: {}", config.store.path, e);
            return Err(e);
        }
    };

    let client = PeerClient::new(Duration::from_secs(10), config.request_timeout())?;

    let mut coordinator = SyncCoordinator::from_config(config)?;
    tablesync::tables::register_all(&mut coordinator, local, client);

    for source in &config.sync.sources {
        let store = match Store::open(&source.database, source.label.clone()) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!("Failed to open store for source {}: {}", source.label, e);
                return Err(e);
            }
        };
        if source.is_passive() {
            tracing::info!("Source {} has no url, keeping it for comparison only", source.label);
        }
        coordinator.add_source(source.url.clone(), store, source.label.clone());
    }

    tracing::info!(
        "Registered {} tables and {} sources",
        coordinator.tables().len(),
        coordinator.registered_sources().len()
    );

    Ok(coordinator)
}

/// Start syncing and serving until Ctrl+C
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting TableSync...");

    let config = match TableSyncConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };

    let coordinator = Arc::new(build_coordinator(&config)?);
    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&coordinator));

    let http_server_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sync_coordinator = Arc::clone(&coordinator);
    let mut sync_handle = tokio::spawn(async move {
        sync_coordinator.start_syncing(shutdown_rx).await;
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            // A sweep in progress runs to completion
            if let Err(e) = sync_handle.await {
                tracing::error!("Sync task failed: {}", e);
            }
        }
        result = &mut sync_handle => {
            if let Err(e) = result {
                tracing::error!("Sync task failed: {}", e);
            }
            // Sync disabled; keep serving until Ctrl+C
            if config.api.enabled {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Received shutdown signal");
            }
        }
    }

    http_server_handle.abort();
    tracing::info!("TableSync shutdown complete");
    Ok(())
}

/// Run one sweep and print its report
async fn run_sweep(config_path: PathBuf) -> Result<()> {
    let config = TableSyncConfig::from_file(&config_path)?;
    let coordinator = build_coordinator(&config)?;

    let report = coordinator.run_sweep().await;

    println!("Sweep {} finished in {:.3}s", report.sweep_id, report.elapsed.as_secs_f64());
    println!();
    println!("{:<20} {:<12} {:<10} {:<10} {}", "SOURCE", "TABLE", "RECEIVED", "NEW", "RESULT");
    println!("{}", "-".repeat(70));
    for result in &report.results {
        match &result.outcome {
            Ok(outcome) => println!(
                "{:<20} {:<12} {:<10} {:<10} {:?}",
                result.source, result.table, outcome.received, outcome.records, outcome.completion
            ),
            Err(e) => println!(
                "{:<20} {:<12} {:<10} {:<10} {}",
                result.source, result.table, "-", "-", e
            ),
        }
    }

    if report.failed() > 0 {
        return Err(tablesync::Error::Internal(format!(
            "{} of {} pairs failed",
            report.failed(),
            report.results.len()
        )));
    }
    Ok(())
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# TableSync Configuration
# Generated configuration file

[store]
path = "/var/lib/tablesync/local.db"

[sync]
enabled = true
period_minutes = 30
page_size = 1000
max_attempts = 3
retry_delay_ms = 1000
request_timeout_secs = 30

# [[sync.sources]]
# label = "mainnet-eu"
# url = "http://eu.example.com:7777"
# database = "/var/lib/tablesync/mainnet-eu.db"

# A source without url is kept for offline comparison only
# [[sync.sources]]
# label = "archive"
# database = "/var/lib/tablesync/archive.db"

[api]
enabled = true
bind_address = "0.0.0.0:7777"
cors_enabled = false

[logging]
level = "info"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nAdd the peers to pull from under [[sync.sources]].");
    println!("Then start with: tablesync --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match TableSyncConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Store: {}", config.store.path.display());
            println!("  Sync enabled: {}", config.sync.enabled);
            println!("  Sources: {} ({} active)", config.sync.sources.len(), config.active_sources());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show instance information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = TableSyncConfig::from_file(&config_path)?;

    println!("TableSync Instance Information");
    println!("==============================");
    println!();
    println!("Local Store:      {}", config.store.path.display());
    println!("API:              {} (enabled: {})", config.api.bind_address, config.api.enabled);
    println!();
    println!("Sync Configuration:");
    println!("  Enabled:        {}", config.sync.enabled);
    println!("  Period:         {} min", config.sync.period_minutes);
    println!("  Page Size:      {}", config.sync.page_size);
    println!("  Attempts:       {}", config.sync.max_attempts);
    println!("  Retry Delay:    {} ms", config.sync.retry_delay_ms);
    println!();
    println!("Sources:");
    for source in &config.sync.sources {
        let url = if source.is_passive() { "(passive)" } else { source.url.as_str() };
        println!("  {:<16} {:<40} {}", source.label, url, source.database.display());
    }

    Ok(())
}
