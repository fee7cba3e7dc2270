//! SyncCtl - Command line tool for inspecting TableSync instances
//!
//! Usage:
//!   syncctl tables                 - Show shared tables and sources
//!   syncctl health                 - Check that an instance responds
//!   syncctl fetch mempool --take 5 - Pull one page of a table

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use tablesync::api::{HealthResponse, SyncInfoResponse};
use tablesync::config::TableSyncConfig;
use tablesync::sync::Page;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:7777";

/// TableSync Control Tool
#[derive(Parser)]
#[command(name = "syncctl")]
#[command(about = "Inspect TableSync instances", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tablesync.toml")]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables and sources an instance knows about
    Tables,
    /// Show health of an instance
    Health,
    /// Fetch one page of a table the way a peer would
    Fetch {
        /// Table name (e.g. mempool, vsp_tick)
        table: String,
        /// Cursor; "0" or empty fetches from the beginning
        #[arg(long, default_value = "0")]
        last: String,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 10)]
        take: u64,
        /// Print the raw JSON body instead of a summary
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let endpoint = match &cli.endpoint {
        Some(e) => e.trim_end_matches('/').to_string(),
        None => endpoint_from_config(&cli.config),
    };

    let result = match &cli.command {
        Commands::Tables => list_tables(&endpoint).await,
        Commands::Health => show_health(&endpoint).await,
        Commands::Fetch { table, last, skip, take, raw } => {
            fetch(&endpoint, table, last, *skip, *take, *raw).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Derive the local API endpoint from the config file, if there is one
fn endpoint_from_config(path: &Path) -> String {
    if !path.exists() {
        return DEFAULT_ENDPOINT.to_string();
    }

    match TableSyncConfig::from_file(path) {
        Ok(config) => {
            // Convert bind address to localhost if it's 0.0.0.0
            let addr = config.api.bind_address;
            if addr.starts_with("0.0.0.0") {
                format!("http://127.0.0.1:{}", addr.split(':').nth(1).unwrap_or("7777"))
            } else {
                format!("http://{}", addr)
            }
        }
        Err(_) => DEFAULT_ENDPOINT.to_string(),
    }
}

// ============ Commands ============

async fn list_tables(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/api/sync", endpoint);
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    let info: SyncInfoResponse = response.json().await?;

    println!();
    println!("TableSync Instance (syncctl v{})", env!("CARGO_PKG_VERSION"));
    println!("=================================");
    println!();
    let sharing = if info.enabled {
        "\x1b[32menabled\x1b[0m"
    } else {
        "\x1b[31mdisabled\x1b[0m"
    };
    println!("Data sharing: {}", sharing);
    println!();
    println!("Tables (sync order):");
    for table in &info.tables {
        println!("  {}", table);
    }
    println!();
    println!("Sources:");
    if info.sources.is_empty() {
        println!("  (none)");
    }
    for source in &info.sources {
        println!("  {}", source);
    }
    println!();

    Ok(())
}

async fn show_health(endpoint: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/health", endpoint);
    let client = reqwest::Client::new();

    let response = client.get(&url).send().await?;

    if !response.status().is_success() {
        return Err(format!("API error: {}", response.status()).into());
    }

    let health: HealthResponse = response.json().await?;

    println!("Healthy:      {}", health.healthy);
    println!("Sync enabled: {}", health.sync_enabled);

    Ok(())
}

async fn fetch(
    endpoint: &str,
    table: &str,
    last: &str,
    skip: u64,
    take: u64,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = format!("{}/api/sync/{}", endpoint, table);
    let client = reqwest::Client::new();

    let response = client
        .get(&url)
        .query(&[("last", last.to_string()), ("skip", skip.to_string()), ("take", take.to_string())])
        .send()
        .await?;

    // Error bodies carry the same envelope, so decode regardless of status
    let status = response.status();
    let page: Page = response.json().await?;

    if !page.success {
        return Err(format!(
            "{} ({})",
            page.message.unwrap_or_else(|| "request rejected".to_string()),
            status
        )
        .into());
    }

    if raw {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    let rows: Vec<serde_json::Value> = match &page.records {
        Some(records) => records.decode()?,
        None => Vec::new(),
    };

    println!("Table:       {}", table);
    println!("Total count: {}", page.total_count.unwrap_or(0));
    println!("Returned:    {} (skip {}, take {})", rows.len(), skip, take);
    if let Some(message) = &page.message {
        println!("Message:     {}", message);
    }
    println!();
    for row in &rows {
        println!("{}", row);
    }

    Ok(())
}
