//! boothsync command-line tool
//!
//! Runs the kiosk sync engine against a local SQLite database:
//! 1. One-shot commands (`sync`, `status`, `test-connection`)
//! 2. A daemon that syncs on a timer and serves status over HTTP
//!
//! Usage:
//!   boothsync --config sync.json --db kiosk.db sync
//!   boothsync daemon --http-port 4780
//!
//! Settings come from the config file, then `BOOTHSYNC_*` variables, then
//! flags.

use anyhow::{Context, Result};
use boothsync_cli::build_router;
use boothsync_storage::SqliteStateStore;
use boothsync_sync::{SyncNotification, SyncService, SyncSettings};
use boothsync_types::DeviceId;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "boothsync")]
#[command(about = "Keeps photo booth kiosks in sync through a shared store")]
struct Args {
    /// Settings file; created with defaults if missing
    #[arg(short, long, default_value = "boothsync.json", env = "BOOTHSYNC_CONFIG")]
    config: PathBuf,

    /// Kiosk database
    #[arg(long, default_value = "boothsync.db", env = "BOOTHSYNC_DB")]
    db: PathBuf,

    /// Override the device id
    #[arg(long)]
    device_id: Option<String>,

    /// Override the sync interval in minutes
    #[arg(long)]
    interval: Option<u32>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass and print the report
    Sync,
    /// Print the sync status
    Status,
    /// Check that the remote store is reachable
    TestConnection,
    /// Print the effective settings
    ShowConfig,
    /// Sync on a timer and serve the HTTP API
    Daemon {
        /// HTTP API port
        #[arg(long, default_value = "4780")]
        http_port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let settings = load_settings(&args)?;
    if let Command::ShowConfig = args.command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(ExitCode::SUCCESS);
    }

    let store = SqliteStateStore::open(&args.db)
        .with_context(|| format!("Failed to open database {}", args.db.display()))?;
    let service = Arc::new(
        SyncService::connect(&settings, Arc::new(store))
            .await
            .context("Failed to set up sync")?,
    );

    match args.command {
        Command::Sync => {
            let result = service.sync().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                warn!("{}", result.summary());
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&service.get_sync_status())?);
        }
        Command::TestConnection => {
            if service.test_connection().await {
                println!("Remote store reachable");
            } else {
                println!("Remote store unreachable");
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Daemon { http_port } => run_daemon(service, &settings, http_port).await?,
        Command::ShowConfig => {}
    }
    Ok(ExitCode::SUCCESS)
}

/// Reads the settings file (writing defaults on first start so the
/// generated device id sticks), then applies environment and flags.
fn load_settings(args: &Args) -> Result<SyncSettings> {
    let mut settings = if args.config.exists() {
        SyncSettings::load(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else {
        let settings = SyncSettings::default();
        save_defaults(&settings, &args.config)?;
        settings
    };

    settings.apply_env().context("Invalid BOOTHSYNC_* variable")?;
    if let Some(id) = &args.device_id {
        settings.device_id = DeviceId::new(id.clone());
    }
    if let Some(minutes) = args.interval {
        settings.interval_minutes = minutes;
    }
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn save_defaults(settings: &SyncSettings, path: &Path) -> Result<()> {
    settings
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default settings to {}", path.display());
    Ok(())
}

async fn run_daemon(service: Arc<SyncService>, settings: &SyncSettings, http_port: u16) -> Result<()> {
    service.subscribe(|event| match event {
        SyncNotification::SyncStarted => info!("Sync started"),
        SyncNotification::PhaseChanged { phase } => debug!("Sync phase {:?}", phase),
        SyncNotification::SyncProgress { message, percent } => debug!("[{:>3}%] {}", percent, message),
        SyncNotification::EntityUpdating { natural_key, .. } => debug!("Updating {}", natural_key),
        SyncNotification::SyncCompleted { result } => info!("Sync finished: {}", result.summary()),
    });
    service.start();

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", http_port))
        .await
        .with_context(|| format!("Failed to bind HTTP port {http_port}"))?;
    let app = build_router(Arc::clone(&service));

    println!("\n========================================");
    println!("  boothsync daemon running");
    println!("========================================");
    println!("  Device:    {}", settings.device_id);
    println!("  Interval:  {} min", settings.interval_minutes);
    println!("  HTTP Port: {}", http_port);
    println!("========================================\n");

    info!("HTTP API listening on port {}", http_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    service.stop();
    Ok(())
}
