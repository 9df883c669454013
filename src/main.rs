//! CAREWATCH — Home Routine Intelligence daemon
//!
//! Single-process service: loads the config, opens and migrates the store,
//! wires the alert manager to the Telegram backend, and runs every scheduled
//! job until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! carewatch --config /etc/carewatch.toml
//! RUST_LOG=debug carewatch --db ./data/test.db
//! ```
//!
//! # Environment Variables
//!
//! - `CAREWATCH_CONFIG`: config file path (when `--config` is not given)
//! - `CAREWATCH_BOT_TOKEN`: Telegram bot token override
//! - `CAREWATCH_DB_PATH`: database path override
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use carewatch::alerter::{AlertManager, Notifier, TelegramNotifier};
use carewatch::config::AppConfig;
use carewatch::jobs::{self, scheduler::Scheduler, JobContext};
use carewatch::store::Store;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "carewatch")]
#[command(about = "CAREWATCH Home Routine Intelligence")]
#[command(version)]
struct CliArgs {
    /// Path to the TOML config file (overrides CAREWATCH_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long)]
    db: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Configuration invariant violations are fatal before anything runs.
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path).context("failed to load configuration")?,
        None => AppConfig::load().context("failed to load configuration")?,
    };
    if let Some(db) = args.db {
        config.database.path = db;
    }

    if args.print_config {
        println!(
            "{}",
            toml::to_string_pretty(&config).context("failed to render configuration")?
        );
        return Ok(());
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  CAREWATCH — Home Routine Intelligence");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = Store::open(&config.database.path).context("failed to open store")?;

    let config = Arc::new(config);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(
        &config.messenger.bot_token,
        config.messenger.chat_ids.clone(),
    ));
    let manager = Arc::new(AlertManager::new(
        store.clone(),
        Arc::clone(&notifier),
        Arc::clone(&config),
    ));

    let ctx = JobContext {
        store,
        config: Arc::clone(&config),
        manager,
        notifier,
    };

    let mut scheduler = Scheduler::new();
    jobs::register_all(&mut scheduler, &ctx);

    // Graceful shutdown on Ctrl+C.
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let mut tasks = JoinSet::new();
    scheduler.spawn_all(&mut tasks, &cancel_token);

    // Supervisor: a finished job task before cancellation means something
    // went wrong enough to stop the process.
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(job_id) => {
                if !cancel_token.is_cancelled() {
                    error!(job_id, "scheduled job exited unexpectedly, shutting down");
                    cancel_token.cancel();
                }
            }
            Err(err) => {
                error!(error = %err, "scheduled job panicked, shutting down");
                cancel_token.cancel();
            }
        }
    }

    info!("✓ CAREWATCH shutdown complete");
    Ok(())
}
