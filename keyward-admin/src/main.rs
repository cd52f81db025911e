//! Keyward admin dispatcher
//!
//! Runs one license command against the ledger database and prints the
//! reply a chat user would see.
//!
//! Usage:
//!   keyward-admin --as owner generate 10
//!   keyward-admin --as alice redeem 12345678901
//!   keyward-admin --as confirm-bot confirm --message "User: alice Client ID: HW-1 Script Key: 12345678901"

use anyhow::{Context, Result};
use clap::Parser;
use keyward_admin::{dispatch, AccessPolicy, AdminConfig, Command};
use keyward_license::LicenseService;
use keyward_storage::SqliteBackend;
use keyward_types::Identity;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "keyward-admin")]
#[command(about = "Keyward license key ledger")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "keyward.toml")]
    config: PathBuf,

    /// Ledger database path (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Identity the command runs as
    #[arg(long = "as", value_name = "IDENTITY")]
    caller: Identity,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(verbose: bool) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        let level = if verbose { Level::DEBUG } else { Level::INFO };
        builder.with_max_level(level).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = AdminConfig::load(&args.config)?;
    if let Some(db) = args.db {
        config.database = db;
    }
    let policy = AccessPolicy::from_config(&config.access)?;

    debug!(path = %config.database.display(), "opening ledger");
    let backend = SqliteBackend::open(&config.database)
        .with_context(|| format!("Failed to open ledger {}", config.database.display()))?;
    let service = LicenseService::new(Arc::new(backend), config.license.clone())
        .context("Invalid license configuration")?;

    let reply = dispatch(&service, &policy, &args.caller, args.command).await?;
    println!("{reply}");

    service.shutdown().context("Failed to flush ledger")?;
    Ok(())
}
