//! vaultsync Gateway Binary
//!
//! # Usage
//! ```bash
//! vaultsync-gateway [--port 8088] [--host 127.0.0.1] [--db-path vault-store.db] [--verbose]
//! ```

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vaultsync_gateway::{Gateway, GatewayConfig};

/// vaultsync Gateway - versioned encrypted vault store over HTTP
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on (default: 8088, or VAULTSYNC_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (default: 127.0.0.1, or VAULTSYNC_HOST)
    #[arg(long)]
    host: Option<String>,

    /// JSON configuration file; replaces environment configuration
    #[arg(short, long)]
    config: Option<String>,

    /// SQLite database path
    #[arg(long)]
    db_path: Option<String>,

    /// Legacy JSON snapshot imported into an empty database
    #[arg(long)]
    legacy_snapshot: Option<String>,

    /// Append audit records to this JSONL file
    #[arg(long)]
    audit_log: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(args.verbose)
        .with_thread_ids(args.verbose)
        .init();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading config file {}", path))?,
        None => GatewayConfig::from_env().context("reading environment")?,
    };
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(path) = args.db_path {
        config = config.with_db_path(path);
    }
    if let Some(path) = args.legacy_snapshot {
        config = config.with_legacy_snapshot(path);
    }
    if let Some(path) = args.audit_log {
        config = config.with_audit_log(path);
    }
    config.validate().context("invalid configuration")?;

    print_banner(&config);

    let gateway = tokio::task::spawn_blocking(move || Gateway::open(config))
        .await?
        .context("opening vault store")?;
    gateway.start().await?;

    Ok(())
}

fn print_banner(config: &GatewayConfig) {
    println!();
    println!("vaultsync gateway v{}", vaultsync_gateway::VERSION);
    println!();
    println!("HTTP Endpoints (http://{}:{})", config.host, config.port);
    println!("   ├─ GET  /healthz             — Health check");
    println!("   ├─ GET  /v1/vaults/:user_id  — Read vault");
    println!("   └─ PUT  /v1/vaults/:user_id  — Replace vault (optimistic concurrency)");
    println!();
    println!("Storage");
    println!("   ├─ database: {}", config.storage.db_path);
    println!(
        "   └─ legacy snapshot: {}",
        config.storage.legacy_snapshot_path.as_deref().unwrap_or("-")
    );
    println!();
    println!(
        "Rate limit: {} requests / {}s per client",
        config.security.rate_limit_permits, config.security.rate_limit_window_secs
    );
    println!();
}
