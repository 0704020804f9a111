//! The coordinator binary: loads config, restores the registry, starts
//! the health monitor and accept loop (spec.md S4.1).

use clap::Parser;
use distfs::config::{self, CoordinatorConfig};
use distfs::coordinator::{health, server, CoordinatorState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Coordinator for the distributed text file service.
#[derive(Parser, Debug)]
#[command(name = "distfs-coordinator")]
struct Args {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the listening port.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let mut cfg: CoordinatorConfig = config::load(args.config.as_deref())
        .unwrap_or_else(|e| {
            eprintln!("warning: {e}, using defaults");
            CoordinatorConfig::default()
        });
    if let Some(port) = args.port {
        cfg.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = data_dir;
    }

    distfs::logging::init("coordinator", &cfg.data_dir.join("logs"));
    std::fs::create_dir_all(&cfg.data_dir)?;

    let state = Arc::new(CoordinatorState::new(cfg));
    if let Err(e) = state.load_registry() {
        tracing::warn!(error = %e, "failed to load existing file registry, starting empty");
    }

    let listener = TcpListener::bind(("0.0.0.0", state.config.port)).await?;
    tracing::info!(port = state.config.port, "coordinator listening");

    let health_handle = health::spawn(state.clone());
    let serve_result = server::serve(state, listener).await;
    health_handle.abort();
    serve_result
}
