//! The storage node binary: registers with the coordinator, starts the
//! heartbeat sender, and serves client traffic and coordinator-issued
//! node control on their own listening ports (spec.md S4.2, S6).

use clap::Parser;
use distfs::config::{self, StorageConfig};
use distfs::storage::{heartbeat, server, StorageEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Storage node for the distributed text file service.
#[derive(Parser, Debug)]
#[command(name = "distfs-storage-node")]
struct Args {
    /// Path to a TOML config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Unique node identifier; required unless set in the config file.
    #[arg(long)]
    node_id: Option<String>,

    /// Port this node listens on for direct client traffic.
    #[arg(long)]
    client_port: Option<u16>,

    /// Port this node listens on for coordinator-issued node control
    /// (ACL grants, EXEC's content fetch, DELETE propagation).
    #[arg(long)]
    node_coord_port: Option<u16>,

    /// Coordinator host to register and heartbeat against.
    #[arg(long)]
    coordinator_host: Option<String>,

    /// Coordinator port to register and heartbeat against.
    #[arg(long)]
    coordinator_port: Option<u16>,

    /// Overrides the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let mut cfg: StorageConfig = config::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("warning: {e}, using defaults");
        StorageConfig::default()
    });
    if let Some(node_id) = args.node_id {
        cfg.node_id = node_id;
    }
    if let Some(port) = args.client_port {
        cfg.client_port = port;
    }
    if let Some(port) = args.node_coord_port {
        cfg.node_coord_port = port;
    }
    if let Some(host) = args.coordinator_host {
        cfg.coordinator_host = host;
    }
    if let Some(port) = args.coordinator_port {
        cfg.coordinator_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = data_dir;
    }

    if cfg.node_id.is_empty() {
        eprintln!("error: node_id is required (pass --node-id or set it in the config file)");
        std::process::exit(1);
    }
    if cfg.client_port == 0 {
        eprintln!("error: client_port is required (pass --client-port or set it in the config file)");
        std::process::exit(1);
    }
    if cfg.node_coord_port == 0 {
        eprintln!("error: node_coord_port is required (pass --node-coord-port or set it in the config file)");
        std::process::exit(1);
    }

    distfs::logging::init("storage", &cfg.data_dir.join("logs"));

    let engine = Arc::new(StorageEngine::new(cfg.node_id.clone(), cfg));
    engine.ensure_dirs()?;

    if let Err(e) = heartbeat::register(&engine).await {
        tracing::error!(error = %e, "failed to register with coordinator");
        std::process::exit(1);
    }
    let heartbeat_handle = heartbeat::spawn(engine.clone());

    let client_listener = TcpListener::bind(("0.0.0.0", engine.config.client_port)).await?;
    let coord_listener = TcpListener::bind(("0.0.0.0", engine.config.node_coord_port)).await?;
    tracing::info!(
        node_id = %engine.node_id,
        client_port = engine.config.client_port,
        node_coord_port = engine.config.node_coord_port,
        "storage node listening"
    );

    let serve_result = server::serve(engine, client_listener, coord_listener).await;
    heartbeat_handle.abort();
    serve_result
}
