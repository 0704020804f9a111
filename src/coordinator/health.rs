//! Background health monitor (spec.md S4.1).
//!
//! Wakes on a fixed cadence and clears `connected` on any
//! [`super::registry::NodeRecord`] whose last heartbeat has lapsed
//! past the liveness threshold, logging the event. Mirrors
//! `heartbeat_monitor` in
//! `examples/original_source/osn_final/project-main/src/name_server.c`,
//! which polls every 10s and declares a node down past a 30s gap.

use super::registry::now;
use super::CoordinatorState;
use std::sync::Arc;

/// Spawns the health monitor loop, returning its join handle so the
/// binary can track it alongside the accept loop.
pub fn spawn(state: Arc<CoordinatorState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.heartbeat_interval());
        loop {
            interval.tick().await;
            state.sweep_dead_nodes();
        }
    })
}

impl CoordinatorState {
    /// One sweep: mark every node whose heartbeat has lapsed past the
    /// liveness threshold as disconnected. Does not re-point any
    /// `FileRecord` to a replica (spec.md S9: "no automatic failover
    /// of the hosting-node pointer... is required by this spec").
    pub fn sweep_dead_nodes(&self) {
        let threshold = self.config.liveness_threshold().as_secs();
        let stale: Vec<String> = {
            let mut reg = self.registries_lock();
            let now = now();
            let mut gone = Vec::new();
            for node in reg.nodes.values_mut() {
                if node.connected && now.saturating_sub(node.last_heartbeat) > threshold {
                    node.connected = false;
                    gone.push(node.node_id.clone());
                }
            }
            gone
        };
        for node_id in &stale {
            tracing::warn!(node_id, "storage node marked down: heartbeat lapsed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::error::ErrorCode;

    /// Invariant 8: once a node's last heartbeat lapses past the
    /// liveness threshold, a sweep marks it down and a subsequent
    /// resolve reports `STORAGE_DOWN` instead of the node's endpoint.
    #[test]
    fn sweep_marks_a_stale_node_down_and_resolve_reports_storage_down() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoordinatorConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.liveness_threshold_secs = 30;
        let state = CoordinatorState::new(config);

        state.register_node("node-1", "127.0.0.1", 9000, 9001);
        state.create("notes.txt", "alice").unwrap();

        // Backdate the heartbeat past the liveness threshold without
        // sleeping; this is crate-internal test access, not a public API.
        {
            let mut reg = state.registries_lock();
            let node = reg.nodes.get_mut("node-1").unwrap();
            node.last_heartbeat = node.last_heartbeat.saturating_sub(60);
        }

        state.sweep_dead_nodes();

        let err = state.resolve("notes.txt").unwrap_err();
        assert_eq!(err.code, ErrorCode::StorageDown);
    }

    #[test]
    fn connected_node_within_threshold_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = CoordinatorConfig::default();
        config.data_dir = dir.path().to_path_buf();
        let state = CoordinatorState::new(config);

        state.register_node("node-1", "127.0.0.1", 9000, 9001);
        state.create("notes.txt", "alice").unwrap();

        state.sweep_dead_nodes();

        assert!(state.resolve("notes.txt").is_ok());
    }
}
