//! In-memory registries owned by the coordinator (spec.md S3, S9).
//!
//! Per the design notes, the coordinator never stores owning pointers
//! between records: nodes and leases are keyed by plain identifiers
//! (`node_id`, `filename`) and resolved by lookup. A single coarse
//! mutex (held by [`super::CoordinatorState`]) guards all of it, the
//! way `name_server.c` serializes every handler with `registry_lock`.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A known file and the single storage node that currently holds it.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub filename: String,
    pub owner: String,
    pub node_id: String,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub last_accessed_by: String,
    pub word_count: u64,
    pub char_count: u64,
}

/// A registered client.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub address: String,
    pub registered: u64,
}

/// A registered storage node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub node_id: String,
    pub host: String,
    pub coord_port: u16,
    pub client_port: u16,
    pub connected: bool,
    pub last_heartbeat: u64,
    pub file_count: u64,
    pub replica_node_id: Option<String>,
}

/// A sentence-granularity write lease, keyed by `(filename,
/// sentence_index)` in [`Registries::leases`].
#[derive(Debug, Clone)]
pub struct SentenceLease {
    pub holder: String,
    pub granted: u64,
}

/// A pending or resolved access request, keyed by `(filename,
/// requester)` in [`Registries::access_requests`].
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub filename: String,
    pub requester: String,
    pub owner: String,
    pub requested: u64,
    pub pending: bool,
    pub granted: bool,
}

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// All coordinator-owned state, guarded by one mutex in
/// [`super::CoordinatorState`].
#[derive(Default)]
pub struct Registries {
    pub files: HashMap<String, FileRecord>,
    pub users: HashMap<String, UserRecord>,
    pub nodes: HashMap<String, NodeRecord>,
    /// Registration order of node ids, used to break file_count ties
    /// during placement (spec.md S4.1) and to pick the previous node
    /// as a new registrant's replica (SPEC_FULL.md S4.1).
    pub node_registration_order: Vec<String>,
    pub leases: HashMap<(String, u32), SentenceLease>,
    pub access_requests: HashMap<(String, String), AccessRequest>,
}

impl Registries {
    /// Picks the connected node with the fewest declared files, ties
    /// broken by registration order (spec.md S4.1 CREATE placement).
    pub fn pick_placement_node(&self) -> Option<&NodeRecord> {
        self.node_registration_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.connected)
            .min_by_key(|n| n.file_count)
    }
}
