//! The coordinator: registry of files, users, storage nodes, and
//! sentence leases (spec.md S4.1).

pub mod health;
pub mod node_client;
pub mod persistence;
pub mod registry;
pub mod server;

use crate::config::CoordinatorConfig;
use crate::error::{ErrorCode, ServerError, Result};
use registry::{now, AccessRequest, FileRecord, NodeRecord, Registries, SentenceLease, UserRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;

/// Endpoint of a storage node, as handed back to clients after
/// CREATE/READ-redirect/LOCK-ACQUIRE.
pub struct NodeEndpoint {
    pub host: String,
    pub client_port: u16,
}

/// All coordinator state: the registries behind one coarse mutex, plus
/// a bounded recent-lookup cache (spec.md S4.1's LRU).
///
/// The registry mutex is a plain [`std::sync::Mutex`] (critical
/// sections are synchronous, CPU-bound map operations — never held
/// across an `.await`); the EXEC temp-directory operations that do
/// span awaits use their own async mutex to serialize writes to the
/// shared scratch directory without blocking unrelated registry reads.
pub struct CoordinatorState {
    pub config: CoordinatorConfig,
    registries: Mutex<Registries>,
    cache: moka::sync::Cache<String, String>,
    exec_lock: AsyncMutex<()>,
    exec_counter: AtomicU64,
}

impl CoordinatorState {
    pub fn new(config: CoordinatorConfig) -> Self {
        let cache = moka::sync::Cache::new(config.lru_capacity);
        Self {
            config,
            registries: Mutex::new(Registries::default()),
            cache,
            exec_lock: AsyncMutex::new(()),
            exec_counter: AtomicU64::new(0),
        }
    }

    /// Replays `data/file_registry.txt` to repopulate state at
    /// startup (spec.md S4.1).
    pub fn load_registry(&self) -> std::io::Result<()> {
        let records = persistence::load(&self.config.data_dir)?;
        let mut reg = self.registries.lock().unwrap();
        for r in records {
            tracing::info!(filename = %r.filename, owner = %r.owner, node = %r.node_id, "loaded file from registry");
            reg.files.insert(r.filename.clone(), r);
        }
        Ok(())
    }

    /// Locks the shared registries for the duration of the returned
    /// guard. Used by [`super::coordinator::health`]'s sweep, which
    /// lives in a sibling module and needs direct access to iterate
    /// `NodeRecord`s.
    pub(crate) fn registries_lock(&self) -> std::sync::MutexGuard<'_, Registries> {
        self.registries.lock().unwrap()
    }

    fn persist(&self) {
        let records: Vec<FileRecord> = {
            let reg = self.registries.lock().unwrap();
            reg.files.values().cloned().collect()
        };
        if let Err(e) = persistence::save(&self.config.data_dir, records.into_iter()) {
            tracing::error!(error = %e, "failed to persist file registry");
        }
    }

    // --- registration -----------------------------------------------

    pub fn register_node(&self, node_id: &str, host: &str, coord_port: u16, client_port: u16) {
        let mut reg = self.registries.lock().unwrap();
        let replica = reg.node_registration_order.last().cloned();
        if let Some(prev_id) = &replica {
            if let Some(prev) = reg.nodes.get_mut(prev_id) {
                prev.replica_node_id = Some(node_id.to_string());
            }
        }
        reg.nodes.insert(
            node_id.to_string(),
            NodeRecord {
                node_id: node_id.to_string(),
                host: host.to_string(),
                coord_port,
                client_port,
                connected: true,
                last_heartbeat: now(),
                file_count: 0,
                replica_node_id: replica.clone(),
            },
        );
        reg.node_registration_order.push(node_id.to_string());
        tracing::info!(node_id, host, client_port, replica = ?replica, "storage node registered");
    }

    pub fn register_user(&self, username: &str, address: &str) {
        let mut reg = self.registries.lock().unwrap();
        reg.users.insert(
            username.to_string(),
            UserRecord { username: username.to_string(), address: address.to_string(), registered: now() },
        );
        tracing::info!(username, address, "user registered");
    }

    pub fn heartbeat(&self, node_id: &str, file_count: u64) -> Result<()> {
        let mut reg = self.registries.lock().unwrap();
        let node = reg
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "unknown node id"))?;
        if !node.connected {
            tracing::info!(node_id, "storage node recovered");
        }
        node.connected = true;
        node.last_heartbeat = now();
        node.file_count = file_count;
        Ok(())
    }

    // --- views --------------------------------------------------------

    pub fn view(&self) -> Vec<FileRecord> {
        let reg = self.registries.lock().unwrap();
        reg.files.values().cloned().collect()
    }

    pub fn list_users(&self) -> Vec<String> {
        let reg = self.registries.lock().unwrap();
        reg.users.keys().cloned().collect()
    }

    // --- file lifecycle -------------------------------------------------

    pub fn create(&self, filename: &str, owner: &str) -> Result<NodeEndpoint> {
        let mut reg = self.registries.lock().unwrap();
        if reg.files.contains_key(filename) {
            return Err(ServerError::new(ErrorCode::FileExists, format!("file {filename} already exists")));
        }
        let node = reg
            .pick_placement_node()
            .ok_or_else(|| ServerError::new(ErrorCode::NoNodes, "no storage nodes available"))?
            .clone();

        let endpoint = NodeEndpoint { host: node.host.clone(), client_port: node.client_port };

        reg.files.insert(
            filename.to_string(),
            FileRecord {
                filename: filename.to_string(),
                owner: owner.to_string(),
                node_id: node.node_id.clone(),
                created: now(),
                modified: now(),
                accessed: now(),
                last_accessed_by: owner.to_string(),
                word_count: 0,
                char_count: 0,
            },
        );
        if let Some(n) = reg.nodes.get_mut(&node.node_id) {
            n.file_count += 1;
        }
        drop(reg);
        self.persist();
        tracing::info!(filename, owner, node_id = %node.node_id, "file created");
        Ok(endpoint)
    }

    /// Resolves `filename` to its hosting node's endpoint, consulting
    /// the LRU cache first (spec.md S4.1).
    pub fn resolve(&self, filename: &str) -> Result<NodeEndpoint> {
        let reg = self.registries.lock().unwrap();

        let node_id = if let Some(id) = self.cache.get(filename) {
            id
        } else {
            let record = reg
                .files
                .get(filename)
                .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found")))?;
            self.cache.insert(filename.to_string(), record.node_id.clone());
            record.node_id.clone()
        };

        let node = reg
            .nodes
            .get(&node_id)
            .ok_or_else(|| ServerError::new(ErrorCode::StorageDown, "hosting node unknown"))?;
        if !node.connected {
            return Err(ServerError::new(ErrorCode::StorageDown, format!("node {node_id} is down")));
        }
        Ok(NodeEndpoint { host: node.host.clone(), client_port: node.client_port })
    }

    pub async fn delete(&self, filename: &str, username: &str) -> Result<()> {
        let (owner, node) = {
            let reg = self.registries.lock().unwrap();
            let record = reg
                .files
                .get(filename)
                .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found")))?;
            if record.owner != username {
                return Err(ServerError::new(ErrorCode::Unauthorized, "only the owner may delete this file"));
            }
            let node = reg.nodes.get(&record.node_id).cloned();
            (record.owner.clone(), node)
        };

        if let Some(node) = node {
            if node.connected {
                if let Err(e) = node_client::request_delete(&node.host, node.coord_port, &owner, filename).await {
                    tracing::warn!(filename, error = %e, "best-effort delete propagation to storage node failed");
                }
            }
        }

        let mut reg = self.registries.lock().unwrap();
        reg.files.remove(filename);
        self.cache.invalidate(filename);
        drop(reg);
        self.persist();
        tracing::info!(filename, username, "file deleted from registry");
        Ok(())
    }

    // --- sentence leases -------------------------------------------------

    pub fn lock_acquire(&self, filename: &str, sentence_index: u32, username: &str) -> Result<NodeEndpoint> {
        let mut reg = self.registries.lock().unwrap();
        let node_id = reg
            .files
            .get(filename)
            .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found")))?
            .node_id
            .clone();

        // Resolve and health-check the hosting node *before* granting
        // the lease: if the node turns out to be unreachable, the
        // lease must never exist in the first place, or the caller
        // (who sees this as a failed acquire and never releases) would
        // leak a lease that locks the sentence for everyone else until
        // the node recovers and someone manually releases it.
        let node = reg
            .nodes
            .get(&node_id)
            .cloned()
            .ok_or_else(|| ServerError::new(ErrorCode::StorageDown, "hosting node unknown"))?;
        if !node.connected {
            return Err(ServerError::new(ErrorCode::StorageDown, format!("node {node_id} is down")));
        }

        let key = (filename.to_string(), sentence_index);
        match reg.leases.get(&key) {
            None => {
                reg.leases.insert(key, SentenceLease { holder: username.to_string(), granted: now() });
            }
            Some(lease) if lease.holder == username => {
                // Re-entrant: the same holder may re-acquire.
            }
            Some(lease) => {
                return Err(ServerError::new(
                    ErrorCode::FileLocked,
                    format!("sentence {sentence_index} of {filename} held by {}", lease.holder),
                ));
            }
        }

        Ok(NodeEndpoint { host: node.host, client_port: node.client_port })
    }

    pub fn lock_release(&self, filename: &str, sentence_index: u32, username: &str) -> Result<()> {
        let mut reg = self.registries.lock().unwrap();
        let key = (filename.to_string(), sentence_index);
        match reg.leases.get(&key) {
            None => Err(ServerError::new(ErrorCode::InvalidParameters, "no such lease")),
            Some(lease) if lease.holder != username => {
                Err(ServerError::new(ErrorCode::Unauthorized, "lease is held by another user"))
            }
            Some(_) => {
                reg.leases.remove(&key);
                Ok(())
            }
        }
    }

    /// Releases every lease held by `username`, called when their
    /// connection drops (SPEC_FULL.md S11).
    pub fn release_all_leases_for(&self, username: &str) {
        let mut reg = self.registries.lock().unwrap();
        let before = reg.leases.len();
        reg.leases.retain(|_, lease| lease.holder != username);
        let released = before - reg.leases.len();
        if released > 0 {
            tracing::info!(username, released, "released leases on disconnect");
        }
    }

    // --- access requests -------------------------------------------------

    pub fn request_access(&self, filename: &str, requester: &str) -> Result<()> {
        let mut reg = self.registries.lock().unwrap();
        let owner = reg
            .files
            .get(filename)
            .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found")))?
            .owner
            .clone();
        reg.access_requests.insert(
            (filename.to_string(), requester.to_string()),
            AccessRequest {
                filename: filename.to_string(),
                requester: requester.to_string(),
                owner,
                requested: now(),
                pending: true,
                granted: false,
            },
        );
        Ok(())
    }

    /// Returns the pending requests against files owned by `username`.
    pub fn view_requests(&self, username: &str) -> Vec<AccessRequest> {
        let reg = self.registries.lock().unwrap();
        reg.access_requests
            .values()
            .filter(|r| r.pending && r.owner == username)
            .cloned()
            .collect()
    }

    pub async fn approve(&self, filename: &str, requester: &str, owner: &str) -> Result<()> {
        let node = {
            let reg = self.registries.lock().unwrap();
            let request = reg
                .access_requests
                .get(&(filename.to_string(), requester.to_string()))
                .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "no such access request"))?;
            if request.owner != owner {
                return Err(ServerError::new(ErrorCode::Unauthorized, "only the file owner may approve"));
            }
            let record = reg
                .files
                .get(filename)
                .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found")))?;
            reg.nodes
                .get(&record.node_id)
                .cloned()
                .ok_or_else(|| ServerError::new(ErrorCode::StorageDown, "hosting node unknown"))?
        };
        if !node.connected {
            return Err(ServerError::new(ErrorCode::StorageDown, format!("node {} is down", node.node_id)));
        }

        node_client::grant_read_access(&node.host, node.coord_port, owner, filename, requester).await?;

        let mut reg = self.registries.lock().unwrap();
        if let Some(request) = reg.access_requests.get_mut(&(filename.to_string(), requester.to_string())) {
            request.pending = false;
            request.granted = true;
        }
        Ok(())
    }

    pub fn deny(&self, filename: &str, requester: &str, owner: &str) -> Result<()> {
        let mut reg = self.registries.lock().unwrap();
        let request = reg
            .access_requests
            .get_mut(&(filename.to_string(), requester.to_string()))
            .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "no such access request"))?;
        if request.owner != owner {
            return Err(ServerError::new(ErrorCode::Unauthorized, "only the file owner may deny"));
        }
        request.pending = false;
        request.granted = false;
        Ok(())
    }

    // --- EXEC --------------------------------------------------------------

    /// Fetches `filename` from its hosting node, runs it, and returns
    /// the combined stdout/stderr and exit status (spec.md S4.1,
    /// SPEC_FULL.md S11). Concurrent EXECs use distinct temp names; the
    /// `exec_lock` only serializes the directory `create`/`remove`
    /// bookkeeping, not the child process itself.
    pub async fn exec(&self, filename: &str, username: &str) -> Result<(String, i32)> {
        let endpoint = self.resolve(filename)?;
        let content =
            node_client::fetch_content(&endpoint.host, endpoint.client_port, username, filename).await?;

        let ordinal = self.exec_counter.fetch_add(1, Ordering::Relaxed);
        let temp_dir = self.config.data_dir.join("exec_tmp");
        let temp_path = {
            let _guard = self.exec_lock.lock().await;
            tokio::fs::create_dir_all(&temp_dir).await?;
            let path = temp_dir.join(format!("{}-{}-{}", std::process::id(), ordinal, filename));
            tokio::fs::write(&path, &content).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = tokio::fs::metadata(&path).await?.permissions();
                perms.set_mode(0o755);
                tokio::fs::set_permissions(&path, perms).await?;
            }
            path
        };

        let output = tokio::process::Command::new(&temp_path).output().await;
        tokio::fs::remove_file(&temp_path).await.ok();

        let output = output?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            combined.push_str("\n--- stderr ---\n");
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
        }
        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            return Err(ServerError::new(ErrorCode::ExecFailed, combined));
        }
        Ok((combined, code))
    }
}
