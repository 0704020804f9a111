//! Wire-level end-to-end scenarios from spec.md S8, driven against a
//! real coordinator and a real storage node over loopback TCP — the
//! same path a client takes: resolve at the coordinator, then talk
//! directly to the storage node.
//!
//! Each simulated client keeps one persistent connection per peer, the
//! way a real client would: the coordinator releases a username's
//! sentence leases when its connection drops (SPEC_FULL.md S11), so a
//! fresh connection per command would silently drop leases between
//! calls.

use distfs::config::{CoordinatorConfig, StorageConfig};
use distfs::coordinator::{server as coordinator_server, CoordinatorState};
use distfs::error::ErrorCode;
use distfs::protocol::{self, Command, MsgType, Record};
use distfs::storage::{server as storage_server, StorageEngine};
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// One persistent connection to either the coordinator or a storage
/// node, issuing one record at a time and waiting for its reply.
struct Conn {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
}

impl Conn {
    async fn open(port: u16) -> Self {
        let (read, write) = TcpStream::connect(("127.0.0.1", port)).await.unwrap().into_split();
        Self { read, write }
    }

    async fn send(&mut self, record: Record) -> Record {
        protocol::write_record(&mut self.write, &record).await.unwrap();
        protocol::read_record(&mut self.read).await.unwrap().unwrap()
    }

    async fn command(&mut self, command: Command, username: &str, filename: &str, data: &str) -> Record {
        self.send(Record { msg_type: MsgType::Command, command, error_code: 0, username: username.to_string(), filename: filename.to_string(), data: data.to_string() }).await
    }
}

struct Harness {
    coord_port: u16,
    storage_port: u16,
    _coord_dir: tempfile::TempDir,
    _storage_dir: tempfile::TempDir,
}

/// Binds a storage node's two listeners (client-facing, coordinator-
/// facing — spec.md S6) and spawns its accept loops. Returns the
/// client-facing port, used by tests to open client connections.
async fn spawn_storage_node(engine: Arc<StorageEngine>) -> (u16, u16) {
    let client_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let client_port = client_listener.local_addr().unwrap().port();
    let coord_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let coord_port = coord_listener.local_addr().unwrap().port();
    tokio::spawn(storage_server::serve(engine, client_listener, coord_listener));
    (client_port, coord_port)
}

impl Harness {
    async fn start() -> Self {
        let coord_dir = tempfile::tempdir().unwrap();
        let mut coord_config = CoordinatorConfig::default();
        coord_config.data_dir = coord_dir.path().to_path_buf();
        let coord_state = Arc::new(CoordinatorState::new(coord_config));
        let coord_listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let coord_port = coord_listener.local_addr().unwrap().port();
        tokio::spawn(coordinator_server::serve(coord_state, coord_listener));

        let storage_dir = tempfile::tempdir().unwrap();
        let mut storage_config = StorageConfig::default();
        storage_config.data_dir = storage_dir.path().to_path_buf();
        let engine = Arc::new(StorageEngine::new("node-1".to_string(), storage_config));
        engine.ensure_dirs().unwrap();
        let (storage_port, storage_coord_port) = spawn_storage_node(engine).await;

        let harness = Self { coord_port, storage_port, _coord_dir: coord_dir, _storage_dir: storage_dir };

        let mut registrar = harness.coord_conn().await;
        let reply = registrar
            .send(Record {
                msg_type: MsgType::RegisterNode,
                command: Command::Unknown,
                error_code: 0,
                username: String::new(),
                filename: String::new(),
                data: format!("node-1|127.0.0.1|{storage_coord_port}|{storage_port}"),
            })
            .await;
        assert_eq!(reply.error_code, ErrorCode::Success as u32);

        harness
    }

    async fn coord_conn(&self) -> Conn {
        Conn::open(self.coord_port).await
    }

    async fn storage_conn(&self) -> Conn {
        Conn::open(self.storage_port).await
    }

    async fn register_user(&self, conn: &mut Conn, username: &str) {
        let reply = conn
            .send(Record {
                msg_type: MsgType::RegisterUser,
                command: Command::Unknown,
                error_code: 0,
                username: username.to_string(),
                filename: String::new(),
                data: "client@host".to_string(),
            })
            .await;
        assert_eq!(reply.error_code, ErrorCode::Success as u32);
    }

    async fn register_node(&self, node_id: &str, coord_port: u16, client_port: u16) {
        let mut conn = self.coord_conn().await;
        let reply = conn
            .send(Record {
                msg_type: MsgType::RegisterNode,
                command: Command::Unknown,
                error_code: 0,
                username: String::new(),
                filename: String::new(),
                data: format!("{node_id}|127.0.0.1|{coord_port}|{client_port}"),
            })
            .await;
        assert_eq!(reply.error_code, ErrorCode::Success as u32);
    }
}

/// S1: create + read.
#[tokio::test]
async fn create_then_read() {
    let harness = Harness::start().await;
    let mut coord = harness.coord_conn().await;
    harness.register_user(&mut coord, "alice").await;
    let mut node = harness.storage_conn().await;

    let created = coord.command(Command::Create, "alice", "notes.txt", "").await;
    assert_eq!(created.error_code, ErrorCode::Success as u32);

    let created_on_node = node.command(Command::Create, "alice", "notes.txt", "").await;
    assert_eq!(created_on_node.error_code, ErrorCode::Success as u32);

    let read = node.command(Command::Read, "alice", "notes.txt", "").await;
    assert_eq!(read.error_code, ErrorCode::Success as u32);
    assert_eq!(read.data, "");

    let info = node.command(Command::Info, "alice", "notes.txt", "").await;
    assert!(info.data.contains("Owner: alice"));
    assert!(info.data.contains("Words: 0"));
}

/// S2: lease-gated write, exclusive until released.
#[tokio::test]
async fn lease_write_then_read() {
    let harness = Harness::start().await;
    let mut alice_coord = harness.coord_conn().await;
    harness.register_user(&mut alice_coord, "alice").await;
    let mut bob_coord = harness.coord_conn().await;
    harness.register_user(&mut bob_coord, "bob").await;
    let mut node = harness.storage_conn().await;

    alice_coord.command(Command::Create, "alice", "notes.txt", "").await;
    node.command(Command::Create, "alice", "notes.txt", "").await;

    let acquired = alice_coord.command(Command::LockAcquire, "alice", "notes.txt", "0").await;
    assert_eq!(acquired.error_code, ErrorCode::Success as u32);

    let blocked = bob_coord.command(Command::LockAcquire, "bob", "notes.txt", "0").await;
    assert_eq!(blocked.error_code, ErrorCode::FileLocked as u32);
    assert!(blocked.data.contains("alice"));

    // Re-entrant: alice can re-acquire her own lease on the same connection.
    let reacquired = alice_coord.command(Command::LockAcquire, "alice", "notes.txt", "0").await;
    assert_eq!(reacquired.error_code, ErrorCode::Success as u32);

    let committed = node.command(Command::WriteCommit, "alice", "notes.txt", "0|0|Hello|1|World").await;
    assert_eq!(committed.error_code, ErrorCode::Success as u32);

    let read = node.command(Command::Read, "alice", "notes.txt", "").await;
    assert_eq!(read.data, "Hello World");

    let released = alice_coord.command(Command::LockRelease, "alice", "notes.txt", "0").await;
    assert_eq!(released.error_code, ErrorCode::Success as u32);

    let now_free = bob_coord.command(Command::LockAcquire, "bob", "notes.txt", "0").await;
    assert_eq!(now_free.error_code, ErrorCode::Success as u32);
}

/// S3: inserting a word carrying a sentence terminator splits the
/// target sentence on reparse.
#[tokio::test]
async fn write_commit_splits_sentence_on_terminator() {
    let harness = Harness::start().await;
    let mut coord = harness.coord_conn().await;
    harness.register_user(&mut coord, "alice").await;
    let mut node = harness.storage_conn().await;

    coord.command(Command::Create, "alice", "notes.txt", "").await;
    node.command(Command::Create, "alice", "notes.txt", "").await;
    node.command(Command::WriteCommit, "alice", "notes.txt", "0|0|Hi|1|there").await;

    let committed = node.command(Command::WriteCommit, "alice", "notes.txt", "0|2|there.|3|New").await;
    assert_eq!(committed.error_code, ErrorCode::Success as u32);

    let read = node.command(Command::Read, "alice", "notes.txt", "").await;
    assert_eq!(read.data, "Hi there there. New");
}

/// S4: ACL grant/revoke via the coordinator's access-request flow.
#[tokio::test]
async fn access_request_and_approve_grants_read() {
    let harness = Harness::start().await;
    let mut coord = harness.coord_conn().await;
    harness.register_user(&mut coord, "alice").await;
    let mut bob_coord = harness.coord_conn().await;
    harness.register_user(&mut bob_coord, "bob").await;
    let mut node = harness.storage_conn().await;

    coord.command(Command::Create, "alice", "notes.txt", "").await;
    node.command(Command::Create, "alice", "notes.txt", "").await;

    let denied = node.command(Command::Read, "bob", "notes.txt", "").await;
    assert_eq!(denied.error_code, ErrorCode::Unauthorized as u32);

    let requested = bob_coord.command(Command::RequestAccess, "bob", "notes.txt", "").await;
    assert_eq!(requested.error_code, ErrorCode::Success as u32);

    let pending = coord.command(Command::ViewRequests, "alice", "", "").await;
    assert!(pending.data.contains("notes.txt"));
    assert!(pending.data.contains("bob"));

    let approved = coord.command(Command::ApproveRequest, "alice", "notes.txt", "bob").await;
    assert_eq!(approved.error_code, ErrorCode::Success as u32);

    let allowed = node.command(Command::Read, "bob", "notes.txt", "").await;
    assert_eq!(allowed.error_code, ErrorCode::Success as u32);
}

/// DELETE is owner-only at the coordinator and, per SPEC_FULL.md S12,
/// propagates to the hosting storage node.
#[tokio::test]
async fn delete_requires_owner_and_propagates_to_node() {
    let harness = Harness::start().await;
    let mut coord = harness.coord_conn().await;
    harness.register_user(&mut coord, "alice").await;
    let mut bob_coord = harness.coord_conn().await;
    harness.register_user(&mut bob_coord, "bob").await;
    let mut node = harness.storage_conn().await;

    coord.command(Command::Create, "alice", "notes.txt", "").await;
    node.command(Command::Create, "alice", "notes.txt", "").await;

    let unauthorized = bob_coord.command(Command::Delete, "bob", "notes.txt", "").await;
    assert_eq!(unauthorized.error_code, ErrorCode::Unauthorized as u32);

    let deleted = coord.command(Command::Delete, "alice", "notes.txt", "").await;
    assert_eq!(deleted.error_code, ErrorCode::Success as u32);

    let gone_from_registry = coord.command(Command::Read, "alice", "notes.txt", "").await;
    assert_eq!(gone_from_registry.error_code, ErrorCode::FileNotFound as u32);

    let gone_from_node = node.command(Command::Read, "alice", "notes.txt", "").await;
    assert_eq!(gone_from_node.error_code, ErrorCode::FileNotFound as u32);
}

/// Invariant 7: load-balanced placement spreads successive creates
/// across connected nodes with the fewest files, tied nodes broken by
/// registration order.
#[tokio::test]
async fn placement_prefers_the_least_loaded_node() {
    let harness = Harness::start().await;
    let mut coord = harness.coord_conn().await;
    harness.register_user(&mut coord, "alice").await;

    let second_dir = tempfile::tempdir().unwrap();
    let mut second_config = StorageConfig::default();
    second_config.data_dir = second_dir.path().to_path_buf();
    let second_engine = Arc::new(StorageEngine::new("node-2".to_string(), second_config));
    second_engine.ensure_dirs().unwrap();
    let (second_port, second_coord_port) = spawn_storage_node(second_engine).await;
    harness.register_node("node-2", second_coord_port, second_port).await;

    let first = coord.command(Command::Create, "alice", "a.txt", "").await;
    let second = coord.command(Command::Create, "alice", "b.txt", "").await;
    // node-1 registered first and starts with file_count 0, so it wins
    // the tie for the first create; node-2 (still at 0) wins the second.
    assert_ne!(first.data, second.data);
}
