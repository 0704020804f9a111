//! Process-wide per-file reader/writer lock table (spec.md S4.3).
//!
//! Keyed by the file's relative path under the content root. The
//! table itself is a [`whirlwind::ShardMap`] — the "concurrent
//! mapping" indexing primitive spec.md S2 calls out — so unrelated
//! files never contend on table bookkeeping the way a single coarse
//! mutex would. Reference counting keeps an entry alive exactly as
//! long as some caller holds or is waiting on a guard for it; DELETE
//! takes its own write guard through this same table, so it serializes
//! against readers/writers exactly like any other body operation
//! instead of racing the refcount.
//!
//! Every increment (`entry_for`) and every decrement-to-zero-and-remove
//! (a dropped guard's cleanup) runs under the same `create_guard`, so
//! the two can never interleave: a thread can't pick up a reference to
//! an entry that's concurrently being pulled out of the map for being
//! unreferenced, which would otherwise let two guards for the same path
//! end up backed by two different `RwLock`s and defeat exclusivity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use whirlwind::ShardMap;

struct Entry {
    lock: Arc<RwLock<()>>,
    refs: AtomicUsize,
}

enum Held {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// A held guard over one file's body. Dropping it releases the
/// reader/writer lock immediately and schedules the table entry's
/// refcount decrement; if that drops the count to zero, the entry is
/// reclaimed from the table under `create_guard` (see module docs).
pub struct BodyGuard {
    held: Option<Held>,
    entry: Arc<Entry>,
    path: String,
    table: Arc<LockTableInner>,
}

impl Drop for BodyGuard {
    fn drop(&mut self) {
        self.held.take();
        let table = self.table.clone();
        let path = self.path.clone();
        let entry = self.entry.clone();
        tokio::spawn(async move {
            let _guard = table.create_guard.lock().await;
            if entry.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
                table.entries.remove(&path).await;
            }
        });
    }
}

struct LockTableInner {
    entries: ShardMap<String, Arc<Entry>>,
    create_guard: tokio::sync::Mutex<()>,
}

/// The file lock table, one instance per storage node process.
#[derive(Clone)]
pub struct LockTable {
    inner: Arc<LockTableInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LockTableInner {
                entries: ShardMap::new(),
                create_guard: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Looks up or creates the entry for `path`, incrementing its
    /// reference count. Always runs under `create_guard`, the same
    /// lock a dropped guard's reclaim task uses, so an acquire can
    /// never observe an entry mid-removal (or vice versa) — see the
    /// module docs for the race this closes.
    async fn entry_for(&self, path: &str) -> Arc<Entry> {
        let _guard = self.inner.create_guard.lock().await;
        if let Some(existing) = self.inner.entries.get(&path.to_string()).await {
            existing.refs.fetch_add(1, Ordering::AcqRel);
            return existing;
        }
        let entry = Arc::new(Entry { lock: Arc::new(RwLock::new(())), refs: AtomicUsize::new(1) });
        self.inner.entries.insert(path.to_string(), entry.clone()).await;
        entry
    }

    /// Acquires a shared (reader) lock on `path`. Concurrent readers
    /// may proceed together; writers on the same path wait.
    pub async fn read(&self, path: &str) -> BodyGuard {
        let entry = self.entry_for(path).await;
        let guard = entry.lock.clone().read_owned().await;
        BodyGuard { held: Some(Held::Read(guard)), entry, path: path.to_string(), table: self.inner.clone() }
    }

    /// Acquires an exclusive (writer) lock on `path`.
    pub async fn write(&self, path: &str) -> BodyGuard {
        let entry = self.entry_for(path).await;
        let guard = entry.lock.clone().write_owned().await;
        BodyGuard { held: Some(Held::Write(guard)), entry, path: path.to_string(), table: self.inner.clone() }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
