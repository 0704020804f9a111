//! Sidecar metadata file format (spec.md S3 `StoredFile`, S6).
//!
//! One `.meta` file per content file: `key:value` lines for the
//! scalar fields, followed by one `acl:<username>:<R|W>` line per ACL
//! entry, ported from `load_metadata`/`save_metadata` in
//! `examples/original_source/osn_final/project-main/src/storage_server.c`.

use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// READ or WRITE permission granted to a non-owner (spec.md S3).
/// WRITE permission satisfies a READ requirement too (spec.md S4.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    fn as_char(self) -> char {
        match self {
            Permission::Read => 'R',
            Permission::Write => 'W',
        }
    }
}

#[derive(Debug, Clone)]
pub struct AclEntry {
    pub username: String,
    pub permission: Permission,
}

/// Sidecar metadata for one stored file.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub owner: String,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub last_accessed_by: String,
    pub word_count: u64,
    pub char_count: u64,
    pub acl: Vec<AclEntry>,
}

impl Metadata {
    pub fn new(owner: &str) -> Self {
        let t = now();
        Self {
            owner: owner.to_string(),
            created: t,
            modified: t,
            accessed: t,
            last_accessed_by: owner.to_string(),
            word_count: 0,
            char_count: 0,
            acl: Vec::new(),
        }
    }

    /// Owner is always authorized; otherwise the caller's ACL entry is
    /// consulted, with WRITE satisfying a READ requirement too
    /// (spec.md S4.2 "Access check").
    pub fn permits_read(&self, username: &str) -> bool {
        username == self.owner || self.acl.iter().any(|e| e.username == username)
    }

    pub fn permits_write(&self, username: &str) -> bool {
        username == self.owner
            || self.acl.iter().any(|e| e.username == username && e.permission == Permission::Write)
    }

    pub fn touch_access(&mut self, username: &str) {
        self.accessed = now();
        self.last_accessed_by = username.to_string();
    }

    pub fn touch_modify(&mut self, stats: &crate::parser::Stats) {
        self.modified = now();
        self.word_count = stats.word_count as u64;
        self.char_count = stats.char_count as u64;
    }
}

/// Path of `filename`'s sidecar under `metadata_root`.
pub fn meta_path(metadata_root: &Path, filename: &str) -> std::path::PathBuf {
    let mut path = metadata_root.join(filename);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".meta");
    path.set_file_name(name);
    path
}

/// Loads `filename`'s sidecar metadata, if present.
pub fn load(metadata_root: &Path, filename: &str) -> std::io::Result<Option<Metadata>> {
    let path = meta_path(metadata_root, filename);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut meta = Metadata {
        owner: String::new(),
        created: 0,
        modified: 0,
        accessed: 0,
        last_accessed_by: String::new(),
        word_count: 0,
        char_count: 0,
        acl: Vec::new(),
    };

    for line in text.lines() {
        if let Some(v) = line.strip_prefix("owner:") {
            meta.owner = v.to_string();
        } else if let Some(v) = line.strip_prefix("created:") {
            meta.created = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("modified:") {
            meta.modified = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("accessed_by:") {
            meta.last_accessed_by = v.to_string();
        } else if let Some(v) = line.strip_prefix("accessed:") {
            meta.accessed = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("words:") {
            meta.word_count = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("chars:") {
            meta.char_count = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("acl:") {
            if let Some((username, perm)) = v.rsplit_once(':') {
                let permission = if perm == "W" { Permission::Write } else { Permission::Read };
                meta.acl.push(AclEntry { username: username.to_string(), permission });
            }
        }
    }

    Ok(Some(meta))
}

/// Persists `meta` as `filename`'s sidecar, via create-temp-and-rename
/// so readers never observe a half-written metadata file (spec.md
/// S4.3 applies to metadata too, even though the spec's atomic-write
/// protocol is framed around file bodies).
pub fn save(metadata_root: &Path, filename: &str, meta: &Metadata) -> std::io::Result<()> {
    let path = meta_path(metadata_root, filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension(format!("meta.tmp-{}", std::process::id()));

    let mut file = std::fs::File::create(&tmp_path)?;
    writeln!(file, "owner:{}", meta.owner)?;
    writeln!(file, "created:{}", meta.created)?;
    writeln!(file, "modified:{}", meta.modified)?;
    writeln!(file, "accessed:{}", meta.accessed)?;
    writeln!(file, "accessed_by:{}", meta.last_accessed_by)?;
    writeln!(file, "words:{}", meta.word_count)?;
    writeln!(file, "chars:{}", meta.char_count)?;
    for entry in &meta.acl {
        writeln!(file, "acl:{}:{}", entry.username, entry.permission.as_char())?;
    }
    file.sync_all()?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Removes `filename`'s sidecar, if present.
pub fn remove(metadata_root: &Path, filename: &str) -> std::io::Result<()> {
    let path = meta_path(metadata_root, filename);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_metadata_with_acl() {
        let dir = tempfile::tempdir().unwrap();
        let mut meta = Metadata::new("alice");
        meta.acl.push(AclEntry { username: "bob".to_string(), permission: Permission::Read });
        meta.acl.push(AclEntry { username: "carol".to_string(), permission: Permission::Write });
        save(dir.path(), "notes.txt", &meta).unwrap();

        let loaded = load(dir.path(), "notes.txt").unwrap().unwrap();
        assert_eq!(loaded.owner, "alice");
        assert_eq!(loaded.acl.len(), 2);
        assert!(loaded.permits_read("bob"));
        assert!(!loaded.permits_write("bob"));
        assert!(loaded.permits_write("carol"));
    }

    #[test]
    fn missing_metadata_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path(), "ghost.txt").unwrap().is_none());
    }

    #[test]
    fn owner_is_always_authorized() {
        let meta = Metadata::new("alice");
        assert!(meta.permits_read("alice"));
        assert!(meta.permits_write("alice"));
        assert!(!meta.permits_read("mallory"));
    }
}
