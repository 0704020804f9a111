//! Single-level undo slot (spec.md S3 `UndoSlot`, S4.2 `UNDO`).
//!
//! One prior-content snapshot per file, overwritten on every
//! successful write and on revert, giving a 1-step toggle: `UNDO`
//! twice returns to the state before the first `UNDO`.

use std::path::Path;

fn path_for(undo_root: &Path, filename: &str) -> std::path::PathBuf {
    let mut path = undo_root.join(filename);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".undo");
    path.set_file_name(name);
    path
}

pub fn exists(undo_root: &Path, filename: &str) -> bool {
    path_for(undo_root, filename).is_file()
}

pub fn load(undo_root: &Path, filename: &str) -> std::io::Result<Option<String>> {
    match std::fs::read_to_string(path_for(undo_root, filename)) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Overwrites the undo slot with `content`, the snapshot taken just
/// before a write mutates the file (spec.md S4.2 `WRITE-COMMIT`) or
/// just before a checkpoint `REVERT` overwrites the current content.
pub fn save(undo_root: &Path, filename: &str, content: &str) -> std::io::Result<()> {
    let path = path_for(undo_root, filename);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, content)
}

pub fn remove(undo_root: &Path, filename: &str) -> std::io::Result<()> {
    match std::fs::remove_file(path_for(undo_root, filename)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
