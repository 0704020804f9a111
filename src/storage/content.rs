//! Atomic on-disk persistence for file bodies (spec.md S4.3).
//!
//! Writes go through a create-temp-and-rename protocol: the payload is
//! written to a sibling temp path, fsynced, renamed over the target,
//! and the containing directory is fsynced so the rename itself is
//! durable. Combined with [`super::locks::LockTable`] guarding the
//! body, readers never observe torn content.

use std::io::Write;
use std::path::{Path, PathBuf};

pub fn path_for(content_root: &Path, filename: &str) -> PathBuf {
    content_root.join(filename)
}

pub fn exists(content_root: &Path, filename: &str) -> bool {
    path_for(content_root, filename).is_file()
}

pub fn read(content_root: &Path, filename: &str) -> std::io::Result<String> {
    std::fs::read_to_string(path_for(content_root, filename))
}

pub fn size(content_root: &Path, filename: &str) -> std::io::Result<u64> {
    Ok(std::fs::metadata(path_for(content_root, filename))?.len())
}

/// Writes `content` to `filename`'s body, creating parent folders as
/// needed, via the create-temp-and-rename protocol.
pub fn write(content_root: &Path, filename: &str, content: &str) -> std::io::Result<()> {
    let path = path_for(content_root, filename);
    let parent = path.parent().unwrap_or(content_root);
    std::fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        std::process::id()
    ));
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, &path)?;
    if let Ok(dir) = std::fs::File::open(parent) {
        dir.sync_all().ok();
    }
    Ok(())
}

pub fn remove(content_root: &Path, filename: &str) -> std::io::Result<()> {
    match std::fs::remove_file(path_for(content_root, filename)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_back_content() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "Hello World").unwrap();
        assert_eq!(read(dir.path(), "notes.txt").unwrap(), "Hello World");
    }

    #[test]
    fn write_creates_parent_folders_for_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "drafts/notes.txt", "x").unwrap();
        assert_eq!(read(dir.path(), "drafts/notes.txt").unwrap(), "x");
    }

    #[test]
    fn remove_on_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(remove(dir.path(), "ghost.txt").is_ok());
    }
}
