//! Named content checkpoints (spec.md S3 `Checkpoint`, S4.2
//! `CHECKPOINT`/`VIEW-CHECKPOINT`/`REVERT`/`LIST-CHECKPOINTS`).
//!
//! Unbounded in count; no auto-pruning, matching
//! `handle_checkpoint`/`handle_view_checkpoint`/
//! `handle_revert_checkpoint`/`handle_list_checkpoints` in
//! `examples/original_source/osn_final/project-main/src/storage_server.c`.
//! Each `.ckpt` file is an epoch-seconds line followed by the raw
//! content snapshot.

use std::io::Write;
use std::path::{Path, PathBuf};

fn path_for(checkpoint_root: &Path, filename: &str, tag: &str) -> PathBuf {
    let path = Path::new(filename);
    let dir = path.parent().map(|p| checkpoint_root.join(p)).unwrap_or_else(|| checkpoint_root.to_path_buf());
    let base = path.file_name().and_then(|n| n.to_str()).unwrap_or(filename);
    dir.join(format!("{base}_{tag}.ckpt"))
}

/// Creates or overwrites the checkpoint `(filename, tag)` with
/// `content`, stamped with the current time.
pub fn save(checkpoint_root: &Path, filename: &str, tag: &str, content: &str) -> std::io::Result<()> {
    let path = path_for(checkpoint_root, filename, tag);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(&path)?;
    writeln!(file, "{}", super::metadata::now())?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Loads the content snapshot for `(filename, tag)`, if it exists.
pub fn load(checkpoint_root: &Path, filename: &str, tag: &str) -> std::io::Result<Option<String>> {
    let path = path_for(checkpoint_root, filename, tag);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    // First line is the epoch timestamp; everything after the first
    // newline is the content.
    Ok(Some(text.split_once('\n').map(|(_, rest)| rest.to_string()).unwrap_or_default()))
}

/// Lists the tags of every checkpoint recorded for `filename`, by
/// scanning the checkpoint directory for entries whose name begins
/// with `<base>_` and ends with `.ckpt`.
pub fn list_tags(checkpoint_root: &Path, filename: &str) -> std::io::Result<Vec<String>> {
    let path = Path::new(filename);
    let dir = path.parent().map(|p| checkpoint_root.join(p)).unwrap_or_else(|| checkpoint_root.to_path_buf());
    let base = path.file_name().and_then(|n| n.to_str()).unwrap_or(filename);
    let prefix = format!("{base}_");

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tags = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(rest) = name.strip_prefix(&prefix) {
            if let Some(tag) = rest.strip_suffix(".ckpt") {
                tags.push(tag.to_string());
            }
        }
    }
    tags.sort();
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "notes.txt", "v1", "hello").unwrap();
        assert_eq!(load(dir.path(), "notes.txt", "v1").unwrap().unwrap(), "hello");
    }

    #[test]
    fn list_tags_finds_only_matching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "notes.txt", "v1", "a").unwrap();
        save(dir.path(), "notes.txt", "v2", "b").unwrap();
        save(dir.path(), "other.txt", "v1", "c").unwrap();
        let mut tags = list_tags(dir.path(), "notes.txt").unwrap();
        tags.sort();
        assert_eq!(tags, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn missing_checkpoint_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_tags(dir.path(), "ghost.txt").unwrap().is_empty());
    }
}
