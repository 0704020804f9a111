//! Flat-text registry persistence (spec.md S4.1, S6).
//!
//! `data/file_registry.txt` holds one `|`-separated line per file,
//! ported from `name_server.c`'s `load_file_registry`/
//! `save_file_registry`. The registry is rewritten after every
//! mutating operation; a write failure is logged but does not abort
//! the in-memory mutation (spec.md S7).

use super::registry::FileRecord;
use std::io::Write;
use std::path::Path;

pub fn registry_path(data_dir: &Path) -> std::path::PathBuf {
    data_dir.join("file_registry.txt")
}

/// Replays the registry file, returning the records it contains. A
/// missing file is not an error: it means no prior registry exists.
pub fn load(data_dir: &Path) -> std::io::Result<Vec<FileRecord>> {
    let path = registry_path(data_dir);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != 9 {
            tracing::warn!(line, "skipping malformed file_registry.txt line");
            continue;
        }
        records.push(FileRecord {
            filename: fields[0].to_string(),
            owner: fields[1].to_string(),
            node_id: fields[2].to_string(),
            created: fields[3].parse().unwrap_or(0),
            modified: fields[4].parse().unwrap_or(0),
            accessed: fields[5].parse().unwrap_or(0),
            last_accessed_by: fields[6].to_string(),
            word_count: fields[7].parse().unwrap_or(0),
            char_count: fields[8].parse().unwrap_or(0),
        });
    }
    Ok(records)
}

/// Rewrites the registry file from scratch with the given records,
/// via create-temp-and-rename so a crash mid-write never corrupts the
/// existing file (spec.md S4.3's atomicity rule, applied here too).
pub fn save(data_dir: &Path, records: impl Iterator<Item = FileRecord>) -> std::io::Result<()> {
    std::fs::create_dir_all(data_dir)?;
    let path = registry_path(data_dir);
    let tmp_path = data_dir.join(format!(
        "file_registry.txt.tmp-{}",
        std::process::id()
    ));

    let mut file = std::fs::File::create(&tmp_path)?;
    let mut count = 0;
    for r in records {
        writeln!(
            file,
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            r.filename,
            r.owner,
            r.node_id,
            r.created,
            r.modified,
            r.accessed,
            r.last_accessed_by,
            r.word_count,
            r.char_count
        )?;
        count += 1;
    }
    file.sync_all()?;
    std::fs::rename(&tmp_path, &path)?;
    tracing::info!(count, "file registry saved");
    Ok(())
}
