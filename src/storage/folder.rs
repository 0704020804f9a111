//! Directory manipulation on the content tree, metadata mirrored
//! (spec.md S3 `Folder`, S4.2 `CREATE-FOLDER`/`MOVE`/`VIEW-FOLDER`),
//! ported from `handle_create_folder`/`handle_move_file`/
//! `handle_view_folder` in
//! `examples/original_source/osn_final/project-main/src/storage_server.c`.

use std::path::Path;

/// Creates `path` as a folder under both the content and metadata
/// roots, so the metadata tree keeps mirroring the content tree.
pub fn create(content_root: &Path, metadata_root: &Path, path: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(content_root.join(path))?;
    std::fs::create_dir_all(metadata_root.join(path))?;
    Ok(())
}

/// Lists the direct entries (files and sub-folders) of `path`, or
/// `None` if `path` is not a known folder.
pub fn view(content_root: &Path, path: &str) -> std::io::Result<Option<Vec<String>>> {
    let dir = content_root.join(path);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(Some(names))
}

/// Moves `filename` into `foldername`, relocating its content,
/// metadata sidecar, and undo slot (if present) together so none of
/// the three trees fall out of sync.
pub fn move_into(
    content_root: &Path,
    metadata_root: &Path,
    undo_root: &Path,
    filename: &str,
    foldername: &str,
) -> std::io::Result<String> {
    let new_rel = format!("{foldername}/{filename}");

    let old_content = content_root.join(filename);
    let new_content = content_root.join(&new_rel);
    if let Some(parent) = new_content.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&old_content, &new_content)?;

    let old_meta = super::metadata::meta_path(metadata_root, filename);
    let new_meta = super::metadata::meta_path(metadata_root, &new_rel);
    if let Some(parent) = new_meta.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&old_meta, &new_meta).ok();

    let old_undo = undo_root.join(format!("{filename}.undo"));
    let new_undo = undo_root.join(format!("{new_rel}.undo"));
    if let Some(parent) = new_undo.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&old_undo, &new_undo).ok();

    Ok(new_rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_mirrors_content_and_metadata_trees() {
        let content = tempfile::tempdir().unwrap();
        let metadata = tempfile::tempdir().unwrap();
        create(content.path(), metadata.path(), "drafts").unwrap();
        assert!(content.path().join("drafts").is_dir());
        assert!(metadata.path().join("drafts").is_dir());
    }

    #[test]
    fn view_lists_entries_of_a_known_folder() {
        let content = tempfile::tempdir().unwrap();
        std::fs::create_dir(content.path().join("drafts")).unwrap();
        std::fs::write(content.path().join("drafts/a.txt"), "x").unwrap();
        std::fs::write(content.path().join("drafts/b.txt"), "y").unwrap();
        let entries = view(content.path(), "drafts").unwrap().unwrap();
        assert_eq!(entries, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn view_of_missing_folder_is_none() {
        let content = tempfile::tempdir().unwrap();
        assert!(view(content.path(), "ghost").unwrap().is_none());
    }

    #[test]
    fn move_into_relocates_content_metadata_and_undo() {
        let content = tempfile::tempdir().unwrap();
        let metadata = tempfile::tempdir().unwrap();
        let undo = tempfile::tempdir().unwrap();
        std::fs::write(content.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(metadata.path().join("notes.txt.meta"), "owner:alice\n").unwrap();
        create(content.path(), metadata.path(), "drafts").unwrap();

        let new_rel = move_into(content.path(), metadata.path(), undo.path(), "notes.txt", "drafts").unwrap();
        assert_eq!(new_rel, "drafts/notes.txt");
        assert!(content.path().join("drafts/notes.txt").is_file());
        assert!(metadata.path().join("drafts/notes.txt.meta").is_file());
        assert!(!content.path().join("notes.txt").exists());
    }
}
