//! The storage node's file engine: sentence/word-indexed editing,
//! access control, undo/checkpoint history, folders (spec.md S4.2).
//!
//! Structural/metadata operations (create, delete, ACL changes,
//! folder manipulation) go through one coarse per-node mutex; file
//! body reads/writes go through [`super::locks::LockTable`], a
//! per-path reader/writer lock. The two never nest in the opposite
//! order, so no deadlock cycle is possible between them.

use super::checkpoint;
use super::content;
use super::folder;
use super::locks::LockTable;
use super::metadata::{self, AclEntry, Metadata, Permission};
use super::undo;
use crate::config::StorageConfig;
use crate::error::{ErrorCode, Result, ServerError};
use crate::parser;
use std::path::PathBuf;
use tokio::sync::Mutex as AsyncMutex;

pub struct Paths {
    pub content: PathBuf,
    pub metadata: PathBuf,
    pub undo: PathBuf,
    pub checkpoints: PathBuf,
}

impl Paths {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            content: data_dir.join("files"),
            metadata: data_dir.join("metadata"),
            undo: data_dir.join("undo"),
            checkpoints: data_dir.join("checkpoints"),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.content)?;
        std::fs::create_dir_all(&self.metadata)?;
        std::fs::create_dir_all(&self.undo)?;
        std::fs::create_dir_all(&self.checkpoints)?;
        Ok(())
    }
}

/// Detailed info returned by INFO/FILEINFO.
pub struct FileInfo {
    pub owner: String,
    pub created: u64,
    pub modified: u64,
    pub accessed: u64,
    pub last_accessed_by: String,
    pub word_count: u64,
    pub char_count: u64,
    pub sentence_count: usize,
    pub acl: Vec<AclEntry>,
    pub byte_size: Option<u64>,
}

pub struct StorageEngine {
    pub node_id: String,
    pub config: StorageConfig,
    paths: Paths,
    locks: LockTable,
    coarse: AsyncMutex<()>,
}

fn not_found(filename: &str) -> ServerError {
    ServerError::new(ErrorCode::FileNotFound, format!("file {filename} not found"))
}

fn load_meta(paths: &Paths, filename: &str) -> Result<Metadata> {
    metadata::load(&paths.metadata, filename)?.ok_or_else(|| not_found(filename))
}

impl StorageEngine {
    pub fn new(node_id: String, config: StorageConfig) -> Self {
        let paths = Paths::new(&config.data_dir);
        Self { node_id, config, paths, locks: LockTable::new(), coarse: AsyncMutex::new(()) }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        self.paths.ensure()
    }

    /// Count of file bodies currently stored, reported in HEARTBEAT so
    /// the coordinator's placement heuristic (spec.md S4.1 "fewest
    /// files") stays current without a registry round-trip per file.
    pub fn file_count(&self) -> u64 {
        std::fs::read_dir(&self.paths.content)
            .map(|entries| entries.filter(|e| e.as_ref().map(|e| e.path().is_file()).unwrap_or(false)).count() as u64)
            .unwrap_or(0)
    }

    // --- CREATE / DELETE / COPY (structural; coarse mutex only) --------

    pub async fn create(&self, filename: &str, username: &str) -> Result<()> {
        let _guard = self.coarse.lock().await;
        if content::exists(&self.paths.content, filename) {
            return Err(ServerError::new(ErrorCode::FileExists, format!("file {filename} already exists")));
        }
        content::write(&self.paths.content, filename, "")?;
        metadata::save(&self.paths.metadata, filename, &Metadata::new(username))?;
        Ok(())
    }

    pub async fn delete(&self, filename: &str, username: &str) -> Result<()> {
        // Take the body write lock too, so a delete can't race an
        // in-flight read/write of the same file body (spec.md S4.3:
        // "DELETE waits until the per-file ref-count drops to zero").
        let _body = self.locks.write(filename).await;
        let _guard = self.coarse.lock().await;
        let meta = load_meta(&self.paths, filename)?;
        if meta.owner != username {
            return Err(ServerError::new(ErrorCode::Unauthorized, "only the owner may delete this file"));
        }
        content::remove(&self.paths.content, filename)?;
        metadata::remove(&self.paths.metadata, filename)?;
        undo::remove(&self.paths.undo, filename)?;
        Ok(())
    }

    pub async fn copy(&self, source: &str, dest: &str, username: &str) -> Result<()> {
        let _src_body = self.locks.read(source).await;
        let _guard = self.coarse.lock().await;
        let src_meta = load_meta(&self.paths, source)?;
        if !src_meta.permits_read(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no read access to source file"));
        }
        if content::exists(&self.paths.content, dest) {
            return Err(ServerError::new(ErrorCode::FileExists, "destination file already exists"));
        }
        let body = content::read(&self.paths.content, source)?;
        content::write(&self.paths.content, dest, &body)?;
        let mut dest_meta = Metadata::new(username);
        dest_meta.word_count = src_meta.word_count;
        dest_meta.char_count = src_meta.char_count;
        metadata::save(&self.paths.metadata, dest, &dest_meta)?;
        Ok(())
    }

    // --- READ / STREAM ---------------------------------------------------

    pub async fn read(&self, filename: &str, username: &str) -> Result<String> {
        let _body = self.locks.read(filename).await;
        let body = content::read(&self.paths.content, filename).map_err(|_| not_found(filename))?;

        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        if !meta.permits_read(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no read access"));
        }
        meta.touch_access(username);
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(body)
    }

    /// Bounded to the first [`STREAM_WORD_CAP`] words so a reply packed
    /// as `|WORD|w1|WORD|w2…` fits the wire record's data field
    /// (spec.md S4.2 `STREAM`).
    pub const STREAM_WORD_CAP: usize = 100;

    pub async fn stream(&self, filename: &str, username: &str) -> Result<Vec<String>> {
        let _body = self.locks.read(filename).await;
        let _guard = self.coarse.lock().await;
        let meta = load_meta(&self.paths, filename)?;
        if !meta.permits_read(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no read access"));
        }
        let body = content::read(&self.paths.content, filename)?;
        let sentences = parser::split_sentences(&body);
        let words: Vec<String> = sentences.iter().flat_map(|s| parser::split_words(s)).collect();
        Ok(words.into_iter().take(Self::STREAM_WORD_CAP).collect())
    }

    // --- WRITE-COMMIT -----------------------------------------------------

    /// Applies the `sentence_index|word_index|word|…` payload
    /// described in spec.md S4.2. Every edit is validated before any
    /// edit is applied to disk; on the first invalid `word_index` the
    /// whole commit fails `InvalidIndex` and the file (and its undo
    /// slot) are left untouched — resolving SPEC_FULL.md S12's
    /// "deferred undo-snapshot write" decision.
    pub async fn write_commit(&self, filename: &str, username: &str, payload: &str) -> Result<()> {
        let _body = self.locks.write(filename).await;

        let meta_guard = self.coarse.lock().await;
        let meta = load_meta(&self.paths, filename)?;
        if !meta.permits_write(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no write access"));
        }
        drop(meta_guard);

        let old_body = content::read(&self.paths.content, filename)?;
        let sentences = parser::split_sentences(&old_body);

        let (sentence_index, edits) = parse_write_payload(payload)?;
        if sentence_index > sentences.len() {
            return Err(ServerError::new(
                ErrorCode::InvalidIndex,
                format!("invalid sentence index {sentence_index} (max: {})", sentences.len()),
            ));
        }

        let mut target = sentences.get(sentence_index).cloned().unwrap_or_default();
        for (word_index, word) in &edits {
            target = parser::insert_word(&target, *word_index, word)?;
        }

        let mut result: Vec<String> = Vec::with_capacity(sentences.len() + 1);
        result.extend(sentences[..sentence_index.min(sentences.len())].iter().cloned());
        result.extend(parser::split_sentences(&target));
        if sentence_index < sentences.len() {
            result.extend(sentences[sentence_index + 1..].iter().cloned());
        }
        let new_body = parser::rebuild_text(&result);
        if new_body.len() > self.config.max_file_size {
            return Err(ServerError::new(
                ErrorCode::InvalidParameters,
                format!("commit would grow {filename} to {} bytes (max: {})", new_body.len(), self.config.max_file_size),
            ));
        }

        undo::save(&self.paths.undo, filename, &old_body)?;
        content::write(&self.paths.content, filename, &new_body)?;

        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        meta.touch_modify(&parser::stats(&new_body));
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(())
    }

    // --- UNDO --------------------------------------------------------------

    pub async fn undo(&self, filename: &str, username: &str) -> Result<()> {
        let _body = self.locks.write(filename).await;

        let meta_guard = self.coarse.lock().await;
        let meta = load_meta(&self.paths, filename)?;
        if !meta.permits_write(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no write access"));
        }
        drop(meta_guard);

        let undo_content = undo::load(&self.paths.undo, filename)?
            .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "no undo history for this file"))?;
        let current = content::read(&self.paths.content, filename)?;

        // A second UNDO reverts the revert: swap current <-> undo slot.
        undo::save(&self.paths.undo, filename, &current)?;
        content::write(&self.paths.content, filename, &undo_content)?;

        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        meta.touch_modify(&parser::stats(&undo_content));
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(())
    }

    // --- INFO / FILEINFO ---------------------------------------------------

    pub async fn info(&self, filename: &str, username: &str, with_size: bool) -> Result<FileInfo> {
        let _body = self.locks.read(filename).await;
        let _guard = self.coarse.lock().await;
        let meta = load_meta(&self.paths, filename)?;
        if !meta.permits_read(username) {
            return Err(ServerError::new(ErrorCode::Unauthorized, "no read access"));
        }
        let body = content::read(&self.paths.content, filename).unwrap_or_default();
        let sentence_count = parser::split_sentences(&body).len();
        let byte_size = if with_size { content::size(&self.paths.content, filename).ok() } else { None };
        Ok(FileInfo {
            owner: meta.owner,
            created: meta.created,
            modified: meta.modified,
            accessed: meta.accessed,
            last_accessed_by: meta.last_accessed_by,
            word_count: meta.word_count,
            char_count: meta.char_count,
            sentence_count,
            acl: meta.acl,
            byte_size,
        })
    }

    // --- ACL ---------------------------------------------------------------

    pub async fn add_access(&self, filename: &str, owner: &str, target: &str) -> Result<()> {
        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        if meta.owner != owner {
            return Err(ServerError::new(ErrorCode::Unauthorized, "only the owner can modify access"));
        }
        if meta.acl.iter().any(|e| e.username == target) {
            return Err(ServerError::new(ErrorCode::InvalidParameters, "user already has access"));
        }
        if meta.acl.len() >= self.config.max_acl_entries {
            return Err(ServerError::new(ErrorCode::InvalidParameters, "ACL full"));
        }
        meta.acl.push(AclEntry { username: target.to_string(), permission: Permission::Read });
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(())
    }

    pub async fn rem_access(&self, filename: &str, owner: &str, target: &str) -> Result<()> {
        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        if meta.owner != owner {
            return Err(ServerError::new(ErrorCode::Unauthorized, "only the owner can modify access"));
        }
        let before = meta.acl.len();
        meta.acl.retain(|e| e.username != target);
        if meta.acl.len() == before {
            return Err(ServerError::new(ErrorCode::InvalidParameters, "user not in ACL"));
        }
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(())
    }

    // --- folders -------------------------------------------------------

    pub async fn create_folder(&self, path: &str) -> Result<()> {
        let _guard = self.coarse.lock().await;
        folder::create(&self.paths.content, &self.paths.metadata, path)?;
        Ok(())
    }

    pub async fn view_folder(&self, path: &str) -> Result<Vec<String>> {
        let _guard = self.coarse.lock().await;
        folder::view(&self.paths.content, path)?
            .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, "folder not found"))
    }

    pub async fn move_file(&self, filename: &str, foldername: &str) -> Result<String> {
        let _body = self.locks.write(filename).await;
        let _guard = self.coarse.lock().await;
        Ok(folder::move_into(&self.paths.content, &self.paths.metadata, &self.paths.undo, filename, foldername)?)
    }

    // --- checkpoints -------------------------------------------------------

    pub async fn checkpoint(&self, filename: &str, tag: &str) -> Result<()> {
        let _body = self.locks.read(filename).await;
        let body = content::read(&self.paths.content, filename).map_err(|_| not_found(filename))?;
        checkpoint::save(&self.paths.checkpoints, filename, tag, &body)?;
        Ok(())
    }

    pub async fn view_checkpoint(&self, filename: &str, tag: &str) -> Result<String> {
        checkpoint::load(&self.paths.checkpoints, filename, tag)?
            .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, "checkpoint not found"))
    }

    pub async fn revert(&self, filename: &str, tag: &str) -> Result<()> {
        let _body = self.locks.write(filename).await;
        let snapshot = checkpoint::load(&self.paths.checkpoints, filename, tag)?
            .ok_or_else(|| ServerError::new(ErrorCode::FileNotFound, "checkpoint not found"))?;
        let current = content::read(&self.paths.content, filename)?;
        undo::save(&self.paths.undo, filename, &current)?;
        content::write(&self.paths.content, filename, &snapshot)?;

        let _guard = self.coarse.lock().await;
        let mut meta = load_meta(&self.paths, filename)?;
        meta.touch_modify(&parser::stats(&snapshot));
        metadata::save(&self.paths.metadata, filename, &meta)?;
        Ok(())
    }

    pub async fn list_checkpoints(&self, filename: &str) -> Result<Vec<String>> {
        Ok(checkpoint::list_tags(&self.paths.checkpoints, filename)?)
    }
}

/// Parses a `WRITE-COMMIT` payload: `sentence_index|word_index|word|…`.
/// A trailing incomplete `(word_index, word)` pair is silently
/// dropped, mirroring the original C parser's `sscanf` loop, which
/// simply stops consuming on the first unparsable token.
fn parse_write_payload(payload: &str) -> Result<(usize, Vec<(usize, String)>)> {
    let mut parts = payload.split('|');
    let sentence_index: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "missing sentence index"))?;

    let mut edits = Vec::new();
    loop {
        let Some(idx_str) = parts.next() else { break };
        let Some(word) = parts.next() else { break };
        let Ok(word_index) = idx_str.parse::<usize>() else { break };
        edits.push((word_index, word.to_string()));
    }
    Ok((sentence_index, edits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn engine(dir: &std::path::Path) -> StorageEngine {
        let mut config = StorageConfig::default();
        config.data_dir = dir.to_path_buf();
        let engine = StorageEngine::new("node-1".to_string(), config);
        engine.ensure_dirs().unwrap();
        engine
    }

    #[tokio::test]
    async fn create_then_read_returns_empty_content() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "");
    }

    #[tokio::test]
    async fn create_rejects_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        let err = engine.create("notes.txt", "alice").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::FileExists);
    }

    #[tokio::test]
    async fn write_commit_then_read_round_trips_s2() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|Hello|1|World").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "Hello World");
    }

    #[tokio::test]
    async fn write_commit_splits_sentence_on_new_terminator_s3() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|Hi|1|there").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|2|there.|3|New").await.unwrap();
        let body = engine.read("notes.txt", "alice").await.unwrap();
        assert_eq!(body, "Hi there there. New");
    }

    #[tokio::test]
    async fn write_commit_rejects_out_of_range_word_index_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|Hello").await.unwrap();
        let err = engine.write_commit("notes.txt", "alice", "0|99|oops").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidIndex);
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn write_commit_rejects_growth_past_the_configured_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::default();
        config.data_dir = dir.path().to_path_buf();
        config.max_file_size = 8;
        let engine = StorageEngine::new("node-1".to_string(), config);
        engine.ensure_dirs().unwrap();
        engine.create("notes.txt", "alice").await.unwrap();

        let err = engine.write_commit("notes.txt", "alice", "0|0|way|1|too|2|long").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameters);
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "");
    }

    #[tokio::test]
    async fn undo_is_a_one_step_toggle_s5() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|A").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|1|B").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "A B");
        engine.undo("notes.txt", "alice").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "A");
        engine.undo("notes.txt", "alice").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "A B");
    }

    #[tokio::test]
    async fn acl_grant_then_revoke_s4() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        assert_eq!(engine.read("notes.txt", "bob").await.unwrap_err().code, ErrorCode::Unauthorized);
        engine.add_access("notes.txt", "alice", "bob").await.unwrap();
        assert!(engine.read("notes.txt", "bob").await.is_ok());
        engine.rem_access("notes.txt", "alice", "bob").await.unwrap();
        assert_eq!(engine.read("notes.txt", "bob").await.unwrap_err().code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn checkpoint_then_revert_then_undo_s6() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|v1").await.unwrap();
        engine.checkpoint("notes.txt", "t1").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|1|v2").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "v1 v2");
        engine.revert("notes.txt", "t1").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "v1");
        engine.undo("notes.txt", "alice").await.unwrap();
        assert_eq!(engine.read("notes.txt", "alice").await.unwrap(), "v1 v2");
    }

    #[tokio::test]
    async fn delete_requires_owner() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        let err = engine.delete("notes.txt", "bob").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert!(engine.read("notes.txt", "alice").await.is_ok());
    }

    #[tokio::test]
    async fn copy_creates_independent_file_owned_by_caller() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path());
        engine.create("notes.txt", "alice").await.unwrap();
        engine.write_commit("notes.txt", "alice", "0|0|Hello").await.unwrap();
        engine.add_access("notes.txt", "alice", "bob").await.unwrap();
        engine.copy("notes.txt", "copy.txt", "bob").await.unwrap();
        assert_eq!(engine.read("copy.txt", "bob").await.unwrap(), "Hello");
        // bob owns the copy, so alice has no implicit access to it.
        assert_eq!(engine.read("copy.txt", "alice").await.unwrap_err().code, ErrorCode::Unauthorized);
    }
}
