//! The storage node's listeners and dispatch (spec.md S4.2, S6).
//!
//! Two listeners share one [`StorageEngine`]: one bound to
//! `client_port` for direct client traffic (`msg_type = Command`), one
//! bound to `node_coord_port` for coordinator-issued node control
//! (`msg_type = NodeCommand`, e.g. the ACL grant behind APPROVE, the
//! content fetch behind EXEC, and best-effort DELETE propagation), per
//! spec.md S6's "one for coordinator traffic... one for direct client
//! traffic". Both accept loops dispatch through the same handler,
//! since the underlying operations (READ, ADD-ACCESS, DELETE, ...) are
//! identical either way — only which socket they arrive on differs.

use super::engine::StorageEngine;
use crate::error::{ErrorCode, Result, ServerError};
use crate::protocol::{self, Command, Record};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Runs both accept loops concurrently until either one fails.
pub async fn serve(
    engine: Arc<StorageEngine>,
    client_listener: TcpListener,
    coord_listener: TcpListener,
) -> std::io::Result<()> {
    let client_engine = engine.clone();
    tokio::try_join!(
        accept_loop(client_engine, client_listener, "client"),
        accept_loop(engine, coord_listener, "coordinator"),
    )?;
    Ok(())
}

async fn accept_loop(engine: Arc<StorageEngine>, listener: TcpListener, facing: &'static str) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true).ok();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(engine, socket).await {
                tracing::debug!(%peer, facing, error = %e, "storage node connection ended");
            }
        });
    }
}

async fn handle_connection(engine: Arc<StorageEngine>, socket: tokio::net::TcpStream) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = socket.into_split();
    while let Some(request) = protocol::read_record(&mut read_half).await? {
        let reply = dispatch(&engine, &request).await;
        protocol::write_record(&mut write_half, &reply).await?;
    }
    Ok(())
}

async fn dispatch(engine: &StorageEngine, request: &Record) -> Record {
    handle(engine, request).await.unwrap_or_else(|e| Record::error(&e))
}

async fn handle(engine: &StorageEngine, request: &Record) -> Result<Record> {
    let username = request.username.as_str();
    let filename = request.filename.as_str();

    match request.command {
        Command::Create => {
            engine.create(filename, username).await?;
            Ok(Record::ok("created"))
        }
        Command::Read => {
            let body = engine.read(filename, username).await?;
            Ok(Record::ok(body))
        }
        Command::WriteCommit | Command::Write => {
            engine.write_commit(filename, username, &request.data).await?;
            Ok(Record::ok("committed"))
        }
        Command::Delete => {
            engine.delete(filename, username).await?;
            Ok(Record::ok("deleted"))
        }
        Command::Undo => {
            engine.undo(filename, username).await?;
            Ok(Record::ok("undone"))
        }
        Command::Info => {
            let info = engine.info(filename, username, false).await?;
            Ok(Record::ok(format_info(filename, &info, &engine.node_id, false)))
        }
        Command::FileInfo => {
            let info = engine.info(filename, username, true).await?;
            Ok(Record::ok(format_info(filename, &info, &engine.node_id, true)))
        }
        Command::Stream => {
            let words = engine.stream(filename, username).await?;
            let mut packed = String::new();
            for w in words {
                packed.push_str("|WORD|");
                packed.push_str(&w);
            }
            Ok(Record::ok(packed))
        }
        Command::Copy => {
            let (source, dest) = split_pair(&request.data)?;
            engine.copy(source, dest, username).await?;
            Ok(Record::ok(format!("file copied: {source} -> {dest}")))
        }
        Command::AddAccess => {
            engine.add_access(filename, username, request.data.trim()).await?;
            Ok(Record::ok(format!("access granted to {}", request.data.trim())))
        }
        Command::RemAccess => {
            engine.rem_access(filename, username, request.data.trim()).await?;
            Ok(Record::ok(format!("access revoked from {}", request.data.trim())))
        }
        Command::CreateFolder => {
            engine.create_folder(filename).await?;
            Ok(Record::ok(format!("folder created: {filename}")))
        }
        Command::ViewFolder => {
            let entries = engine.view_folder(filename).await?;
            Ok(Record::ok(entries.join("\n")))
        }
        Command::Move => {
            let (moved_file, foldername) = split_pair(&request.data)?;
            let new_path = engine.move_file(moved_file, foldername).await?;
            Ok(Record::ok(format!("file moved to folder: {new_path}")))
        }
        Command::Checkpoint => {
            let (checkpoint_file, tag) = split_pair(&request.data)?;
            engine.checkpoint(checkpoint_file, tag).await?;
            Ok(Record::ok(format!("checkpoint created: {tag}")))
        }
        Command::ViewCheckpoint => {
            let (checkpoint_file, tag) = split_pair(&request.data)?;
            let content = engine.view_checkpoint(checkpoint_file, tag).await?;
            Ok(Record::ok(content))
        }
        Command::Revert => {
            let (checkpoint_file, tag) = split_pair(&request.data)?;
            engine.revert(checkpoint_file, tag).await?;
            Ok(Record::ok(format!("reverted to checkpoint: {tag}")))
        }
        Command::ListCheckpoints => {
            let tags = engine.list_checkpoints(filename).await?;
            if tags.is_empty() {
                Ok(Record::ok("no checkpoints found"))
            } else {
                Ok(Record::ok(tags.join("\n")))
            }
        }
        _ => Err(ServerError::new(ErrorCode::InvalidCommand, "not a storage-node command")),
    }
}

fn split_pair(data: &str) -> Result<(&str, &str)> {
    data.split_once('|')
        .ok_or_else(|| ServerError::new(ErrorCode::InvalidParameters, "expected \"a|b\" payload"))
}

fn format_info(filename: &str, info: &super::engine::FileInfo, node_id: &str, with_fileinfo: bool) -> String {
    let acl = if info.acl.is_empty() {
        "none".to_string()
    } else {
        info.acl
            .iter()
            .map(|e| format!("{} ({})", e.username, if e.permission == super::metadata::Permission::Write { "write" } else { "read" }))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut out = format!(
        "Filename: {filename}\nOwner: {}\nCreated: {}\nModified: {}\nLast Accessed: {} by {}\nWords: {}\nCharacters: {}\nSentences: {}\n",
        info.owner, info.created, info.modified, info.accessed, info.last_accessed_by, info.word_count, info.char_count, info.sentence_count,
    );
    if with_fileinfo {
        out.push_str(&format!("Size: {} bytes\nStorage Node: {node_id}\n", info.byte_size.unwrap_or(0)));
    }
    out.push_str(&format!("Access Control List: {acl}\n"));
    out
}
