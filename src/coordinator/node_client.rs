//! The coordinator acting as a client of a storage node: fetching a
//! file's content for EXEC, pushing an ACL grant for APPROVE, and
//! best-effort DELETE propagation (spec.md S4.1, SPEC_FULL.md S12).
//!
//! These calls go out the node's coordinator-facing port, framed as
//! `NodeCommand` records, matching the "node registers with the
//! coordinator" / "coordinator-facing port used for node-level
//! control" split described in spec.md S6.

use crate::error::{ErrorCode, ServerError, Result};
use crate::protocol::{Command, MsgType, Record};
use tokio::net::TcpStream;

async fn call(host: &str, port: u16, record: Record) -> Result<Record> {
    let stream = tokio::time::timeout(
        crate::protocol::IO_TIMEOUT,
        TcpStream::connect((host, port)),
    )
    .await
    .map_err(|_| ServerError::new(ErrorCode::StorageDown, "connect timed out"))?
    .map_err(|_| ServerError::new(ErrorCode::StorageDown, "storage node unreachable"))?;

    let (mut read_half, mut write_half) = stream.into_split();
    crate::protocol::write_record(&mut write_half, &record)
        .await
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "write to storage node failed"))?;

    let reply = crate::protocol::read_record(&mut read_half)
        .await
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "read from storage node failed"))?
        .ok_or_else(|| ServerError::new(ErrorCode::StorageDown, "storage node closed connection"))?;

    Ok(reply)
}

fn node_command(command: Command, username: &str, filename: &str, data: &str) -> Record {
    Record {
        msg_type: MsgType::NodeCommand,
        command,
        error_code: 0,
        username: username.to_string(),
        filename: filename.to_string(),
        data: data.to_string(),
    }
}

/// Fetches `filename`'s full content from the node, acting as
/// `username` (used by EXEC, spec.md S4.1).
pub async fn fetch_content(host: &str, port: u16, username: &str, filename: &str) -> Result<String> {
    let reply = call(host, port, node_command(Command::Read, username, filename, "")).await?;
    if reply.error_code != ErrorCode::Success as u32 {
        return Err(ServerError::new(ErrorCode::from_wire(reply.error_code), reply.data));
    }
    Ok(reply.data)
}

/// Grants `target` READ permission on `filename` on the node, issued
/// by the owner as part of APPROVE (spec.md S4.1).
pub async fn grant_read_access(
    host: &str,
    port: u16,
    owner: &str,
    filename: &str,
    target: &str,
) -> Result<()> {
    let reply = call(host, port, node_command(Command::AddAccess, owner, filename, target)).await?;
    if reply.error_code != ErrorCode::Success as u32 {
        return Err(ServerError::new(ErrorCode::from_wire(reply.error_code), reply.data));
    }
    Ok(())
}

/// Best-effort request to remove `filename` from the node, issued on
/// coordinator DELETE (SPEC_FULL.md S12's resolution of spec.md S9's
/// open question). Failures are logged by the caller and do not block
/// the coordinator's own registry removal.
pub async fn request_delete(host: &str, port: u16, owner: &str, filename: &str) -> Result<()> {
    let reply = call(host, port, node_command(Command::Delete, owner, filename, "")).await?;
    if reply.error_code != ErrorCode::Success as u32 {
        return Err(ServerError::new(ErrorCode::from_wire(reply.error_code), reply.data));
    }
    Ok(())
}
