//! Registration and periodic HEARTBEAT sending to the coordinator
//! (SPEC_FULL.md S11: "sends HEARTBEAT on the cadence implied by the
//! coordinator's liveness threshold"). Mirrors the request shape of
//! `super::super::coordinator::node_client`, just issued in the other
//! direction.

use super::StorageEngine;
use crate::error::{ErrorCode, Result, ServerError};
use crate::protocol::{Command, MsgType, Record};
use std::sync::Arc;
use tokio::net::TcpStream;

async fn call(host: &str, port: u16, record: Record) -> Result<Record> {
    let stream = tokio::time::timeout(crate::protocol::IO_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "connect to coordinator timed out"))?
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "coordinator unreachable"))?;

    let (mut read_half, mut write_half) = stream.into_split();
    crate::protocol::write_record(&mut write_half, &record)
        .await
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "write to coordinator failed"))?;
    crate::protocol::read_record(&mut read_half)
        .await
        .map_err(|_| ServerError::new(ErrorCode::StorageDown, "read from coordinator failed"))?
        .ok_or_else(|| ServerError::new(ErrorCode::StorageDown, "coordinator closed connection"))
}

/// One-shot REGISTER-NODE call, made before the node starts accepting
/// client connections (spec.md S4.1 "storage nodes register with the
/// coordinator on startup").
pub async fn register(engine: &StorageEngine) -> Result<()> {
    let config = &engine.config;
    // Two distinct listening ports, per spec.md S6: one for
    // coordinator-issued node control, one for direct client traffic.
    let data = format!("{}|127.0.0.1|{}|{}", config.node_id, config.node_coord_port, config.client_port);
    let record = Record {
        msg_type: MsgType::RegisterNode,
        command: Command::Unknown,
        error_code: 0,
        username: String::new(),
        filename: String::new(),
        data,
    };
    let reply = call(&config.coordinator_host, config.coordinator_port, record).await?;
    if reply.error_code != crate::error::ErrorCode::Success as u32 {
        return Err(ServerError::new(crate::error::ErrorCode::from_wire(reply.error_code), reply.data));
    }
    tracing::info!(node_id = %config.node_id, "registered with coordinator");
    Ok(())
}

/// Spawns the background loop that sends HEARTBEAT on the node's
/// configured cadence. Failures are logged and retried on the next
/// tick rather than aborting the node.
pub fn spawn(engine: Arc<StorageEngine>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(engine.config.heartbeat_interval());
        loop {
            interval.tick().await;
            if let Err(e) = send_once(&engine).await {
                tracing::warn!(error = %e, "heartbeat to coordinator failed");
            }
        }
    })
}

async fn send_once(engine: &StorageEngine) -> Result<()> {
    let config = &engine.config;
    let data = format!("{}|{}", config.node_id, engine.file_count());
    let record = Record {
        msg_type: MsgType::Command,
        command: Command::Heartbeat,
        error_code: 0,
        username: String::new(),
        filename: String::new(),
        data,
    };
    let reply = call(&config.coordinator_host, config.coordinator_port, record).await?;
    if reply.error_code != crate::error::ErrorCode::Success as u32 {
        return Err(ServerError::new(crate::error::ErrorCode::from_wire(reply.error_code), reply.data));
    }
    Ok(())
}
