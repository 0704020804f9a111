//! The coordinator's listener and per-connection dispatch loop
//! (spec.md S5: "thread-per-connection... each request is fully
//! synchronous"). One task per accepted socket; within a connection,
//! records are handled one at a time until the peer closes, at which
//! point any sentence leases still held by the last-seen username on
//! that connection are released (SPEC_FULL.md S11).

use super::registry::AccessRequest;
use super::CoordinatorState;
use crate::error::{ErrorCode, ServerError};
use crate::protocol::{self, Command, MsgType, Record};
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn serve(state: Arc<CoordinatorState>, listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        socket.set_nodelay(true).ok();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, socket).await {
                tracing::debug!(%peer, error = %e, "coordinator connection ended");
            }
        });
    }
}

async fn handle_connection(state: Arc<CoordinatorState>, socket: tokio::net::TcpStream) -> std::io::Result<()> {
    let (mut read_half, mut write_half) = socket.into_split();
    let mut connection_user: Option<String> = None;

    while let Some(request) = protocol::read_record(&mut read_half).await? {
        let reply = match request.msg_type {
            MsgType::RegisterNode => handle_register_node(&state, &request),
            MsgType::RegisterUser => {
                connection_user = Some(request.username.clone());
                handle_register_user(&state, &request)
            }
            MsgType::Command => {
                if !request.username.is_empty() {
                    connection_user = Some(request.username.clone());
                }
                dispatch_command(&state, &request).await
            }
            MsgType::Response | MsgType::NodeCommand => {
                Record::error(&ServerError::new(ErrorCode::InvalidCommand, "unexpected message type"))
            }
        };
        protocol::write_record(&mut write_half, &reply).await?;
    }

    if let Some(username) = connection_user {
        state.release_all_leases_for(&username);
    }
    Ok(())
}

fn handle_register_node(state: &CoordinatorState, request: &Record) -> Record {
    let fields: Vec<&str> = request.data.split('|').collect();
    if fields.len() != 4 {
        return Record::error(&ServerError::new(
            ErrorCode::InvalidParameters,
            "expected node_id|host|coord_port|client_port",
        ));
    }
    let (node_id, host) = (fields[0], fields[1]);
    let (Ok(coord_port), Ok(client_port)) = (fields[2].parse::<u16>(), fields[3].parse::<u16>()) else {
        return Record::error(&ServerError::new(ErrorCode::InvalidParameters, "invalid port"));
    };
    state.register_node(node_id, host, coord_port, client_port);
    Record::ok(format!("registered {node_id}"))
}

fn handle_register_user(state: &CoordinatorState, request: &Record) -> Record {
    state.register_user(&request.username, &request.data);
    Record::ok("registered")
}

async fn dispatch_command(state: &CoordinatorState, request: &Record) -> Record {
    let username = request.username.as_str();
    let filename = request.filename.as_str();

    let result = match request.command {
        Command::View => Ok(Record::ok(format_view(state))),
        Command::List => Ok(Record::ok(state.list_users().join("\n"))),
        Command::Create => state.create(filename, username).map(|e| Record::ok(format!("{}|{}", e.host, e.client_port))),
        Command::Read => state.resolve(filename).map(|e| Record::ok(format!("{}|{}", e.host, e.client_port))),
        Command::Delete => match state.delete(filename, username).await {
            Ok(()) => Ok(Record::ok("deleted")),
            Err(e) => Err(e),
        },
        Command::LockAcquire => parse_sentence_index(request).and_then(|idx| {
            state.lock_acquire(filename, idx, username).map(|e| Record::ok(format!("{}|{}", e.host, e.client_port)))
        }),
        Command::LockRelease => {
            parse_sentence_index(request).and_then(|idx| state.lock_release(filename, idx, username)).map(|()| Record::ok("released"))
        }
        Command::Exec => match state.exec(filename, username).await {
            Ok((output, _code)) => Ok(Record::ok(output)),
            Err(e) => Err(e),
        },
        Command::RequestAccess => state.request_access(filename, username).map(|()| Record::ok("requested")),
        Command::ViewRequests => Ok(Record::ok(format_requests(state.view_requests(username)))),
        Command::ApproveRequest => match state.approve(filename, &request.data, username).await {
            Ok(()) => Ok(Record::ok("approved")),
            Err(e) => Err(e),
        },
        Command::DenyRequest => state.deny(filename, &request.data, username).map(|()| Record::ok("denied")),
        Command::Heartbeat => handle_heartbeat(state, request),
        _ => Err(ServerError::new(ErrorCode::InvalidCommand, "not a coordinator command")),
    };

    result.unwrap_or_else(|e| Record::error(&e))
}

fn handle_heartbeat(state: &CoordinatorState, request: &Record) -> Result<Record, ServerError> {
    let mut fields = request.data.splitn(2, '|');
    let node_id = fields.next().unwrap_or_default();
    let file_count: u64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    state.heartbeat(node_id, file_count)?;
    Ok(Record::ok("ack"))
}

fn parse_sentence_index(request: &Record) -> Result<u32, ServerError> {
    request
        .data
        .parse()
        .map_err(|_| ServerError::new(ErrorCode::InvalidParameters, "expected a numeric sentence index"))
}

fn format_view(state: &CoordinatorState) -> String {
    state
        .view()
        .into_iter()
        .map(|f| format!("{}|{}|{}|{}", f.filename, f.owner, f.word_count, f.char_count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_requests(requests: Vec<AccessRequest>) -> String {
    requests
        .into_iter()
        .map(|r| format!("{}|{}|{}", r.filename, r.requester, r.requested))
        .collect::<Vec<_>>()
        .join("\n")
}
