//! Wire-level error taxonomy shared by the coordinator and storage node.
//!
//! [`ErrorCode`] is the closed enumeration from the wire protocol (a
//! `u32` on the record). [`ServerError`] is the richer, in-process error
//! used internally; every fallible operation converts down to an
//! [`ErrorCode`] at the point it is written onto a response record.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use std::fmt;

/// Closed set of error codes that may appear in a response record's
/// `error_code` field. `Success` is `0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    FileNotFound = 1,
    Unauthorized = 2,
    FileLocked = 3,
    InvalidIndex = 4,
    FileExists = 5,
    PermissionDenied = 6,
    InvalidCommand = 7,
    StorageDown = 8,
    Internal = 9,
    UserNotFound = 10,
    NoNodes = 11,
    InvalidParameters = 12,
    ExecFailed = 13,
}

impl ErrorCode {
    /// Decodes a raw wire value, falling back to [`ErrorCode::Internal`]
    /// for anything outside the closed enumeration.
    pub fn from_wire(value: u32) -> ErrorCode {
        FromPrimitive::from_u32(value).unwrap_or(ErrorCode::Internal)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorCode::Success => "success",
            ErrorCode::FileNotFound => "file not found",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::FileLocked => "file locked",
            ErrorCode::InvalidIndex => "invalid index",
            ErrorCode::FileExists => "file already exists",
            ErrorCode::PermissionDenied => "permission denied",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::StorageDown => "storage node down",
            ErrorCode::Internal => "internal error",
            ErrorCode::UserNotFound => "user not found",
            ErrorCode::NoNodes => "no storage nodes available",
            ErrorCode::InvalidParameters => "invalid parameters",
            ErrorCode::ExecFailed => "exec failed",
        };
        f.write_str(msg)
    }
}

/// In-process error carrying an [`ErrorCode`] plus a human-readable
/// detail string that is placed in the response's `data` field (e.g.
/// `FileLocked` attaches the holder's username, per spec.md S2).
#[derive(Debug, Clone)]
pub struct ServerError {
    pub code: ErrorCode,
    pub detail: String,
}

impl ServerError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into() }
    }

    pub fn simple(code: ErrorCode) -> Self {
        let detail = code.to_string();
        Self { code, detail }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.detail)
    }
}

impl std::error::Error for ServerError {}

/// Wraps a disk/IO failure as an [`ErrorCode::Internal`] `ServerError`,
/// logging the underlying cause at `error!` per spec.md S7(c) before the
/// detail is discarded from the wire reply.
impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!(error = %err, "internal I/O failure");
        ServerError::new(ErrorCode::Internal, "internal error")
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
