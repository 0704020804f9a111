use super::{Command, MsgType};
use crate::error::ErrorCode;

/// One wire record, decoded into owned Rust types. `data` holds the
/// `|`-separated payload described throughout spec.md S6 (e.g.
/// `"src|dst"`, `"filename|tag"`, STREAM's `|WORD|w1|WORD|w2…`).
#[derive(Debug, Clone)]
pub struct Record {
    pub msg_type: MsgType,
    pub command: Command,
    pub error_code: u32,
    pub username: String,
    pub filename: String,
    pub data: String,
}

impl Record {
    /// Builds a request record for `command`, error_code left at 0.
    pub fn request(command: Command, username: &str, filename: &str, data: &str) -> Record {
        Record {
            msg_type: MsgType::Command,
            command,
            error_code: 0,
            username: username.to_string(),
            filename: filename.to_string(),
            data: data.to_string(),
        }
    }

    /// Builds a successful response record echoing no command.
    pub fn ok(data: impl Into<String>) -> Record {
        Record {
            msg_type: MsgType::Response,
            command: Command::Unknown,
            error_code: ErrorCode::Success as u32,
            username: String::new(),
            filename: String::new(),
            data: data.into(),
        }
    }

    /// Builds an error response record, placing the error's detail
    /// string in `data` for the client to display.
    pub fn error(err: &crate::error::ServerError) -> Record {
        Record {
            msg_type: MsgType::Response,
            command: Command::Unknown,
            error_code: err.code as u32,
            username: String::new(),
            filename: String::new(),
            data: err.detail.clone(),
        }
    }

    /// Splits `data` on `|`, the multi-argument payload separator used
    /// throughout spec.md S6.
    pub fn args(&self) -> Vec<&str> {
        if self.data.is_empty() {
            Vec::new()
        } else {
            self.data.split('|').collect()
        }
    }
}
