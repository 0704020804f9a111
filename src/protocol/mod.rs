//! Fixed-size request/response record that flows between clients,
//! storage nodes, and the coordinator (spec.md S6).
//!
//! Every record is exactly [`RECORD_LEN`] bytes on the wire. Senders
//! loop until the whole buffer is written and receivers loop until a
//! full record has arrived or the peer has closed, mirroring the
//! length-looped `send_message`/`receive_message` pair of the original
//! `common.c`.

mod command;
mod msg_type;
mod record;

pub use command::Command;
pub use msg_type::MsgType;
pub use record::Record;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Maximum length of the `username` field, zero-padded on the wire.
pub const USERNAME_LEN: usize = 64;
/// Maximum length of the `filename` field, zero-padded on the wire.
pub const FILENAME_LEN: usize = 256;
/// Maximum length of the `data` payload, zero-padded on the wire.
pub const DATA_LEN: usize = 8192;

/// Total size in bytes of one wire record: three `u32` header fields,
/// the three fixed-size byte strings, and the `data_len` trailer.
pub const RECORD_LEN: usize = 4 + 4 + 4 + USERNAME_LEN + FILENAME_LEN + DATA_LEN + 4;

/// Bound on blocking socket operations (spec.md S5: "time-bounded
/// socket operations are required").
pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

fn write_fixed(buf: &mut Vec<u8>, s: &str, len: usize) -> io::Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > len {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "field too long"));
    }
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (len - bytes.len()), 0);
    Ok(())
}

fn read_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Serializes `record` into exactly [`RECORD_LEN`] bytes.
pub fn encode(record: &Record) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(RECORD_LEN);
    buf.write_u32::<BigEndian>(record.msg_type as u32)?;
    buf.write_u32::<BigEndian>(record.command as u32)?;
    buf.write_u32::<BigEndian>(record.error_code as u32)?;
    write_fixed(&mut buf, &record.username, USERNAME_LEN)?;
    write_fixed(&mut buf, &record.filename, FILENAME_LEN)?;
    write_fixed(&mut buf, &record.data, DATA_LEN)?;
    buf.write_u32::<BigEndian>(record.data.as_bytes().len() as u32)?;
    debug_assert_eq!(buf.len(), RECORD_LEN);
    Ok(buf)
}

/// Parses exactly [`RECORD_LEN`] bytes into a [`Record`].
pub fn decode(buf: &[u8]) -> io::Result<Record> {
    if buf.len() != RECORD_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "short record"));
    }
    let mut cur = io::Cursor::new(buf);
    let msg_type = MsgType::from_wire(cur.read_u32::<BigEndian>()?);
    let command = Command::from_wire(cur.read_u32::<BigEndian>()?);
    let error_code = cur.read_u32::<BigEndian>()?;

    let pos = cur.position() as usize;
    let username = read_fixed(&buf[pos..pos + USERNAME_LEN]);
    let pos = pos + USERNAME_LEN;
    let filename = read_fixed(&buf[pos..pos + FILENAME_LEN]);
    let pos = pos + FILENAME_LEN;
    let data_bytes = &buf[pos..pos + DATA_LEN];
    let pos = pos + DATA_LEN;

    let mut tail = io::Cursor::new(&buf[pos..]);
    let data_len = tail.read_u32::<BigEndian>()? as usize;
    let data_len = data_len.min(DATA_LEN);
    let data = String::from_utf8_lossy(&data_bytes[..data_len]).into_owned();

    Ok(Record { msg_type, command, error_code, username, filename, data })
}

/// Reads one full record from `reader`, bounded by [`IO_TIMEOUT`].
/// Returns `Ok(None)` on a clean peer close before any bytes arrive.
pub async fn read_record(reader: &mut OwnedReadHalf) -> io::Result<Option<Record>> {
    let mut buf = vec![0u8; RECORD_LEN];
    let mut filled = 0;
    while filled < RECORD_LEN {
        let n = tokio::time::timeout(IO_TIMEOUT, reader.read(&mut buf[filled..]))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed mid-record"));
        }
        filled += n;
    }
    decode(&buf).map(Some)
}

/// Writes one full record to `writer`, bounded by [`IO_TIMEOUT`].
pub async fn write_record(writer: &mut OwnedWriteHalf, record: &Record) -> io::Result<()> {
    let buf = encode(record)?;
    tokio::time::timeout(IO_TIMEOUT, writer.write_all(&buf))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??;
    Ok(())
}
