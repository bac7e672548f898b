//! Payload bodies for the structured packet kinds.
//!
//! ```text
//! FileRequest : user_id u32 | name_len u8 | name
//! FileInfo    : file_size u32 | user_id u32 | name_len u8 | name
//! Id          : user_id u32
//! Error       : failed request type u8 | error u8
//! Suspend     : error u8
//! ```
//!
//! Integers are little-endian. File names are ASCII, 1..=256 bytes; since
//! the length byte cannot hold 256, a length byte of 0 stands for 256
//! (empty names are never sent).

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::wire::{ErrorType, PacketType, WireError};

/// Longest file name accepted on the wire.
pub const MAX_FILE_NAME_LEN: usize = 256;

/// Check a file name and return its wire bytes.
pub fn validate_file_name(name: &str) -> Result<&[u8], WireError> {
    if !name.is_ascii() {
        return Err(WireError::NonAsciiFileName);
    }
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_FILE_NAME_LEN {
        return Err(WireError::FileNameLength(bytes.len()));
    }
    Ok(bytes)
}

fn put_name(buf: &mut BytesMut, name: &[u8]) {
    // 256 wraps to 0; see module docs.
    buf.put_u8(name.len() as u8);
    buf.put_slice(name);
}

fn get_name(buf: &mut &[u8], kind: &'static str, total: usize) -> Result<String, WireError> {
    if buf.remaining() < 1 {
        return Err(WireError::TruncatedPayload { kind, len: total });
    }
    let len = match buf.get_u8() {
        0 => MAX_FILE_NAME_LEN,
        n => n as usize,
    };
    if buf.remaining() < len {
        return Err(WireError::TruncatedPayload { kind, len: total });
    }
    let name = &buf[..len];
    if !name.is_ascii() {
        return Err(WireError::NonAsciiFileName);
    }
    let name = String::from_utf8_lossy(name).into_owned();
    buf.advance(len);
    Ok(name)
}

// ── FileRequest ───────────────────────────────────────────────────────────────

/// Body of a `FileRequest` packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequestBody {
    pub user_id: u32,
    pub file_name: String,
}

impl FileRequestBody {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let name = validate_file_name(&self.file_name)?;
        let mut buf = BytesMut::with_capacity(5 + name.len());
        buf.put_u32_le(self.user_id);
        put_name(&mut buf, name);
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        const KIND: &str = "FileRequest";
        let mut buf = payload;
        if buf.remaining() < 4 {
            return Err(WireError::TruncatedPayload {
                kind: KIND,
                len: payload.len(),
            });
        }
        let user_id = buf.get_u32_le();
        let file_name = get_name(&mut buf, KIND, payload.len())?;
        Ok(Self { user_id, file_name })
    }
}

// ── FileInfo ──────────────────────────────────────────────────────────────────

/// Body of a `FileInfo` packet: the metadata that leads a file transfer
/// in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfoBody {
    pub file_size: u32,
    pub user_id: u32,
    pub file_name: String,
}

impl FileInfoBody {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let name = validate_file_name(&self.file_name)?;
        let mut buf = BytesMut::with_capacity(9 + name.len());
        buf.put_u32_le(self.file_size);
        buf.put_u32_le(self.user_id);
        put_name(&mut buf, name);
        Ok(buf.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        const KIND: &str = "FileInfo";
        let mut buf = payload;
        if buf.remaining() < 8 {
            return Err(WireError::TruncatedPayload {
                kind: KIND,
                len: payload.len(),
            });
        }
        let file_size = buf.get_u32_le();
        let user_id = buf.get_u32_le();
        let file_name = get_name(&mut buf, KIND, payload.len())?;
        Ok(Self {
            file_size,
            user_id,
            file_name,
        })
    }
}

// ── Id / IdRequest ────────────────────────────────────────────────────────────

/// Body of an `IdRequest`: a single byte echoing the packet type.
pub fn encode_id_request() -> Bytes {
    Bytes::from_static(&[PacketType::IdRequest as u8])
}

pub fn encode_id(user_id: u32) -> Bytes {
    Bytes::copy_from_slice(&user_id.to_le_bytes())
}

pub fn decode_id(payload: &[u8]) -> Result<u32, WireError> {
    let mut buf = payload;
    if buf.remaining() < 4 {
        return Err(WireError::TruncatedPayload {
            kind: "Id",
            len: payload.len(),
        });
    }
    Ok(buf.get_u32_le())
}

// ── Error / Suspend ───────────────────────────────────────────────────────────

/// Body of an `Error` packet sent in reply to `request`.
pub fn encode_error(request: PacketType, error: ErrorType) -> Bytes {
    Bytes::copy_from_slice(&[request.into(), error.into()])
}

/// Error code of an `Error` packet.
///
/// Byte 1 carries the code; single-byte bodies carry it in byte 0.
pub fn decode_error(payload: &[u8]) -> ErrorType {
    match payload {
        [] => ErrorType::Unknown,
        [code] => ErrorType::from(*code),
        [_, code, ..] => ErrorType::from(*code),
    }
}

pub fn encode_suspend(reason: ErrorType) -> Bytes {
    Bytes::copy_from_slice(&[reason.into()])
}

pub fn decode_suspend(payload: &[u8]) -> ErrorType {
    payload
        .first()
        .map(|b| ErrorType::from(*b))
        .unwrap_or(ErrorType::Unknown)
}
