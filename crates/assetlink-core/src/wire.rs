//! AssetLink wire format: the 11-byte packet header and fragmentation rules.
//!
//! Every packet on the connection is this header followed by exactly
//! `payload_size` bytes of payload. Multi-byte fields are little-endian.
//!
//! ```text
//!  offset  field              width
//!  0       signature (0x01)   1
//!  1       sequence           2
//!  3       request type       1
//!  4       payload size       4
//!  8       file type          1
//!  9       operation id       1
//!  10      end marker         1   (0xF0 = more fragments, 0x0F = last)
//! ```
//!
//! The header struct is `#[repr(C)]` over unaligned byte-order types and
//! uses zerocopy derives, so encoding and decoding need no unsafe code.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 11;

/// First byte of every well-formed header.
pub const HEADER_SIGN: u8 = 0x01;

/// End marker: more fragments of this exchange follow.
pub const MORE_FRAGMENTS: u8 = 0xF0;

/// End marker: this is the final fragment of the exchange.
pub const LAST_FRAGMENT: u8 = 0x0F;

/// Largest payload carried by a single packet.
/// Larger data must be split into fragments by the sender.
pub const MAX_FRAGMENT_PAYLOAD: usize = 128 * 1024;

/// Operation id reserved for connection-level packets
/// (suspend, liveness probes). Never assigned to an operation.
pub const CONTROL_OPERATION_ID: u8 = 0;

// ── Raw header ────────────────────────────────────────────────────────────────

/// On-wire header layout.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct WireHeader {
    pub sign: u8,
    pub sequence: U16<LittleEndian>,
    pub request_type: u8,
    pub payload_size: U32<LittleEndian>,
    pub file_type: u8,
    pub operation_id: u8,
    pub end_marker: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(WireHeader, [u8; HEADER_SIZE]);

// ── Enumerations ──────────────────────────────────────────────────────────────

/// Kind of a packet, carried in the `request_type` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PacketType {
    FileInfo = 0,
    IdRequest = 1,
    Id = 2,
    HealthRecord = 3,
    Story = 4,
    Manager = 5,
    Update = 6,
    NewUser = 7,
    File = 8,
    FileRequest = 9,
    Error = 10,
    /// Connection teardown. Sent by the peer, or synthesized locally by the
    /// watchdog, the communicator, or a manual shutdown.
    Suspend = 11,
    /// Liveness probe from the peer; echoed back unchanged.
    ConnectionCheck = 12,
    FileSaveDone = 13,
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        Ok(match value {
            0 => PacketType::FileInfo,
            1 => PacketType::IdRequest,
            2 => PacketType::Id,
            3 => PacketType::HealthRecord,
            4 => PacketType::Story,
            5 => PacketType::Manager,
            6 => PacketType::Update,
            7 => PacketType::NewUser,
            8 => PacketType::File,
            9 => PacketType::FileRequest,
            10 => PacketType::Error,
            11 => PacketType::Suspend,
            12 => PacketType::ConnectionCheck,
            13 => PacketType::FileSaveDone,
            other => return Err(WireError::UnknownPacketType(other)),
        })
    }
}

impl From<PacketType> for u8 {
    fn from(t: PacketType) -> u8 {
        t as u8
    }
}

/// Asset classification carried in the `file_type` header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FileType {
    /// Downloadable content shipped by the server.
    Dlc = 0,
    /// Files uploaded by a user.
    User = 1,
    /// Packet carries no file.
    NoFile = 2,
}

impl TryFrom<u8> for FileType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FileType::Dlc),
            1 => Ok(FileType::User),
            2 => Ok(FileType::NoFile),
            other => Err(WireError::UnknownFileType(other)),
        }
    }
}

impl From<FileType> for u8 {
    fn from(t: FileType) -> u8 {
        t as u8
    }
}

/// Error classification, both on the wire (`Error` and `Suspend` payloads)
/// and in the events handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ErrorType {
    Success = 0,
    SocketClosed = 1,
    FileNotFound = 2,
    ArgumentError = 3,
    /// File length was 0.
    EmptyFile = 4,
    /// A packet of the wrong kind, or a malformed one, arrived.
    InvalidPacket = 5,
    /// The server has no more user ids to assign.
    NoMoreId = 6,
    /// The watchdog saw no traffic for its interval.
    ConnectionCheckFailed = 7,
    /// The application called shutdown.
    ManualShutdown = 8,
    Unknown = 9,
}

impl From<u8> for ErrorType {
    /// Unrecognised bytes map to `Unknown`; error codes are informational.
    fn from(value: u8) -> Self {
        match value {
            0 => ErrorType::Success,
            1 => ErrorType::SocketClosed,
            2 => ErrorType::FileNotFound,
            3 => ErrorType::ArgumentError,
            4 => ErrorType::EmptyFile,
            5 => ErrorType::InvalidPacket,
            6 => ErrorType::NoMoreId,
            7 => ErrorType::ConnectionCheckFailed,
            8 => ErrorType::ManualShutdown,
            _ => ErrorType::Unknown,
        }
    }
}

impl From<ErrorType> for u8 {
    fn from(e: ErrorType) -> u8 {
        e as u8
    }
}

// ── Decoded header ────────────────────────────────────────────────────────────

/// Header fields in host representation.
///
/// `request_type` and `file_type` stay raw bytes: an unknown value is not a
/// header error, it is up to the receiving operation to reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sequence: u16,
    pub request_type: u8,
    pub payload_size: u32,
    pub file_type: u8,
    pub operation_id: u8,
    pub continuation: bool,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let raw = WireHeader {
            sign: HEADER_SIGN,
            sequence: U16::new(self.sequence),
            request_type: self.request_type,
            payload_size: U32::new(self.payload_size),
            file_type: self.file_type,
            operation_id: self.operation_id,
            end_marker: if self.continuation {
                MORE_FRAGMENTS
            } else {
                LAST_FRAGMENT
            },
        };
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Decode the first `HEADER_SIZE` bytes of `bytes`.
    ///
    /// Fails only on a short buffer or a signature mismatch. Any end marker
    /// other than `MORE_FRAGMENTS` reads as the last fragment.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let raw = WireHeader::read_from_prefix(bytes)
            .ok_or(WireError::TruncatedHeader(bytes.len()))?;
        if raw.sign != HEADER_SIGN {
            return Err(WireError::BadSignature(raw.sign));
        }
        Ok(Self {
            sequence: raw.sequence.get(),
            request_type: raw.request_type,
            payload_size: raw.payload_size.get(),
            file_type: raw.file_type,
            operation_id: raw.operation_id,
            continuation: raw.end_marker == MORE_FRAGMENTS,
        })
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// One protocol message: header fields plus payload.
///
/// The payload size is always derived from `payload`, so the
/// size-matches-payload invariant cannot be broken by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u16,
    pub request_type: u8,
    pub file_type: u8,
    pub operation_id: u8,
    pub continuation: bool,
    pub payload: Bytes,
}

impl Packet {
    /// A single, final packet with sequence 0 and no file attached.
    pub fn new(kind: PacketType, operation_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence: 0,
            request_type: kind.into(),
            file_type: FileType::NoFile.into(),
            operation_id,
            continuation: false,
            payload: payload.into(),
        }
    }

    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn with_continuation(mut self, continuation: bool) -> Self {
        self.continuation = continuation;
        self
    }

    /// Connection-level teardown packet carrying `reason` as its only byte.
    pub fn suspend(reason: ErrorType) -> Self {
        Self::new(
            PacketType::Suspend,
            CONTROL_OPERATION_ID,
            crate::payload::encode_suspend(reason),
        )
    }

    /// Reassemble a packet from a decoded header and the payload read after it.
    pub fn from_parts(header: PacketHeader, payload: Bytes) -> Result<Self, WireError> {
        if payload.len() != header.payload_size as usize {
            return Err(WireError::PayloadSizeMismatch {
                declared: header.payload_size,
                actual: payload.len(),
            });
        }
        Ok(Self {
            sequence: header.sequence,
            request_type: header.request_type,
            file_type: header.file_type,
            operation_id: header.operation_id,
            continuation: header.continuation,
            payload,
        })
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            sequence: self.sequence,
            request_type: self.request_type,
            payload_size: self.payload.len() as u32,
            file_type: self.file_type,
            operation_id: self.operation_id,
            continuation: self.continuation,
        }
    }

    /// `None` when the request type byte is not a known `PacketType`.
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::try_from(self.request_type).ok()
    }

    pub fn is(&self, kind: PacketType) -> bool {
        self.request_type == u8::from(kind)
    }

    /// Header and payload, ready for the socket.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        buf.put_slice(&self.header().encode());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

// ── Fragmentation ─────────────────────────────────────────────────────────────

/// Split `data` into packets of at most `capacity` payload bytes.
///
/// All fragments share `operation_id`, carry consecutive sequence numbers
/// starting at `first_sequence`, and all but the last have `continuation`
/// set. Empty data yields no fragments.
///
/// # Panics
/// If `capacity` is zero.
pub fn fragment(
    kind: PacketType,
    operation_id: u8,
    file_type: FileType,
    data: &Bytes,
    capacity: usize,
    first_sequence: u16,
) -> Vec<Packet> {
    assert!(capacity > 0, "fragment capacity must be non-zero");
    let count = data.len().div_ceil(capacity);
    (0..count)
        .map(|i| {
            let start = i * capacity;
            let end = (start + capacity).min(data.len());
            Packet::new(kind, operation_id, data.slice(start..end))
                .with_file_type(file_type)
                .with_sequence(first_sequence.wrapping_add(i as u16))
                .with_continuation(i + 1 < count)
        })
        .collect()
}

/// `File` fragments for a whole transfer, numbered from 1.
///
/// Unlike [`fragment`], an empty file still produces one zero-length
/// terminal packet so the receiver sees the end of the transfer.
pub fn file_fragments(operation_id: u8, file_type: FileType, data: &Bytes) -> Vec<Packet> {
    if data.is_empty() {
        let last = Packet::new(PacketType::File, operation_id, Bytes::new())
            .with_file_type(file_type)
            .with_sequence(1);
        return vec![last];
    }
    fragment(
        PacketType::File,
        operation_id,
        file_type,
        data,
        MAX_FRAGMENT_PAYLOAD,
        1,
    )
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("header error: bad signature byte 0x{0:02x}")]
    BadSignature(u8),

    #[error("header error: {0} bytes available, {} required", HEADER_SIZE)]
    TruncatedHeader(usize),

    #[error("payload length {0} exceeds maximum {}", MAX_FRAGMENT_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("header declares {declared} payload bytes, got {actual}")]
    PayloadSizeMismatch { declared: u32, actual: usize },

    #[error("unknown packet type byte: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("unknown file type byte: 0x{0:02x}")]
    UnknownFileType(u8),

    #[error("file name must be 1..={} bytes, got {0}", crate::payload::MAX_FILE_NAME_LEN)]
    FileNameLength(usize),

    #[error("file name is not ASCII")]
    NonAsciiFileName,

    #[error("{kind} payload truncated: {len} bytes")]
    TruncatedPayload { kind: &'static str, len: usize },
}

// ── Tests ─────────────────────────────────────────────────────────────────────
