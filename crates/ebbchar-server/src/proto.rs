//! Wire format.
//!
//! Every frame is a 1-byte opcode, a 4-byte big-endian payload length and
//! the payload itself:
//!
//! ```text
//! ┌────────┬────────────────┬──────────────────────┐
//! │ opcode │ length (u32 BE)│ payload (length B)   │
//! └────────┴────────────────┴──────────────────────┘
//! ```
//!
//! Requests flow client → server, responses server → client. One TCP
//! connection carries exactly one device handle.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ebbchar_core::BrokerError;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the frame header in bytes.
pub const HEADER_SIZE: usize = 5;

mod opcode {
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;
    pub const CLOSE: u8 = 0x03;

    pub const OPENED: u8 = 0x81;
    pub const WRITTEN: u8 = 0x82;
    pub const DATA: u8 = 0x83;
    pub const CLOSED: u8 = 0x84;
    pub const ERROR: u8 = 0xE0;
}

/// Frame decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Declared payload exceeds the configured limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Declared payload length.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Opcode is not valid in this direction.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Payload does not match what the opcode requires.
    #[error("invalid payload for opcode {opcode:#04x}: {reason}")]
    InvalidPayload {
        /// Opcode of the offending frame.
        opcode: u8,
        /// What was wrong.
        reason: String,
    },
}

/// Error codes carried by [`Response::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// No free admission slot.
    Busy = 1,
    /// Read with nothing pending.
    Empty = 2,
    /// Handle unknown or closed.
    NotFound = 3,
    /// Message exceeds the server limit.
    TooLarge = 4,
    /// Unexpected broker failure.
    Internal = 5,
    /// Malformed request.
    Invalid = 6,
}

impl ErrorCode {
    fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Busy),
            2 => Some(Self::Empty),
            3 => Some(Self::NotFound),
            4 => Some(Self::TooLarge),
            5 => Some(Self::Internal),
            6 => Some(Self::Invalid),
            _ => None,
        }
    }
}

impl From<&BrokerError> for ErrorCode {
    fn from(err: &BrokerError) -> Self {
        match err {
            BrokerError::Busy { .. } => Self::Busy,
            BrokerError::Empty(_) => Self::Empty,
            BrokerError::NotFound(_) => Self::NotFound,
            BrokerError::AlreadyConsumed
            | BrokerError::DoubleRelease { .. }
            | BrokerError::InvalidCapacity(_)
            | BrokerError::SlotLeak { .. } => Self::Internal,
        }
    }
}

impl From<&CodecError> for ErrorCode {
    fn from(err: &CodecError) -> Self {
        match err {
            CodecError::FrameTooLarge { .. } => Self::TooLarge,
            CodecError::UnknownOpcode(_) | CodecError::InvalidPayload { .. } => Self::Invalid,
        }
    }
}

/// Client requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Replace the pending message.
    Write(Bytes),
    /// Consume the pending message.
    Read {
        /// Maximum bytes to return.
        max_len: u32,
    },
    /// Release the handle.
    Close,
}

/// Server responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Handle admitted.
    Opened {
        /// Broker handle number.
        session_id: u64,
    },
    /// Write accepted.
    Written {
        /// Bytes accepted.
        len: u32,
    },
    /// Message bytes from a read.
    Data(Bytes),
    /// Handle released.
    Closed,
    /// Operation failed.
    Error {
        /// Failure class.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

impl Response {
    /// Error response describing a broker failure.
    pub fn from_broker_error(err: &BrokerError) -> Self {
        Self::Error { code: err.into(), message: err.to_string() }
    }
}

/// A raw frame: opcode plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Operation code.
    pub opcode: u8,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let len = u32::try_from(self.payload.len()).map_err(|_| CodecError::FrameTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize,
        })?;

        dst.reserve(HEADER_SIZE + self.payload.len());
        dst.put_u8(self.opcode);
        dst.put_u32(len);
        dst.put_slice(&self.payload);
        Ok(())
    }
}

impl Request {
    /// Convert into a raw frame.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Write(data) => Frame { opcode: opcode::WRITE, payload: data.clone() },
            Self::Read { max_len } => Frame {
                opcode: opcode::READ,
                payload: Bytes::copy_from_slice(&max_len.to_be_bytes()),
            },
            Self::Close => Frame { opcode: opcode::CLOSE, payload: Bytes::new() },
        }
    }

    /// Parse a raw frame.
    pub fn from_frame(frame: Frame) -> Result<Self, CodecError> {
        match frame.opcode {
            opcode::WRITE => Ok(Self::Write(frame.payload)),
            opcode::READ => {
                let mut payload = exact_payload(&frame, 4)?;
                Ok(Self::Read { max_len: payload.get_u32() })
            },
            opcode::CLOSE => {
                exact_payload(&frame, 0)?;
                Ok(Self::Close)
            },
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }
}

impl Response {
    /// Convert into a raw frame.
    pub fn to_frame(&self) -> Frame {
        match self {
            Self::Opened { session_id } => Frame {
                opcode: opcode::OPENED,
                payload: Bytes::copy_from_slice(&session_id.to_be_bytes()),
            },
            Self::Written { len } => Frame {
                opcode: opcode::WRITTEN,
                payload: Bytes::copy_from_slice(&len.to_be_bytes()),
            },
            Self::Data(data) => Frame { opcode: opcode::DATA, payload: data.clone() },
            Self::Closed => Frame { opcode: opcode::CLOSED, payload: Bytes::new() },
            Self::Error { code, message } => {
                let mut payload = BytesMut::with_capacity(1 + message.len());
                payload.put_u8(*code as u8);
                payload.put_slice(message.as_bytes());
                Frame { opcode: opcode::ERROR, payload: payload.freeze() }
            },
        }
    }

    /// Parse a raw frame.
    pub fn from_frame(frame: Frame) -> Result<Self, CodecError> {
        match frame.opcode {
            opcode::OPENED => {
                let mut payload = exact_payload(&frame, 8)?;
                Ok(Self::Opened { session_id: payload.get_u64() })
            },
            opcode::WRITTEN => {
                let mut payload = exact_payload(&frame, 4)?;
                Ok(Self::Written { len: payload.get_u32() })
            },
            opcode::DATA => Ok(Self::Data(frame.payload)),
            opcode::CLOSED => {
                exact_payload(&frame, 0)?;
                Ok(Self::Closed)
            },
            opcode::ERROR => {
                let mut payload = frame.payload.clone();
                if payload.is_empty() {
                    return Err(invalid(frame.opcode, "missing error code"));
                }
                let raw = payload.get_u8();
                let code = ErrorCode::from_u8(raw)
                    .ok_or_else(|| invalid(frame.opcode, format!("unknown error code {raw}")))?;
                let message = String::from_utf8_lossy(&payload).into_owned();
                Ok(Self::Error { code, message })
            },
            other => Err(CodecError::UnknownOpcode(other)),
        }
    }
}

fn invalid(opcode: u8, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidPayload { opcode, reason: reason.into() }
}

fn exact_payload(frame: &Frame, len: usize) -> Result<Bytes, CodecError> {
    if frame.payload.len() != len {
        return Err(invalid(
            frame.opcode,
            format!("expected {len} payload bytes, got {}", frame.payload.len()),
        ));
    }
    Ok(frame.payload.clone())
}

/// Errors while reading a frame from a stream.
#[derive(Debug, Error)]
pub enum FrameReadError {
    /// Underlying I/O failure (including EOF inside a frame).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame violated the wire format.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary.
pub async fn read_frame<R>(
    reader: &mut R,
    max_payload: usize,
) -> Result<Option<Frame>, FrameReadError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];

    let first = reader.read(&mut header[..1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let mut cursor = &header[..];
    let opcode = cursor.get_u8();
    let size = cursor.get_u32() as usize;

    if size > max_payload {
        return Err(CodecError::FrameTooLarge { size, max: max_payload }.into());
    }

    let mut payload = BytesMut::zeroed(size);
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame { opcode, payload: payload.freeze() }))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameReadError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
