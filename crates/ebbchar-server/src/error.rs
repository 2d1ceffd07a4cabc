//! Server and client error types.

use std::fmt;

use ebbchar_core::BrokerError;
use thiserror::Error;

use crate::proto::{CodecError, ErrorCode, FrameReadError};

/// Errors that can occur in the server.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error
    Config(String),

    /// Transport/network error
    Transport(String),

    /// Protocol error
    Protocol(CodecError),

    /// Broker error
    Broker(BrokerError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Protocol(err) => write!(f, "protocol error: {}", err),
            Self::Broker(err) => write!(f, "broker error: {}", err),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Broker(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BrokerError> for ServerError {
    fn from(err: BrokerError) -> Self {
        Self::Broker(err)
    }
}

impl From<CodecError> for ServerError {
    fn from(err: CodecError) -> Self {
        Self::Protocol(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<FrameReadError> for ServerError {
    fn from(err: FrameReadError) -> Self {
        match err {
            FrameReadError::Io(e) => e.into(),
            FrameReadError::Codec(e) => e.into(),
        }
    }
}

/// Errors from [`DeviceClient`](crate::DeviceClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Server has no free slot; the connection was closed.
    #[error("device busy: {0}")]
    Busy(String),

    /// Server reported a failure.
    #[error("server error ({code:?}): {message}")]
    Remote {
        /// Failure class.
        code: ErrorCode,
        /// Server-provided detail.
        message: String,
    },

    /// Server answered with a response that does not fit the request.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Server closed the connection mid-exchange.
    #[error("connection closed by server")]
    Disconnected,

    /// Frame could not be read or written.
    #[error(transparent)]
    Frame(#[from] FrameReadError),

    /// Frame violated the wire format.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Connection failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true if retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
