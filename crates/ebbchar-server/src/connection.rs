//! Per-connection handling.
//!
//! One TCP connection is one device handle. The handle is opened when the
//! connection is accepted and released when the client sends `Close`, hangs
//! up, or violates the protocol. [`OpenHandle`] makes the release happen on
//! every one of those paths.

use std::sync::Arc;

use ebbchar_core::{BrokerError, DeviceBroker, SessionId};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::ServerError,
    proto::{self, FrameReadError, Request, Response},
};

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Open was rejected as busy.
    Rejected,
    /// Client sent `Close`.
    Closed,
    /// Client hung up without closing.
    Disconnected,
    /// Client sent a malformed frame.
    ProtocolViolation,
}

/// Releases the broker handle when dropped unless it was closed explicitly.
struct OpenHandle {
    broker: Arc<DeviceBroker>,
    id: SessionId,
    released: bool,
}

impl OpenHandle {
    fn close(&mut self) -> Result<(), BrokerError> {
        self.released = true;
        self.broker.release(self.id)
    }
}

impl Drop for OpenHandle {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.broker.release(self.id) {
                tracing::warn!(session = %self.id, "Release on disconnect failed: {}", e);
            }
        }
    }
}

/// Serve one connection until it ends.
///
/// # Errors
///
/// Returns `ServerError::Transport` if writing a response fails. The handle
/// is released in that case as well.
pub async fn serve<S>(
    mut stream: S,
    broker: Arc<DeviceBroker>,
    max_message_len: usize,
) -> Result<SessionEnd, ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = match broker.open() {
        Ok(id) => id,
        Err(e @ BrokerError::Busy { .. }) => {
            send(&mut stream, &Response::from_broker_error(&e)).await?;
            return Ok(SessionEnd::Rejected);
        },
        Err(e) => return Err(e.into()),
    };

    let mut handle = OpenHandle { broker: Arc::clone(&broker), id, released: false };
    send(&mut stream, &Response::Opened { session_id: id.get() }).await?;

    loop {
        let frame = match proto::read_frame(&mut stream, max_message_len).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(session = %id, "Client disconnected");
                return Ok(SessionEnd::Disconnected);
            },
            Err(FrameReadError::Io(e)) => {
                tracing::debug!(session = %id, "Read error: {}", e);
                return Ok(SessionEnd::Disconnected);
            },
            Err(FrameReadError::Codec(e)) => {
                tracing::warn!(session = %id, "Invalid frame: {}", e);
                let response = Response::Error { code: (&e).into(), message: e.to_string() };
                send(&mut stream, &response).await?;
                return Ok(SessionEnd::ProtocolViolation);
            },
        };

        let request = match Request::from_frame(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(session = %id, "Invalid request: {}", e);
                let response = Response::Error { code: (&e).into(), message: e.to_string() };
                send(&mut stream, &response).await?;
                return Ok(SessionEnd::ProtocolViolation);
            },
        };

        let response = match request {
            Request::Write(data) => match broker.write(id, &data) {
                // The frame limit keeps every accepted write below u32::MAX
                Ok(len) => Response::Written { len: u32::try_from(len).unwrap_or(u32::MAX) },
                Err(e) => Response::from_broker_error(&e),
            },
            Request::Read { max_len } => {
                let max_len = (max_len as usize).min(max_message_len);
                match broker.read(id, max_len) {
                    Ok(bytes) => Response::Data(bytes.into()),
                    Err(e) => Response::from_broker_error(&e),
                }
            },
            Request::Close => {
                let response = match handle.close() {
                    Ok(()) => Response::Closed,
                    Err(e) => Response::from_broker_error(&e),
                };
                send(&mut stream, &response).await?;
                return Ok(SessionEnd::Closed);
            },
        };

        send(&mut stream, &response).await?;
    }
}

async fn send<S>(stream: &mut S, response: &Response) -> Result<(), ServerError>
where
    S: AsyncWrite + Unpin,
{
    proto::write_frame(stream, &response.to_frame()).await.map_err(ServerError::from)
}
