//! Async client for the ebbchar server.
//!
//! Mirrors file-handle semantics: connecting opens the device, `write`
//! replaces the pending message, `read` consumes it and `close` releases
//! the handle.

use bytes::Bytes;
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::{
    config::DEFAULT_MAX_MESSAGE_LEN,
    error::ClientError,
    proto::{self, ErrorCode, Request, Response},
};

/// An open handle on a remote device.
#[derive(Debug)]
pub struct DeviceClient {
    stream: TcpStream,
    session_id: u64,
    max_frame_len: usize,
}

impl DeviceClient {
    /// Connect and open the device.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Busy` if the server has no free slot.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;

        match recv(&mut stream, DEFAULT_MAX_MESSAGE_LEN).await? {
            Response::Opened { session_id } => {
                Ok(Self { stream, session_id, max_frame_len: DEFAULT_MAX_MESSAGE_LEN })
            },
            Response::Error { code: ErrorCode::Busy, message } => Err(ClientError::Busy(message)),
            Response::Error { code, message } => Err(ClientError::Remote { code, message }),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Server-assigned handle number.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Accept responses sized for a server configured with a larger
    /// `max_message_len` than the default.
    pub fn set_max_message_len(&mut self, max_message_len: usize) {
        self.max_frame_len = max_message_len;
    }

    /// Replace the pending message. Returns the bytes accepted.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, ClientError> {
        let request = Request::Write(Bytes::copy_from_slice(data));
        match self.call(&request).await? {
            Response::Written { len } => Ok(len as usize),
            other => Err(unexpected(other)),
        }
    }

    /// Consume the pending message, receiving at most `max_len` bytes.
    ///
    /// Returns `None` if nothing was pending.
    pub async fn read(&mut self, max_len: u32) -> Result<Option<Bytes>, ClientError> {
        match self.call(&Request::Read { max_len }).await? {
            Response::Data(bytes) => Ok(Some(bytes)),
            Response::Error { code: ErrorCode::Empty, .. } => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Release the handle and close the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        match self.call(&Request::Close).await? {
            Response::Closed => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        proto::write_frame(&mut self.stream, &request.to_frame()).await?;
        recv(&mut self.stream, self.max_frame_len).await
    }
}

async fn recv(stream: &mut TcpStream, max_frame_len: usize) -> Result<Response, ClientError> {
    // Error and data frames are bounded by the server's message limit plus
    // a short message
    let frame = proto::read_frame(stream, max_frame_len.saturating_add(1024))
        .await?
        .ok_or(ClientError::Disconnected)?;
    Ok(Response::from_frame(frame)?)
}

fn unexpected(response: Response) -> ClientError {
    match response {
        Response::Error { code, message } => ClientError::Remote { code, message },
        other => ClientError::UnexpectedResponse(format!("{other:?}")),
    }
}
