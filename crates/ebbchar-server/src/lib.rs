//! ebbchar server.
//!
//! Hosts a [`DeviceBroker`] behind a TCP listener so that remote clients get
//! file-handle semantics:
//! - Connecting opens the device (or is refused with `Busy`)
//! - `Write` replaces the pending message
//! - `Read` consumes it
//! - `Close` or hanging up releases the handle
//!
//! ## Architecture
//!
//! ```text
//! ebbchar-server
//!   ├─ Server        (accept loop, shutdown)
//!   ├─ connection    (one handle per connection)
//!   ├─ proto         (frame codec)
//!   ├─ DeviceClient  (async client)
//!   └─ DeviceBroker  (from ebbchar-core)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
pub mod connection;
mod error;
pub mod proto;

use std::{future::Future, net::SocketAddr, sync::Arc};

pub use client::DeviceClient;
pub use config::{DEFAULT_BIND_ADDRESS, DEFAULT_MAX_MESSAGE_LEN, ServerRuntimeConfig};
pub use connection::SessionEnd;
use ebbchar_core::{BrokerStats, DeviceBroker};
pub use error::{ClientError, ServerError};
use tokio::net::TcpListener;

/// Production ebbchar server.
///
/// Wraps a shared `DeviceBroker` with a TCP listener.
pub struct Server {
    /// Shared session broker
    broker: Arc<DeviceBroker>,
    /// Bound listener
    listener: TcpListener,
    /// Largest accepted message
    max_message_len: usize,
}

impl Server {
    /// Create the broker and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The configuration is invalid
    /// - Binding to the address fails
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let broker = Arc::new(DeviceBroker::new(config.broker)?);
        let listener = TcpListener::bind(&config.bind_address).await?;

        Ok(Self { broker, listener, max_message_len: config.max_message_len })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the broker.
    pub fn broker(&self) -> Arc<DeviceBroker> {
        Arc::clone(&self.broker)
    }

    /// Run the server, accepting connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await.map(|_| ())
    }

    /// Run the server until `shutdown` completes.
    ///
    /// Connections already accepted keep running on their own tasks; their
    /// handles are released when they end. Returns the broker statistics at
    /// the moment accepting stopped.
    pub async fn run_until<F>(self, shutdown: F) -> Result<BrokerStats, ServerError>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Server starting on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let broker = Arc::clone(&self.broker);
                        let max_message_len = self.max_message_len;

                        tokio::spawn(async move {
                            tracing::debug!("New connection from {}", peer);
                            match connection::serve(stream, broker, max_message_len).await {
                                Ok(SessionEnd::Rejected) => {
                                    tracing::info!("Rejected {}: device busy", peer);
                                },
                                Ok(end) => tracing::debug!("Connection {} ended: {:?}", peer, end),
                                Err(e) => tracing::error!("Connection error: {}", e),
                            }
                        });
                    },
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    },
                },
            }
        }

        let stats = self.broker.stats();
        tracing::info!(
            total_opens = stats.total_opens,
            rejected_opens = stats.rejected_opens,
            open_sessions = stats.open_sessions,
            "Server stopped accepting connections"
        );

        Ok(stats)
    }
}
