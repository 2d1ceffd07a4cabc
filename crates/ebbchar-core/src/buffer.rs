//! Single-consumption message buffers.
//!
//! A [`MessageBuffer`] owns a copy of one written message. It can be consumed
//! once; after that it holds nothing and a second [`MessageBuffer::consume`]
//! reports [`BrokerError::AlreadyConsumed`] instead of handing out stale
//! bytes.
//!
//! Every buffer is registered with a [`BufferLedger`] while it holds data.
//! The ledger lets the broker (and its tests) prove that replaced, consumed
//! and abandoned buffers are actually freed.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::error::BrokerError;

/// Live buffer accounting shared by every buffer of one broker.
#[derive(Debug, Default)]
pub struct BufferLedger {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
}

impl BufferLedger {
    /// Create an empty ledger.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Buffers currently holding data.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.load(Ordering::Acquire)
    }

    /// Bytes held by live buffers.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Acquire)
    }

    fn record_alloc(&self, len: usize) {
        self.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.live_bytes.fetch_add(len, Ordering::AcqRel);
    }

    fn record_free(&self, len: usize) {
        self.live_buffers.fetch_sub(1, Ordering::AcqRel);
        self.live_bytes.fetch_sub(len, Ordering::AcqRel);
    }
}

/// An owned copy of one message.
pub struct MessageBuffer {
    /// `None` once consumed.
    bytes: Option<Vec<u8>>,
    ledger: Arc<BufferLedger>,
}

impl MessageBuffer {
    /// Copy `data` into a new buffer accounted against `ledger`.
    pub fn new(data: &[u8], ledger: &Arc<BufferLedger>) -> Self {
        ledger.record_alloc(data.len());
        Self { bytes: Some(data.to_vec()), ledger: Arc::clone(ledger) }
    }

    /// Length of the stored message, or 0 once consumed.
    pub fn len(&self) -> usize {
        self.bytes.as_ref().map_or(0, Vec::len)
    }

    /// Whether the stored message is empty (or already consumed).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the buffer has been consumed.
    pub fn is_consumed(&self) -> bool {
        self.bytes.is_none()
    }

    /// Take the stored bytes out of the buffer.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::AlreadyConsumed` on every call after the first.
    pub fn consume(&mut self) -> Result<Vec<u8>, BrokerError> {
        let bytes = self.bytes.take().ok_or(BrokerError::AlreadyConsumed)?;
        self.ledger.record_free(bytes.len());
        Ok(bytes)
    }

    /// Destroy the buffer without reading it.
    ///
    /// Returns the number of bytes discarded.
    pub fn discard(mut self) -> usize {
        self.consume().map_or(0, |bytes| bytes.len())
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        if let Some(bytes) = self.bytes.take() {
            self.ledger.record_free(bytes.len());
        }
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("len", &self.len())
            .field("consumed", &self.is_consumed())
            .finish()
    }
}
