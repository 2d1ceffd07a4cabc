//! Sessions: one admitted slot plus at most one pending message.

use std::{fmt, sync::Arc};

use crate::{
    admission::{AdmissionController, Permit},
    buffer::{BufferLedger, MessageBuffer},
    error::BrokerError,
};

/// Identity of one open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw handle number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Buffer sub-state of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing written since open or since the last read.
    NoBuffer,
    /// A message is waiting to be read.
    Buffered,
}

/// Live state of one open handle.
///
/// A session holds its admission permit for its whole lifetime. The permit
/// goes back to the pool in [`Session::close`], or on drop if the session is
/// abandoned.
pub struct Session {
    id: SessionId,
    /// Declared before `permit` so an abandoned session frees its buffer
    /// before giving up the slot.
    buffer: Option<MessageBuffer>,
    permit: Permit,
    ledger: Arc<BufferLedger>,
}

impl Session {
    /// Admit a new session.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Busy` if the controller has no free slot.
    pub fn open(
        id: SessionId,
        controller: &AdmissionController,
        ledger: &Arc<BufferLedger>,
    ) -> Result<Self, BrokerError> {
        let permit = controller.try_acquire()?;
        Ok(Self { id, buffer: None, permit, ledger: Arc::clone(ledger) })
    }

    /// Handle identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current buffer sub-state.
    pub fn state(&self) -> SessionState {
        if self.buffer.is_some() { SessionState::Buffered } else { SessionState::NoBuffer }
    }

    /// Length of the pending message, if any.
    pub fn pending_len(&self) -> Option<usize> {
        self.buffer.as_ref().map(MessageBuffer::len)
    }

    /// Store `data` as the pending message.
    ///
    /// An unread message from an earlier write is destroyed first. Returns
    /// the number of bytes accepted, which is always `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if let Some(previous) = self.buffer.take() {
            let discarded = previous.discard();
            tracing::warn!(session = %self.id, discarded, "Replacing unread message");
        }

        self.buffer = Some(MessageBuffer::new(data, &self.ledger));
        data.len()
    }

    /// Consume the pending message, returning at most `max_len` bytes.
    ///
    /// A message longer than `max_len` is truncated and the rest is dropped;
    /// there is no read cursor carried between calls.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Empty` if nothing is pending.
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, BrokerError> {
        let mut buffer = self.buffer.take().ok_or(BrokerError::Empty(self.id))?;
        let mut bytes = buffer.consume()?;

        if bytes.len() > max_len {
            tracing::debug!(
                session = %self.id,
                dropped = bytes.len() - max_len,
                "Truncating message to read length"
            );
            bytes.truncate(max_len);
        }

        Ok(bytes)
    }

    /// Destroy the session, freeing any unread message and returning the
    /// admission slot.
    ///
    /// Returns the number of unread bytes that were discarded.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::DoubleRelease` if the pool refuses the slot. The
    /// buffer is freed regardless.
    pub fn close(mut self) -> Result<usize, BrokerError> {
        let discarded = self.buffer.take().map_or(0, MessageBuffer::discard);
        self.permit.release()?;
        Ok(discarded)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pending_len", &self.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(capacity: usize) -> (AdmissionController, Arc<BufferLedger>) {
        (AdmissionController::new(capacity).unwrap(), BufferLedger::new())
    }

    #[test]
    fn open_takes_a_slot() {
        let (pool, ledger) = setup(2);
        let session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        assert_eq!(pool.available(), 1);
        assert_eq!(session.state(), SessionState::NoBuffer);
    }

    #[test]
    fn open_propagates_busy() {
        let (pool, ledger) = setup(1);
        let _a = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        let result = Session::open(SessionId::new(2), &pool, &ledger);
        assert!(matches!(result, Err(BrokerError::Busy { capacity: 1 })));
    }

    #[test]
    fn write_then_read_round_trips() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        assert_eq!(session.write(b"hello"), 5);
        assert_eq!(session.state(), SessionState::Buffered);
        assert_eq!(session.read(10).unwrap(), b"hello");
        assert_eq!(session.state(), SessionState::NoBuffer);
    }

    #[test]
    fn read_without_write_is_empty() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(9), &pool, &ledger).unwrap();

        assert_eq!(session.read(10), Err(BrokerError::Empty(SessionId::new(9))));
    }

    #[test]
    fn second_read_is_empty() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        session.write(b"hello");
        session.read(10).unwrap();
        assert_eq!(session.read(10), Err(BrokerError::Empty(SessionId::new(1))));
    }

    #[test]
    fn short_read_truncates_and_discards_rest() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        session.write(b"hello world");
        assert_eq!(session.read(5).unwrap(), b"hello");
        assert_eq!(ledger.live_bytes(), 0);
        assert!(session.read(100).is_err());
    }

    #[test]
    fn second_write_replaces_and_frees_first() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        session.write(b"first message");
        session.write(b"second");
        assert_eq!(ledger.live_buffers(), 1);
        assert_eq!(ledger.live_bytes(), 6);

        assert_eq!(session.read(100).unwrap(), b"second");
        assert_eq!(ledger.live_buffers(), 0);
    }

    #[test]
    fn zero_length_write_installs_empty_buffer() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();

        assert_eq!(session.write(&[]), 0);
        assert_eq!(session.state(), SessionState::Buffered);
        assert_eq!(session.read(10).unwrap(), Vec::<u8>::new());
        assert!(session.read(10).is_err());
    }

    #[test]
    fn close_frees_buffer_and_slot() {
        let (pool, ledger) = setup(1);
        let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();
        session.write(b"never read");

        assert_eq!(session.close().unwrap(), 10);
        assert_eq!(pool.available(), 1);
        assert_eq!(ledger.live_buffers(), 0);
    }

    #[test]
    fn abandoned_session_returns_slot() {
        let (pool, ledger) = setup(1);
        {
            let mut session = Session::open(SessionId::new(1), &pool, &ledger).unwrap();
            session.write(b"leaked?");
        }

        assert_eq!(pool.available(), 1);
        assert_eq!(ledger.live_bytes(), 0);
    }
}
