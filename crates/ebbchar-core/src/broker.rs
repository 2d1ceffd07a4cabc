//! Device Broker
//!
//! Maps device-level operations (open, write, read, release) onto sessions
//! and the admission pool.
//!
//! ## Responsibilities
//!
//! - Admission: Reject opens once every slot is taken
//! - Handle registry: Map `SessionId` to its live session
//! - Per-session exclusion: Serialize operations on the same handle
//! - Accounting: Open counters, byte counters and live buffer totals
//!
//! ## Locking
//!
//! The handle map lock is held only to look up, insert or remove an entry.
//! Each session sits behind its own mutex, so operations on different
//! handles never wait on each other. A released handle leaves `None` in its
//! slot; an operation that raced with the release observes `NotFound`.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    admission::AdmissionController,
    buffer::BufferLedger,
    config::BrokerConfig,
    error::BrokerError,
    session::{Session, SessionId},
};

type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Point-in-time broker statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BrokerStats {
    /// Configured number of slots.
    pub capacity: usize,
    /// Slots currently free.
    pub available: usize,
    /// Handles currently registered.
    pub open_sessions: usize,
    /// Successful opens since construction.
    pub total_opens: u64,
    /// Opens rejected as busy since construction.
    pub rejected_opens: u64,
    /// Bytes accepted by write.
    pub bytes_written: u64,
    /// Bytes returned by read.
    pub bytes_read: u64,
    /// Messages written but not yet read or discarded.
    pub live_buffers: usize,
    /// Bytes held by those messages.
    pub live_buffer_bytes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_opens: AtomicU64,
    rejected_opens: AtomicU64,
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
}

/// Session broker for one device.
///
/// Share it between threads with `Arc<DeviceBroker>`; every method takes
/// `&self`.
pub struct DeviceBroker {
    admission: AdmissionController,
    ledger: Arc<BufferLedger>,
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl DeviceBroker {
    /// Build a broker from `config`.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidCapacity` if the capacity is zero.
    pub fn new(config: BrokerConfig) -> Result<Self, BrokerError> {
        config.validate()?;
        let admission = AdmissionController::new(config.capacity)?;

        tracing::info!(capacity = config.capacity, "Device broker initialized");

        Ok(Self {
            admission,
            ledger: BufferLedger::new(),
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        })
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.admission.capacity()
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.admission.available()
    }

    /// Number of registered handles.
    pub fn open_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Whether `id` refers to an open handle.
    pub fn is_open(&self, id: SessionId) -> bool {
        let Ok(slot) = self.slot(id) else {
            return false;
        };
        lock(&*slot).is_some()
    }

    /// Whether `id` has a message waiting to be read.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotFound` if the handle is unknown or closed.
    pub fn has_pending(&self, id: SessionId) -> Result<bool, BrokerError> {
        self.with_session(id, |session| Ok(session.pending_len().is_some()))
    }

    /// Open a new handle.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Busy` if every slot is in use. Nothing is
    /// registered in that case.
    pub fn open(&self) -> Result<SessionId, BrokerError> {
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));

        let session = match Session::open(id, &self.admission, &self.ledger) {
            Ok(session) => session,
            Err(e) => {
                self.counters.rejected_opens.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Device in use, rejecting open: {}", e);
                return Err(e);
            },
        };

        lock(&self.sessions).insert(id, Arc::new(Mutex::new(Some(session))));

        let opens = self.counters.total_opens.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session = %id, "Device has been opened {} time(s)", opens);

        Ok(id)
    }

    /// Store `data` as the pending message of `id`, replacing any unread one.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotFound` if the handle is unknown or closed.
    pub fn write(&self, id: SessionId, data: &[u8]) -> Result<usize, BrokerError> {
        let written = self.with_session(id, |session| Ok(session.write(data)))?;

        self.counters.bytes_written.fetch_add(written as u64, Ordering::Relaxed);
        tracing::debug!(session = %id, "Received {} characters", written);

        Ok(written)
    }

    /// Consume the pending message of `id`, returning at most `max_len`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotFound` if the handle is unknown or closed,
    /// and `BrokerError::Empty` if nothing is pending.
    pub fn read(&self, id: SessionId, max_len: usize) -> Result<Vec<u8>, BrokerError> {
        let bytes = self.with_session(id, |session| session.read(max_len))?;

        self.counters.bytes_read.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        tracing::debug!(session = %id, "Sent {} characters", bytes.len());

        Ok(bytes)
    }

    /// Close `id`, freeing any unread message and returning its slot.
    ///
    /// Waits for an in-flight operation on the same handle to finish.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::NotFound` if the handle is unknown or already
    /// closed.
    pub fn release(&self, id: SessionId) -> Result<(), BrokerError> {
        let slot = lock(&self.sessions).remove(&id).ok_or(BrokerError::NotFound(id))?;
        let session = lock(&*slot).take().ok_or(BrokerError::NotFound(id))?;

        let discarded = session.close()?;
        if discarded > 0 {
            tracing::debug!(session = %id, discarded, "Discarded unread message on close");
        }
        tracing::debug!(session = %id, "Device successfully closed");

        Ok(())
    }

    /// Snapshot of the broker counters.
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            capacity: self.admission.capacity(),
            available: self.admission.available(),
            open_sessions: self.open_sessions(),
            total_opens: self.counters.total_opens.load(Ordering::Relaxed),
            rejected_opens: self.counters.rejected_opens.load(Ordering::Relaxed),
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            live_buffers: self.ledger.live_buffers(),
            live_buffer_bytes: self.ledger.live_bytes(),
        }
    }

    /// Tear the broker down.
    ///
    /// Every handle should already be released. Remaining sessions are
    /// dropped (which returns their slots), but the leak is still reported.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::SlotLeak` if permits were outstanding.
    pub fn shutdown(self) -> Result<BrokerStats, BrokerError> {
        let stats = self.stats();

        if let Err(e) = self.admission.ensure_idle() {
            tracing::error!(open_sessions = stats.open_sessions, "Broker shutdown: {}", e);
            return Err(e);
        }

        tracing::info!(total_opens = stats.total_opens, "Device broker shut down");
        Ok(stats)
    }

    fn slot(&self, id: SessionId) -> Result<SessionSlot, BrokerError> {
        lock(&self.sessions).get(&id).cloned().ok_or(BrokerError::NotFound(id))
    }

    /// Run `f` with exclusive access to the session behind `id`.
    fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> Result<T, BrokerError>,
    ) -> Result<T, BrokerError> {
        let slot = self.slot(id)?;
        let mut guard = lock(&*slot);
        let session = guard.as_mut().ok_or(BrokerError::NotFound(id))?;
        f(session)
    }
}

impl fmt::Debug for DeviceBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceBroker")
            .field("admission", &self.admission)
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}

/// Every critical section leaves its data consistent, so a poisoned lock is
/// still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
