//! Real broker wrapper that mirrors [`ModelBroker`]'s interface.
//!
//! [`ModelBroker`]: crate::ModelBroker

use ebbchar_core::{BrokerConfig, BrokerError, DeviceBroker, SessionId};

use crate::model::{ModelBroker, ObservableState, Operation, OperationError, OperationResult};

/// A [`DeviceBroker`] plus the handles it has handed out, in open order.
#[derive(Debug)]
pub struct RealBroker {
    broker: DeviceBroker,
    handles: Vec<SessionId>,
}

impl RealBroker {
    /// Create a broker with `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidCapacity` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, BrokerError> {
        let broker = DeviceBroker::new(BrokerConfig::with_capacity(capacity))?;
        Ok(Self { broker, handles: Vec::new() })
    }

    /// The wrapped broker.
    pub fn broker(&self) -> &DeviceBroker {
        &self.broker
    }

    /// Apply an operation and translate the outcome.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Open => match self.broker.open() {
                Ok(id) => {
                    self.handles.push(id);
                    OperationResult::Opened
                },
                Err(e) => translate(&e),
            },
            Operation::Write { handle, content } => match self.resolve(*handle) {
                Some(id) => self
                    .broker
                    .write(id, &content.to_bytes())
                    .map_or_else(|e| translate(&e), OperationResult::Written),
                None => OperationResult::Error(OperationError::NoHandle),
            },
            Operation::Read { handle, max_len } => match self.resolve(*handle) {
                Some(id) => self
                    .broker
                    .read(id, *max_len as usize)
                    .map_or_else(|e| translate(&e), OperationResult::Data),
                None => OperationResult::Error(OperationError::NoHandle),
            },
            Operation::Release { handle } => match self.resolve(*handle) {
                Some(id) => self
                    .broker
                    .release(id)
                    .map_or_else(|e| translate(&e), |()| OperationResult::Released),
                None => OperationResult::Error(OperationError::NoHandle),
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let stats = self.broker.stats();
        ObservableState {
            available: stats.available,
            open_sessions: stats.open_sessions,
            live_buffers: stats.live_buffers,
            live_buffer_bytes: stats.live_buffer_bytes,
        }
    }

    /// Release every handle that is still open.
    ///
    /// Handles that were already closed are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first failure other than `BrokerError::NotFound`.
    pub fn release_all(&mut self) -> Result<(), BrokerError> {
        for id in &self.handles {
            match self.broker.release(*id) {
                Ok(()) | Err(BrokerError::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Tear the broker down, reporting leaked slots.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::SlotLeak` if any handle is still open.
    pub fn shutdown(self) -> Result<(), BrokerError> {
        self.broker.shutdown().map(|_| ())
    }

    fn resolve(&self, handle: u8) -> Option<SessionId> {
        ModelBroker::resolve(handle, self.handles.len()).and_then(|i| self.handles.get(i).copied())
    }
}

fn translate(err: &BrokerError) -> OperationResult {
    let mapped = match err {
        BrokerError::Busy { .. } => OperationError::Busy,
        BrokerError::Empty(_) => OperationError::Empty,
        BrokerError::NotFound(_) => OperationError::NotFound,
        BrokerError::AlreadyConsumed
        | BrokerError::DoubleRelease { .. }
        | BrokerError::InvalidCapacity(_)
        | BrokerError::SlotLeak { .. } => OperationError::Unexpected,
    };
    OperationResult::Error(mapped)
}
