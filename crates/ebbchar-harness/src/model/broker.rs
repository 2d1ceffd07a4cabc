//! Model broker.
//!
//! Obviously-correct reference: a list of handles, each either closed or
//! open with an optional pending message. No atomics, no locks, no permits.

use super::operation::{HandleIndex, Operation, OperationError, OperationResult};

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Free slots.
    pub available: usize,
    /// Open handles.
    pub open_sessions: usize,
    /// Handles with a message pending.
    pub live_buffers: usize,
    /// Bytes held by pending messages.
    pub live_buffer_bytes: usize,
}

#[derive(Debug, Clone)]
struct ModelHandle {
    open: bool,
    pending: Option<Vec<u8>>,
}

/// Model broker - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelBroker {
    capacity: usize,
    /// Every handle ever opened, in open order.
    handles: Vec<ModelHandle>,
}

impl ModelBroker {
    /// Create a model with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, handles: Vec::new() }
    }

    /// Number of handles ever opened.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// Resolve a generated handle index to a position in the open order.
    ///
    /// Returns `None` while no handle has been opened.
    pub fn resolve(handle: HandleIndex, handle_count: usize) -> Option<usize> {
        (handle_count > 0).then(|| handle as usize % handle_count)
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Open => self.open(),
            Operation::Write { handle, content } => {
                let data = content.to_bytes();
                self.with_open(*handle, |h| {
                    let len = data.len();
                    h.pending = Some(data);
                    OperationResult::Written(len)
                })
            },
            Operation::Read { handle, max_len } => {
                self.with_open(*handle, |h| match h.pending.take() {
                    Some(mut data) => {
                        data.truncate(*max_len as usize);
                        OperationResult::Data(data)
                    },
                    None => OperationResult::Error(OperationError::Empty),
                })
            },
            Operation::Release { handle } => self.with_open(*handle, |h| {
                h.open = false;
                h.pending = None;
                OperationResult::Released
            }),
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let open: Vec<&ModelHandle> = self.handles.iter().filter(|h| h.open).collect();

        ObservableState {
            available: self.capacity - open.len(),
            open_sessions: open.len(),
            live_buffers: open.iter().filter(|h| h.pending.is_some()).count(),
            live_buffer_bytes: open.iter().filter_map(|h| h.pending.as_ref()).map(Vec::len).sum(),
        }
    }

    fn open(&mut self) -> OperationResult {
        let open = self.handles.iter().filter(|h| h.open).count();
        if open >= self.capacity {
            return OperationResult::Error(OperationError::Busy);
        }

        self.handles.push(ModelHandle { open: true, pending: None });
        OperationResult::Opened
    }

    fn with_open(
        &mut self,
        handle: HandleIndex,
        f: impl FnOnce(&mut ModelHandle) -> OperationResult,
    ) -> OperationResult {
        let Some(index) = Self::resolve(handle, self.handles.len()) else {
            return OperationResult::Error(OperationError::NoHandle);
        };

        match self.handles.get_mut(index) {
            Some(h) if h.open => f(h),
            _ => OperationResult::Error(OperationError::NotFound),
        }
    }
}
