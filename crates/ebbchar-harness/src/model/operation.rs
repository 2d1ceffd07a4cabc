//! Operations for model-based testing.
//!
//! Operations represent every call a client can make on the device. They are
//! generated randomly (by proptest or the fuzzer) and applied to both the
//! model and the real broker.

use arbitrary::Arbitrary;

/// Index into the list of handles opened so far (wrapped modulo its length).
///
/// Closed handles stay in the list, so operations on them exercise the
/// `NotFound` path.
pub type HandleIndex = u8;

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Open a new handle.
    Open,

    /// Replace the pending message of a handle.
    Write {
        /// Target handle.
        handle: HandleIndex,
        /// Message content.
        content: SmallMessage,
    },

    /// Consume the pending message of a handle.
    Read {
        /// Target handle.
        handle: HandleIndex,
        /// Read length.
        max_len: u16,
    },

    /// Close a handle.
    Release {
        /// Target handle.
        handle: HandleIndex,
    },
}

/// Small message content for testing.
///
/// The content is deterministic from the seed so failing cases shrink to
/// readable inputs.
#[derive(Debug, Clone, Arbitrary)]
pub struct SmallMessage {
    /// Message seed (expanded to content).
    pub seed: u8,
    /// Message length hint (0-3 maps to empty/small/medium/large).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to actual message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len: u8 = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 255,
        };

        (0..len).map(|i| self.seed.wrapping_add(i)).collect()
    }
}

/// Result of applying an operation.
///
/// Compared verbatim between the model and the real broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Handle opened.
    Opened,
    /// Bytes accepted by a write.
    Written(usize),
    /// Bytes returned by a read.
    Data(Vec<u8>),
    /// Handle closed.
    Released,
    /// Operation failed.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// No free slot.
    Busy,
    /// Nothing pending.
    Empty,
    /// Handle already closed.
    NotFound,
    /// No handle has been opened yet.
    NoHandle,
    /// Failure the model never produces (a broker bug).
    Unexpected,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Error(_))
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
