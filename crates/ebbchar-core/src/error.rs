//! Broker error types.

use thiserror::Error;

use crate::session::SessionId;

/// Errors from broker, session and admission operations.
///
/// Every variant is a local, recoverable condition. An operation that returns
/// one of these leaves the admission counter and the session buffers exactly
/// as they were before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// All admission slots are taken.
    #[error("device busy: all {capacity} slots in use")]
    Busy {
        /// Configured number of slots.
        capacity: usize,
    },

    /// Read with no pending message.
    #[error("no pending message for session {0}")]
    Empty(SessionId),

    /// A message buffer was consumed a second time.
    #[error("message buffer already consumed")]
    AlreadyConsumed,

    /// Handle is unknown or already closed.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// A slot was returned to a pool that already had every slot free.
    #[error("permit released twice: {available} of {capacity} slots already free")]
    DoubleRelease {
        /// Slots free at the time of the offending release.
        available: usize,
        /// Configured number of slots.
        capacity: usize,
    },

    /// Broker configured with zero slots.
    #[error("invalid capacity: {0} (must be at least 1)")]
    InvalidCapacity(usize),

    /// Teardown found slots that were never returned.
    #[error("slot leak at teardown: {outstanding} permits outstanding")]
    SlotLeak {
        /// Number of permits still held.
        outstanding: usize,
    },
}

impl BrokerError {
    /// Returns true if the caller may retry the same operation later and
    /// expect it to succeed.
    ///
    /// Only admission failures are transient; everything else reflects the
    /// state of the handle or a programming error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Busy { .. } => true,

            Self::Empty(_)
            | Self::AlreadyConsumed
            | Self::NotFound(_)
            | Self::DoubleRelease { .. }
            | Self::InvalidCapacity(_)
            | Self::SlotLeak { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_retryable() {
        let err = BrokerError::Busy { capacity: 5 };
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = BrokerError::NotFound(SessionId::new(3));
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = BrokerError::Busy { capacity: 5 };
        assert_eq!(err.to_string(), "device busy: all 5 slots in use");

        let err = BrokerError::Empty(SessionId::new(7));
        assert_eq!(err.to_string(), "no pending message for session 7");
    }
}
