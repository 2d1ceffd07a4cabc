//! Broker configuration.

use crate::{admission::DEFAULT_CAPACITY, error::BrokerError};

/// Settings fixed at broker construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Maximum number of concurrently open sessions.
    pub capacity: usize,
}

impl BrokerConfig {
    /// Configuration with the given capacity.
    pub const fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Check the configuration before building a broker from it.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::InvalidCapacity` if `capacity` is zero.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.capacity == 0 {
            return Err(BrokerError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY }
    }
}
