//! Server runtime configuration.

use ebbchar_core::BrokerConfig;

use crate::error::ServerError;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:7777";

/// Default limit on a single written message.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "127.0.0.1:7777")
    pub bind_address: String,
    /// Broker configuration (admission capacity)
    pub broker: BrokerConfig,
    /// Largest message accepted by a write, in bytes
    pub max_message_len: usize,
}

impl ServerRuntimeConfig {
    /// Check the configuration before binding.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the message limit is zero or does not
    /// fit the wire format, or `ServerError::Broker` if the broker
    /// configuration is invalid.
    pub fn validate(&self) -> Result<(), ServerError> {
        self.broker.validate()?;

        if self.max_message_len == 0 {
            return Err(ServerError::Config("max_message_len must be positive".to_string()));
        }
        if u32::try_from(self.max_message_len).is_err() {
            return Err(ServerError::Config(format!(
                "max_message_len {} exceeds the 32-bit frame length",
                self.max_message_len
            )));
        }

        Ok(())
    }
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            broker: BrokerConfig::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerRuntimeConfig::default();
        assert_eq!(config.broker.capacity, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_message_len_is_rejected() {
        let config = ServerRuntimeConfig { max_message_len: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config =
            ServerRuntimeConfig { broker: BrokerConfig::with_capacity(0), ..Default::default() };
        assert!(matches!(config.validate(), Err(ServerError::Broker(_))));
    }
}
