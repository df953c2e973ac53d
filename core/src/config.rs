//! Relay configuration

use embassy_time::Duration;

pub use crate::state::WarningPolicy;

/// What to do when the startup SYNC is not acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SyncPolicy {
    /// Log and run degraded without a confirmed broker
    #[default]
    Continue,
    /// Stop before entering the relay loop
    Abort,
}

/// Relay timing and policy configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How long to wait for the startup SYNC acknowledgement
    pub sync_timeout: Duration,
    /// How long to wait for the exit notification acknowledgement
    pub exit_timeout: Duration,
    /// Minimum age of a pending envelope before it is resent
    pub retry_interval: Duration,
    /// Retransmissions before a pending envelope is dropped
    pub max_retries: u8,
    /// Pause between STOP_APP and START_APP on RESTART_APP
    pub restart_delay: Duration,
    pub sync_policy: SyncPolicy,
    pub warning_policy: WarningPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(10),
            exit_timeout: Duration::from_secs(3),
            retry_interval: Duration::from_secs(1),
            max_retries: 5,
            restart_delay: Duration::from_secs(1),
            sync_policy: SyncPolicy::Continue,
            warning_policy: WarningPolicy::Latch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.sync_timeout.as_secs(), 10);
        assert_eq!(config.exit_timeout.as_secs(), 3);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.sync_policy, SyncPolicy::Continue);
        assert_eq!(config.warning_policy, WarningPolicy::Latch);
    }
}
