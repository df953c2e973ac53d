//! Node controller configuration
//!
//! Everything comes from the command line or the container environment.
//! `APP_DURATION_MIN` and `APP_DIR` keep the names the experiment
//! containers already set.

use std::path::PathBuf;

use clap::Parser;
use embassy_time::Duration;
use lgtc_core::{RelayConfig, SyncPolicy, WarningPolicy};

use crate::device_id::{self, NodeName};
use crate::error::BoardError;
use crate::monitor::SupervisorConfig;

/// Length of the numeric prefix on application directory names ("00_")
const APP_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone, Parser)]
#[command(name = "lgtc")]
#[command(about = "LGTC node controller: relays broker commands and supervises the VESNA experiment", long_about = None)]
pub struct NodeConfig {
    /// Node identifier (spaces are removed, name becomes LGTC<id>)
    pub id: Option<String>,

    /// Experiment run time in minutes
    #[arg(long, env = "APP_DURATION_MIN", default_value_t = 60)]
    pub duration_min: u64,

    /// Application directory name, e.g. 02_acs
    #[arg(long, env = "APP_DIR", default_value = "00_test")]
    pub app_dir: String,

    /// Directory containing the application directories
    #[arg(long, env = "APP_ROOT", default_value = "/root/logatec-experiment/applications")]
    pub app_root: PathBuf,

    /// Broker address (host:port)
    #[arg(long, env = "LGTC_BROKER", default_value = "192.168.88.253:5562")]
    pub broker: String,

    /// VESNA serial device
    #[arg(long, env = "LGTC_SERIAL", default_value = "/dev/ttyS2")]
    pub serial: PathBuf,

    /// Serial baud rate
    #[arg(long, default_value_t = 460_800)]
    pub baud: u32,

    /// Sysfs GPIO number wired to the VESNA reset line
    #[arg(long, default_value_t = 66)]
    pub reset_gpio: u32,

    /// Where the result and log files are written
    #[arg(long, env = "LGTC_RESULTS", default_value = ".")]
    pub results_dir: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Seconds to wait for the broker to acknowledge SYNC
    #[arg(long, default_value_t = 10)]
    pub sync_timeout_secs: u64,

    /// Give up instead of running unconfirmed when SYNC is not acknowledged
    #[arg(long)]
    pub abort_on_sync_timeout: bool,

    /// Return to the previous state after reporting WARNING
    #[arg(long)]
    pub restore_after_warning: bool,

    /// Milliseconds between retransmissions of unacknowledged messages
    #[arg(long, default_value_t = 1000)]
    pub retry_interval_ms: u64,

    /// Retransmissions before a message is dropped
    #[arg(long, default_value_t = 5)]
    pub max_retries: u8,
}

impl NodeConfig {
    pub fn node_name(&self) -> Result<NodeName, BoardError> {
        device_id::node_name(self.id.as_deref())
    }

    /// Make target name: the directory name without its numeric prefix
    pub fn app_name(&self) -> &str {
        match self.app_dir.get(APP_PREFIX_LEN..) {
            Some(name) if !name.is_empty() => name,
            _ => &self.app_dir,
        }
    }

    pub fn app_path(&self) -> PathBuf {
        self.app_root.join(&self.app_dir)
    }

    pub fn results_path(&self, node: &str) -> PathBuf {
        self.results_dir.join(format!("{node}_results.txt"))
    }

    pub fn log_path(&self, node: &str) -> PathBuf {
        self.results_dir.join(format!("{node}.log"))
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            sync_timeout: Duration::from_secs(self.sync_timeout_secs),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            max_retries: self.max_retries,
            sync_policy: if self.abort_on_sync_timeout {
                SyncPolicy::Abort
            } else {
                SyncPolicy::Continue
            },
            warning_policy: if self.restore_after_warning {
                WarningPolicy::Restore
            } else {
                WarningPolicy::Latch
            },
            ..RelayConfig::default()
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            duration: Duration::from_secs(self.duration_min * 60),
            ..SupervisorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> NodeConfig {
        NodeConfig::try_parse_from(std::iter::once("lgtc").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::try_parse_from(["lgtc", "--app-dir", "00_test", "--duration-min", "60"]).unwrap();
        assert_eq!(config.node_name().unwrap(), "LGTCxy");
        assert_eq!(config.app_name(), "test");
        assert_eq!(config.baud, 460_800);
        assert_eq!(config.reset_gpio, 66);

        let relay = config.relay_config();
        assert_eq!(relay.sync_timeout, Duration::from_secs(10));
        assert_eq!(relay.max_retries, 5);
        assert_eq!(relay.sync_policy, SyncPolicy::Continue);
        assert_eq!(relay.warning_policy, WarningPolicy::Latch);
    }

    #[test]
    fn test_app_name_strips_prefix() {
        let config = parse(&["--app-dir", "02_acs"]);
        assert_eq!(config.app_name(), "acs");
        assert_eq!(
            config.app_path(),
            PathBuf::from("/root/logatec-experiment/applications/02_acs")
        );

        let config = parse(&["--app-dir", "ab"]);
        assert_eq!(config.app_name(), "ab");
    }

    #[test]
    fn test_positional_id_and_paths() {
        let config = parse(&["1 23", "--results-dir", "/tmp/out"]);
        let node = config.node_name().unwrap();
        assert_eq!(node, "LGTC123");
        assert_eq!(
            config.results_path(&node),
            PathBuf::from("/tmp/out/LGTC123_results.txt")
        );
        assert_eq!(config.log_path(&node), PathBuf::from("/tmp/out/LGTC123.log"));
    }

    #[test]
    fn test_policy_flags() {
        let config = parse(&["--abort-on-sync-timeout", "--restore-after-warning"]);
        let relay = config.relay_config();
        assert_eq!(relay.sync_policy, SyncPolicy::Abort);
        assert_eq!(relay.warning_policy, WarningPolicy::Restore);
    }

    #[test]
    fn test_duration_in_minutes() {
        let config = parse(&["--duration-min", "2"]);
        assert_eq!(config.supervisor_config().duration, Duration::from_secs(120));
    }
}
