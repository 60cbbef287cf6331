//! Settings sections of the engine configuration
//!
//! # Main Types
//!
//! - [`TaskerSettings`] - Notification verbosity and stop behaviour
//! - [`LogSettings`] - Log filter and optional rolling log file
//! - [`NodeDefaults`] - Timing values for nodes that do not set their own

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default recognition timeout in milliseconds
pub const DEFAULT_RECO_TIMEOUT_MS: u64 = 20_000;

/// Default recognition polling interval in milliseconds
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_000;

/// Default delay before and after an action in milliseconds
pub const DEFAULT_ACTION_DELAY_MS: u64 = 200;

/// Default granularity of stop-aware sleeps in milliseconds
pub const DEFAULT_STOP_POLL_INTERVAL_MS: u64 = 10;

/// Behaviour of a [`Tasker`](crate::tasker::Tasker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskerSettings {
    /// Emit node-level notifications for every node, not only focused ones
    pub debug_mode: bool,

    /// How often sleeping interpreters re-check the stop flag
    pub stop_poll_interval_ms: u64,
}

impl Default for TaskerSettings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            stop_poll_interval_ms: DEFAULT_STOP_POLL_INTERVAL_MS,
        }
    }
}

impl TaskerSettings {
    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,

    /// Directory for daily rolling log files (disabled when `None`)
    pub log_dir: Option<PathBuf>,

    /// File name prefix for rolling log files
    pub file_prefix: String,

    /// Use ANSI colours on the console layer
    pub ansi: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,screenflow=debug".to_string(),
            log_dir: None,
            file_prefix: "screenflow.log".to_string(),
            ansi: true,
        }
    }
}

/// Timing defaults applied to nodes that omit them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefaults {
    pub reco_timeout_ms: u64,
    pub rate_limit_ms: u64,
    pub pre_delay_ms: u64,
    pub post_delay_ms: u64,
    /// Maximum recognition hits per run (`None` = unlimited)
    pub max_hit: Option<u32>,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            reco_timeout_ms: DEFAULT_RECO_TIMEOUT_MS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            pre_delay_ms: DEFAULT_ACTION_DELAY_MS,
            post_delay_ms: DEFAULT_ACTION_DELAY_MS,
            max_hit: None,
        }
    }
}

impl NodeDefaults {
    /// Defaults with every delay and timeout set to zero, handy for tests and
    /// dry runs where nothing should sleep.
    pub fn immediate() -> Self {
        Self {
            reco_timeout_ms: 0,
            rate_limit_ms: 0,
            pre_delay_ms: 0,
            post_delay_ms: 0,
            max_hit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = NodeDefaults::default();
        assert_eq!(defaults.reco_timeout_ms, 20_000);
        assert_eq!(defaults.rate_limit_ms, 1_000);
        assert_eq!(defaults.max_hit, None);
    }

    #[test]
    fn test_stop_poll_interval_never_zero() {
        let settings = TaskerSettings {
            stop_poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(settings.stop_poll_interval(), Duration::from_millis(1));
    }
}
