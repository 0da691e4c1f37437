//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file only overrides what it names.

use std::time::Duration;

use proletariat_core::constants::{
    ANSWER_THRESHOLD_PERCENT, DEFAULT_CLEANUP_CHECK_INTERVAL_MS, DEFAULT_CLEANUP_REQUESTS,
    DEFAULT_MANAGER_HOST, DEFAULT_OFFER_RETRY_MS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SLOTS,
    MANAGER_PORT, MAX_FRAME_LENGTH,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{Result, SettingsError};

/// Root settings for one agent process.
///
/// ```json
/// {
///   "manager": { "host": "10.0.0.5", "port": 1917 },
///   "slots": { "max": 32 },
///   "timing": { "reconnectDelayMs": 500 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Where the manager listens.
    pub manager: ManagerSettings,
    /// Execution capacity.
    pub slots: SlotSettings,
    /// Timers and periodic work.
    pub timing: TimingSettings,
    /// Connection behavior.
    pub connection: ConnectionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Manager address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerSettings {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_MANAGER_HOST.to_string(),
            port: MANAGER_PORT,
        }
    }
}

/// Execution capacity and result batching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlotSettings {
    /// Maximum number of jobs running at once.
    pub max: usize,
    /// Pending results that trigger a `done` flush. Derived from `max` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_threshold: Option<usize>,
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            max: DEFAULT_SLOTS,
            answer_threshold: None,
        }
    }
}

/// Timer configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingSettings {
    /// Completions between two forced ledger compactions.
    pub cleanup_requests: u64,
    /// Period of the cleanup scheduler in milliseconds.
    pub cleanup_check_interval_ms: u64,
    /// Delay before reconnecting, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Delay before re-sending a refused `offer`, in milliseconds.
    pub offer_retry_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            cleanup_requests: DEFAULT_CLEANUP_REQUESTS,
            cleanup_check_interval_ms: DEFAULT_CLEANUP_CHECK_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            offer_retry_ms: DEFAULT_OFFER_RETRY_MS,
        }
    }
}

/// Connection behavior.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Retry every connect failure, not only refused connections.
    pub retry_all_connect_errors: bool,
    /// Longest inbound line accepted, in bytes.
    pub max_frame_length: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            retry_all_connect_errors: false,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived values
// ─────────────────────────────────────────────────────────────────────────────

impl AgentSettings {
    /// `host:port` of the manager.
    pub fn manager_addr(&self) -> String {
        format!("{}:{}", self.manager.host, self.manager.port)
    }

    /// Number of pending results that forces a `done` flush.
    ///
    /// Defaults to a quarter of the slots, never below one.
    pub fn answer_threshold(&self) -> usize {
        self.slots
            .answer_threshold
            .unwrap_or(self.slots.max * ANSWER_THRESHOLD_PERCENT / 100)
            .clamp(1, self.slots.max.max(1))
    }

    /// Period of the cleanup scheduler.
    pub fn cleanup_check_interval(&self) -> Duration {
        Duration::from_millis(self.timing.cleanup_check_interval_ms)
    }

    /// Delay between reconnect attempts.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.timing.reconnect_delay_ms)
    }

    /// Delay before a refused `offer` is re-sent.
    pub fn offer_retry_delay(&self) -> Duration {
        Duration::from_millis(self.timing.offer_retry_ms)
    }

    /// Correct out-of-range values in place.
    ///
    /// Zero slots become one, zero periods fall back to their defaults and an
    /// explicit answer threshold is clamped to `1..=max`. Each correction is
    /// logged. An empty manager host cannot be corrected and is an error.
    pub fn validate(&mut self) -> Result<()> {
        if self.manager.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                field: "manager.host",
                reason: "empty".to_string(),
            });
        }
        if self.slots.max == 0 {
            warn!("slots.max is 0, using 1");
            self.slots.max = 1;
        }
        if let Some(threshold) = self.slots.answer_threshold {
            let clamped = threshold.clamp(1, self.slots.max);
            if clamped != threshold {
                warn!(threshold, clamped, "slots.answerThreshold out of range");
                self.slots.answer_threshold = Some(clamped);
            }
        }

        let defaults = TimingSettings::default();
        let timing = &mut self.timing;
        for (name, value, fallback) in [
            (
                "cleanupRequests",
                &mut timing.cleanup_requests,
                defaults.cleanup_requests,
            ),
            (
                "cleanupCheckIntervalMs",
                &mut timing.cleanup_check_interval_ms,
                defaults.cleanup_check_interval_ms,
            ),
            (
                "reconnectDelayMs",
                &mut timing.reconnect_delay_ms,
                defaults.reconnect_delay_ms,
            ),
            (
                "offerRetryMs",
                &mut timing.offer_retry_ms,
                defaults.offer_retry_ms,
            ),
        ] {
            if *value == 0 {
                warn!(setting = name, fallback, "timing value is 0, using default");
                *value = fallback;
            }
        }

        if self.connection.max_frame_length == 0 {
            warn!("connection.maxFrameLength is 0, using default");
            self.connection.max_frame_length = MAX_FRAME_LENGTH;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = AgentSettings::default();
        assert_eq!(s.manager_addr(), "127.0.0.1:1917");
        assert_eq!(s.slots.max, 10);
        assert_eq!(s.timing.cleanup_requests, 100);
        assert_eq!(s.cleanup_check_interval(), Duration::from_secs(5));
        assert_eq!(s.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(s.offer_retry_delay(), Duration::from_secs(1));
        assert!(!s.connection.retry_all_connect_errors);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn answer_threshold_is_quarter_of_slots() {
        let mut s = AgentSettings::default();
        assert_eq!(s.answer_threshold(), 2);
        s.slots.max = 100;
        assert_eq!(s.answer_threshold(), 25);
        s.slots.max = 3;
        assert_eq!(s.answer_threshold(), 1);
        s.slots.max = 1;
        assert_eq!(s.answer_threshold(), 1);
    }

    #[test]
    fn explicit_answer_threshold_wins() {
        let mut s = AgentSettings::default();
        s.slots.answer_threshold = Some(7);
        assert_eq!(s.answer_threshold(), 7);
        s.slots.answer_threshold = Some(50);
        assert_eq!(s.answer_threshold(), 10);
    }

    #[test]
    fn camel_case_round_trip() {
        let v = serde_json::to_value(AgentSettings::default()).unwrap();
        assert_eq!(v["timing"]["cleanupCheckIntervalMs"], 5000);
        assert_eq!(v["connection"]["retryAllConnectErrors"], false);
        assert!(v["slots"].get("answerThreshold").is_none());
    }

    #[test]
    fn validate_corrects_zeroes() {
        let mut s = AgentSettings::default();
        s.slots.max = 0;
        s.slots.answer_threshold = Some(0);
        s.timing.cleanup_check_interval_ms = 0;
        s.timing.reconnect_delay_ms = 0;
        s.connection.max_frame_length = 0;
        s.validate().unwrap();
        assert_eq!(s.slots.max, 1);
        assert_eq!(s.slots.answer_threshold, Some(1));
        assert_eq!(s.timing.cleanup_check_interval_ms, 5000);
        assert_eq!(s.timing.reconnect_delay_ms, 2000);
        assert_eq!(s.connection.max_frame_length, MAX_FRAME_LENGTH);
    }

    #[test]
    fn validate_clamps_threshold_to_slots() {
        let mut s = AgentSettings::default();
        s.slots.answer_threshold = Some(40);
        s.validate().unwrap();
        assert_eq!(s.slots.answer_threshold, Some(10));
    }

    #[test]
    fn validate_rejects_empty_host() {
        let mut s = AgentSettings::default();
        s.manager.host = "  ".to_string();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue { field: "manager.host", .. }));
    }

    #[test]
    fn validate_keeps_good_settings() {
        let mut s = AgentSettings::default();
        let before = s.clone();
        s.validate().unwrap();
        assert_eq!(s, before);
    }
}
