//! Package-level constants: protocol defaults, error codes and metric names.

/// Current version of the agent (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "proletariat";

// ── Protocol defaults ───────────────────────────────────────────────────────

/// TCP port the manager listens on.
pub const MANAGER_PORT: u16 = 1917;

/// Manager host used when none is configured.
pub const DEFAULT_MANAGER_HOST: &str = "127.0.0.1";

/// Execution slots advertised when none are configured.
pub const DEFAULT_SLOTS: usize = 10;

/// Completions between two forced ledger compactions.
pub const DEFAULT_CLEANUP_REQUESTS: u64 = 100;

/// Period of the cleanup scheduler, in milliseconds.
pub const DEFAULT_CLEANUP_CHECK_INTERVAL_MS: u64 = 5_000;

/// Delay before reconnecting after a refused connect or a closed link, in milliseconds.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2_000;

/// Delay before re-sending an `offer` the manager refused, in milliseconds.
pub const DEFAULT_OFFER_RETRY_MS: u64 = 1_000;

/// Share of the slot count that triggers a `done` flush, in percent.
pub const ANSWER_THRESHOLD_PERCENT: usize = 25;

/// Longest frame accepted from the manager (16 MiB).
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

// ── Error codes ─────────────────────────────────────────────────────────────

/// A pushed `work` payload was not an array.
pub const EINVWORK: &str = "EINVWORK";

/// No handler is registered for the job's kind.
pub const ENOHANDLER: &str = "ENOHANDLER";

/// The job handler panicked or its task was aborted.
pub const EPANIC: &str = "EPANIC";

/// A built-in handler got arguments it cannot use.
pub const EINVARGS: &str = "EINVARGS";

// ── Metric names ────────────────────────────────────────────────────────────

/// Free execution slots (gauge).
pub const SLOTS_AVAILABLE: &str = "agent_slots_available";
/// Jobs accepted from `push` batches (counter).
pub const JOBS_ACCEPTED_TOTAL: &str = "agent_jobs_accepted_total";
/// Jobs rejected from `push` batches (counter).
pub const JOBS_REJECTED_TOTAL: &str = "agent_jobs_rejected_total";
/// Jobs whose result was recorded (counter).
pub const JOBS_COMPLETED_TOTAL: &str = "agent_jobs_completed_total";
/// `done` commands sent (counter).
pub const RESULTS_FLUSHED_TOTAL: &str = "agent_results_flushed_total";
/// Reconnect attempts after refusal or disconnect (counter).
pub const RECONNECTS_TOTAL: &str = "agent_reconnects_total";
/// Ledger compactions (counter, labels: trigger).
pub const COMPACTIONS_TOTAL: &str = "agent_compactions_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_semver() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert_eq!(parts.len(), 3, "VERSION must be semver (MAJOR.MINOR.PATCH)");
        for part in parts {
            let _: u32 = part.parse().expect("each semver segment must be a number");
        }
    }

    #[test]
    fn metric_names_are_snake_case() {
        let names = [
            SLOTS_AVAILABLE,
            JOBS_ACCEPTED_TOTAL,
            JOBS_REJECTED_TOTAL,
            JOBS_COMPLETED_TOTAL,
            RESULTS_FLUSHED_TOTAL,
            RECONNECTS_TOTAL,
            COMPACTIONS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }

    #[test]
    fn defaults_match_protocol() {
        assert_eq!(MANAGER_PORT, 1917);
        assert_eq!(DEFAULT_SLOTS, 10);
        assert_eq!(DEFAULT_CLEANUP_REQUESTS, 100);
        assert_eq!(DEFAULT_RECONNECT_DELAY_MS, 2_000);
    }
}
