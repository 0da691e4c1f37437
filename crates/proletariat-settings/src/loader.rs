//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AgentSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `PROLETARIAT_*` environment overrides (highest priority)
//!
//! Command-line flags and [`AgentSettings::validate`] are applied by the
//! caller afterwards.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::AgentSettings;

/// Resolve the path to the settings file (`~/.proletariat/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".proletariat").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AgentSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AgentSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file(path: &Path) -> Result<AgentSettings> {
    let defaults =
        serde_json::to_value(AgentSettings::default()).map_err(|e| SettingsError::parse(path, e))?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|e| SettingsError::parse(path, e))?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(|e| SettingsError::parse(path, e))
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PROLETARIAT_*` environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut AgentSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Values are parsed strictly; anything unparsable or out of range is
/// ignored with a warning and the file/default value stays.
pub fn apply_overrides<F>(settings: &mut AgentSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Manager ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PROLETARIAT_HOST") {
        settings.manager.host = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_PORT", |s| parse_in_range(s, 1..=u16::MAX)) {
        settings.manager.port = v;
    }

    // ── Slots ───────────────────────────────────────────────────────
    if let Some(v) = env.parsed("PROLETARIAT_SLOTS", |s| parse_in_range(s, 1..=100_000)) {
        settings.slots.max = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_ANSWER_THRESHOLD", |s| {
        parse_in_range(s, 1..=100_000)
    }) {
        settings.slots.answer_threshold = Some(v);
    }

    // ── Timing ──────────────────────────────────────────────────────
    if let Some(v) = env.parsed("PROLETARIAT_CLEANUP_REQUESTS", |s| {
        parse_in_range(s, 1..=1_000_000)
    }) {
        settings.timing.cleanup_requests = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_CLEANUP_CHECK_INTERVAL_MS", |s| {
        parse_in_range(s, 10..=3_600_000)
    }) {
        settings.timing.cleanup_check_interval_ms = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_RECONNECT_DELAY_MS", |s| {
        parse_in_range(s, 10..=600_000)
    }) {
        settings.timing.reconnect_delay_ms = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_OFFER_RETRY_MS", |s| {
        parse_in_range(s, 10..=600_000)
    }) {
        settings.timing.offer_retry_ms = v;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.parsed("PROLETARIAT_RETRY_ALL_CONNECT_ERRORS", parse_bool) {
        settings.connection.retry_all_connect_errors = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("PROLETARIAT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("PROLETARIAT_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and keep it only if it lies in `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    range.contains(&n).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"manager": {"port": 1917, "host": "localhost"}});
        let source = serde_json::json!({"manager": {"port": 2000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["manager"]["port"], 2000);
        assert_eq!(merged["manager"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_and_primitive_replace() {
        let target = serde_json::json!({"items": [1, 2, 3], "a": {"nested": true}});
        let source = serde_json::json!({"items": [4], "a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
        assert_eq!(merged["a"], 42);
    }

    #[test]
    fn merge_new_keys_added() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"b": 2}));
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    // ── load_file ───────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, AgentSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"manager": {"port": 4000}, "slots": {"max": 32}, "timing": {"offerRetryMs": 250}}"#,
        )
        .unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.manager.port, 4000);
        assert_eq!(settings.manager.host, "127.0.0.1");
        assert_eq!(settings.slots.max, 32);
        assert_eq!(settings.timing.offer_retry_ms, 250);
        assert_eq!(settings.timing.reconnect_delay_ms, 2000);
    }

    #[test]
    fn explicit_threshold_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"slots": {"answerThreshold": 4}}"#).unwrap();

        let settings = load_file(&path).unwrap();
        assert_eq!(settings.slots.answer_threshold, Some(4));
        assert_eq!(settings.answer_threshold(), 4);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file(&path);
        assert!(matches!(result, Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"manager": {"port": "high"}}"#).unwrap();

        assert!(matches!(load_file(&path), Err(SettingsError::Parse { .. })));
    }

    // ── apply_overrides ─────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = AgentSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("PROLETARIAT_HOST", "manager.local"),
                ("PROLETARIAT_PORT", "7000"),
                ("PROLETARIAT_SLOTS", "4"),
                ("PROLETARIAT_RECONNECT_DELAY_MS", "100"),
                ("PROLETARIAT_RETRY_ALL_CONNECT_ERRORS", "yes"),
                ("PROLETARIAT_LOG_JSON", "on"),
            ]),
        );
        assert_eq!(settings.manager_addr(), "manager.local:7000");
        assert_eq!(settings.slots.max, 4);
        assert_eq!(settings.timing.reconnect_delay_ms, 100);
        assert!(settings.connection.retry_all_connect_errors);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut settings = AgentSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("PROLETARIAT_PORT", "0"),
                ("PROLETARIAT_SLOTS", "many"),
                ("PROLETARIAT_HOST", ""),
                ("PROLETARIAT_RETRY_ALL_CONNECT_ERRORS", "maybe"),
            ]),
        );
        assert_eq!(settings, AgentSettings::default());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in ["false", "0", "no", "off", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_in_range::<u16>("1917", 1..=u16::MAX), Some(1917));
        assert_eq!(parse_in_range::<u16>("0", 1..=u16::MAX), None);
        assert_eq!(parse_in_range::<u16>("99999", 1..=u16::MAX), None);
        assert_eq!(parse_in_range::<u64>("5", 10..=100), None);
        assert_eq!(parse_in_range::<u64>(" 50 ", 10..=100), Some(50));
        assert_eq!(parse_in_range::<usize>("abc", 1..=10), None);
        assert_eq!(parse_in_range::<usize>("10", 1..=10), Some(10));
        assert_eq!(parse_in_range::<usize>("-1", 1..=10), None);
    }
}
