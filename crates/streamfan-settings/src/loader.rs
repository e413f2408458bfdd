//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FanoutSettings;

/// Resolve the settings file path.
///
/// `$STREAMFAN_CONFIG` if set, otherwise `~/.streamfan/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("STREAMFAN_CONFIG") {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".streamfan").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<FanoutSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or a failed
/// [`FanoutSettings::validate`] is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FanoutSettings> {
    let mut settings = load_file_layer(path)?;
    apply_overrides_with(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<FanoutSettings> {
    let defaults = serde_json::to_value(FanoutSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `STREAMFAN_*` overrides using `lookup` to read variables.
///
/// Out-of-range or unparsable values are ignored with a warning.
pub fn apply_overrides_with<F>(settings: &mut FanoutSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("STREAMFAN_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.log_level = v;
    }
    if let Some(v) = read_usize(&lookup, "STREAMFAN_EVENT_BUFFER", 1, 65_536) {
        settings.event_buffer = v;
    }
    if let Some(v) = read_u64(&lookup, "STREAMFAN_POLL_INTERVAL_MS", 1, 3_600_000) {
        settings.default_poll_interval_ms = v;
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_u64<F: Fn(&str) -> Option<String>>(lookup: &F, name: &str, min: u64, max: u64) -> Option<u64> {
    let val = lookup(name)?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_usize<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    name: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let val = lookup(name)?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"a": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"a": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"]["port"], 9090);
        assert_eq!(merged["a"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
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
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(s.event_buffer, FanoutSettings::default().event_buffer);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"defaultPollIntervalMs": 250, "endpoints": [{"name": "test", "port": 8000}]}"#,
        )
        .unwrap();

        let s = load_file_layer(&path).unwrap();
        assert_eq!(s.default_poll_interval_ms, 250);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.endpoints.len(), 1);
        assert_eq!(s.endpoints[0].name, "test");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_file_layer(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"endpoints": [{"name": "dup"}, {"name": "dup"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut s = FanoutSettings::default();
        apply_overrides_with(
            &mut s,
            lookup_from(&[
                ("STREAMFAN_LOG_LEVEL", "debug"),
                ("STREAMFAN_EVENT_BUFFER", "32"),
                ("STREAMFAN_POLL_INTERVAL_MS", "1000"),
            ]),
        );
        assert_eq!(s.log_level, "debug");
        assert_eq!(s.event_buffer, 32);
        assert_eq!(s.default_poll_interval_ms, 1000);
    }

    #[test]
    fn out_of_range_overrides_ignored() {
        let mut s = FanoutSettings::default();
        apply_overrides_with(
            &mut s,
            lookup_from(&[
                ("STREAMFAN_EVENT_BUFFER", "0"),
                ("STREAMFAN_POLL_INTERVAL_MS", "abc"),
                ("STREAMFAN_LOG_LEVEL", ""),
            ]),
        );
        let d = FanoutSettings::default();
        assert_eq!(s.event_buffer, d.event_buffer);
        assert_eq!(s.default_poll_interval_ms, d.default_poll_interval_ms);
        assert_eq!(s.log_level, d.log_level);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 1, 10), None);
        assert_eq!(parse_usize_range("1", 1, 1), Some(1));
        assert_eq!(parse_usize_range("x", 1, 1), None);
    }
}
