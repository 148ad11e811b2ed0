//! Reading `settings.json` over the compiled defaults, then applying
//! `MEMO_*` environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::MemoSettings;

/// `~/.memo/settings.json`
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".memo").join("settings.json")
}

pub fn load_settings() -> Result<MemoSettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, then the file at `path` if it exists, then `MEMO_*` variables.
/// Invalid JSON is an error; a missing file is not.
pub fn load_settings_from_path(path: &Path) -> Result<MemoSettings> {
    let defaults = serde_json::to_value(MemoSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MemoSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Overlay `source` on `target`. Objects merge key by key, a `null` in
/// `source` leaves the target value alone, anything else replaces it.
pub fn deep_merge(mut target: Value, source: Value) -> Value {
    merge_into(&mut target, source);
    target
}

fn merge_into(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(dst), Value::Object(src)) => {
            for (key, value) in src.into_iter().filter(|(_, v)| !v.is_null()) {
                match dst.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        dst.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

pub fn apply_env_overrides(settings: &mut MemoSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `MEMO_*` overrides read through `lookup`. Invalid values are
/// logged and ignored.
pub fn apply_overrides_from(settings: &mut MemoSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let boolean = |name: &str| {
        let val = lookup(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        parsed
    };

    if let Some(v) = string("MEMO_DB_PATH") {
        settings.store.db_path = v;
    }
    if let Some(v) = string("MEMO_REPO_DIR") {
        settings.sync.repo_dir = v;
    }
    if let Some(v) = string("MEMO_SNAPSHOT_FILE") {
        settings.sync.snapshot_file = v;
    }
    if let Some(v) = boolean("MEMO_SYNC_ENABLED") {
        settings.sync.enabled = v;
    }
    if let Some(v) = string("MEMO_MODEL") {
        settings.model.name = v;
    }
    if let Some(v) = string("MEMO_BASE_URL") {
        settings.model.base_url = v;
    }
    if let Some(val) = lookup("MEMO_MAX_FACT_WORDS") {
        match parse_usize_range(&val, 1, 100_000) {
            Some(v) => settings.facts.max_words = v,
            None => warn!(key = "MEMO_MAX_FACT_WORDS", value = %val, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = boolean("MEMO_EXTRACT_CONTEXT") {
        settings.facts.extract_context = v;
    }
    if let Some(v) = string("MEMO_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"sync": {"enabled": true, "repo_dir": "."}});
        let source = serde_json::json!({"sync": {"repo_dir": "/srv/memory"}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["sync"]["repo_dir"], "/srv/memory");
        assert_eq!(merged["sync"]["enabled"], true);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replaces() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.sync.snapshot_file, "context.json");
    }

    #[test]
    fn load_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"sync": {"enabled": false, "timeout_secs": 5}, "facts": {"extract_context": true}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert!(!settings.sync.enabled);
        assert_eq!(settings.sync.timeout_secs, 5);
        assert_eq!(settings.sync.repo_dir, ".");
        assert!(settings.facts.extract_context);
        assert_eq!(settings.facts.max_words, 100);
    }

    #[test]
    fn load_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(load_settings_from_path(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn load_invalid_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"sync": {"timeout_secs": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut settings = MemoSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("MEMO_DB_PATH", "/var/lib/memo.db"),
                ("MEMO_REPO_DIR", "/srv/memory"),
                ("MEMO_SYNC_ENABLED", "off"),
                ("MEMO_MAX_FACT_WORDS", "40"),
                ("MEMO_EXTRACT_CONTEXT", "yes"),
                ("MEMO_MODEL", "llama-3.3-70b-versatile"),
                ("MEMO_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(settings.store.db_path, "/var/lib/memo.db");
        assert_eq!(settings.sync.repo_dir, "/srv/memory");
        assert!(!settings.sync.enabled);
        assert_eq!(settings.facts.max_words, 40);
        assert!(settings.facts.extract_context);
        assert_eq!(settings.model.name, "llama-3.3-70b-versatile");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = MemoSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("MEMO_SYNC_ENABLED", "maybe"),
                ("MEMO_MAX_FACT_WORDS", "0"),
                ("MEMO_DB_PATH", "   "),
            ]),
        );
        assert_eq!(settings, MemoSettings::default());
    }

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("100", 1, 1000), Some(100));
        assert_eq!(parse_usize_range("0", 1, 1000), None);
        assert_eq!(parse_usize_range("abc", 1, 1000), None);
    }
}
