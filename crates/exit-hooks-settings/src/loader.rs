//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ExitHookSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::ExitHookSettings;

/// Env var naming the settings file.
pub const CONFIG_PATH_ENV: &str = "EXIT_HOOKS_CONFIG";

/// The settings file named by `EXIT_HOOKS_CONFIG`, if any.
pub fn settings_path() -> Option<PathBuf> {
    config_path_from(|name| std::env::var(name).ok())
}

fn config_path_from(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    lookup(CONFIG_PATH_ENV)
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Load settings from `EXIT_HOOKS_CONFIG` with env var overrides.
///
/// Without `EXIT_HOOKS_CONFIG` only defaults and env overrides apply.
pub fn load_settings() -> Result<ExitHookSettings> {
    match settings_path() {
        Some(path) => load_settings_from_path(&path),
        None => {
            debug!("{CONFIG_PATH_ENV} not set, using defaults");
            with_overrides(ExitHookSettings::default())
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<ExitHookSettings> {
    with_overrides(load_file_layer(path)?)
}

fn with_overrides(mut settings: ExitHookSettings) -> Result<ExitHookSettings> {
    apply_overrides(&mut settings, |name| std::env::var(name).ok());
    validate(&settings)?;
    Ok(settings)
}

/// Defaults with the settings file (if any) merged over them.
fn load_file_layer(path: &Path) -> Result<ExitHookSettings> {
    let defaults = serde_json::to_value(ExitHookSettings::default())?;

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

/// Apply `EXIT_HOOKS_*` overrides read through `lookup`.
///
/// Invalid values are ignored (fall back to file/default) with a warning.
pub fn apply_overrides(settings: &mut ExitHookSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_bool(&lookup, "EXIT_HOOKS_DEFAULT_DIAGNOSTICS") {
        settings.default_diagnostics = v;
    }
    if let Some(v) = read_bool(&lookup, "EXIT_HOOKS_INSTALL_PANIC_HOOK") {
        settings.install_panic_hook = v;
    }
    if let Some(v) = lookup("EXIT_HOOKS_SIGNALS") {
        settings.signals = parse_list(&v);
    }
    if let Some(v) = lookup("EXIT_HOOKS_LOG_LEVEL").filter(|v| !v.is_empty()) {
        settings.log_level = v;
    }
}

fn validate(settings: &ExitHookSettings) -> Result<()> {
    if settings.log_level.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "logLevel must not be empty".to_string(),
        ));
    }
    Ok(())
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

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
