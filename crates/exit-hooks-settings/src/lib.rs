//! # exit-hooks-settings
//!
//! Configuration for the exit hook coordinator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ExitHookSettings::default()`]
//! 2. **User file**: the JSON file named by `EXIT_HOOKS_CONFIG` (deep-merged over defaults)
//! 3. **Environment variables**: `EXIT_HOOKS_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use exit_hooks_settings::load_settings;
//!
//! let settings = load_settings().unwrap_or_default();
//! println!("default diagnostics: {}", settings.default_diagnostics);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::ExitHookSettings;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = ExitHookSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"y": 2});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
