//! Settings type definitions.

use serde::{Deserialize, Serialize};

/// Signal names listened for when the settings file does not say otherwise.
pub const DEFAULT_SIGNALS: [&str; 4] = ["SIGHUP", "SIGINT", "SIGTERM", "SIGBREAK"];

/// Root settings for the exit hook coordinator.
///
/// All field names are camelCase on the wire; missing fields take their
/// default. Example:
///
/// ```json
/// {
///   "defaultDiagnostics": false,
///   "signals": ["SIGINT", "SIGTERM"]
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitHookSettings {
    /// Register the built-in diagnostics hook at startup.
    pub default_diagnostics: bool,
    /// Treat every panic on any thread as fatal, even one the program
    /// catches. Off by default: only a panic escaping the main future ends
    /// the process.
    pub install_panic_hook: bool,
    /// Termination signals to listen for, by name (`SIGINT`, ...).
    pub signals: Vec<String>,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ExitHookSettings {
    fn default() -> Self {
        Self {
            default_diagnostics: true,
            install_panic_hook: false,
            signals: DEFAULT_SIGNALS.iter().map(ToString::to_string).collect(),
            log_level: "warn".to_string(),
        }
    }
}
