//! Process-wide driver.
//!
//! Most programs want one driver for the whole process. The first call to
//! [`driver`] creates it from [`load_settings`]; call [`init`] or [`install`]
//! earlier to choose the settings or parts yourself.

use std::sync::OnceLock;

use exit_hooks_settings::{ExitHookSettings, load_settings};
use tracing::warn;

use crate::driver::TerminationDriver;
use crate::errors::Result;
use crate::hook::ExitHook;

static DRIVER: OnceLock<TerminationDriver> = OnceLock::new();

/// The process driver, created from loaded settings on first use.
///
/// Settings that fail to load fall back to the defaults.
pub fn driver() -> &'static TerminationDriver {
    DRIVER.get_or_init(|| {
        let settings = load_settings().unwrap_or_else(|error| {
            warn!(%error, "Failed to load exit hook settings, using defaults");
            ExitHookSettings::default()
        });
        TerminationDriver::new(&settings)
    })
}

/// Create the process driver from `settings`. If it already exists, the
/// existing driver is returned unchanged.
pub fn init(settings: &ExitHookSettings) -> &'static TerminationDriver {
    DRIVER.get_or_init(|| TerminationDriver::new(settings))
}

/// Install a fully built driver.
///
/// # Errors
///
/// Returns the driver back if one was already installed.
#[allow(clippy::result_large_err)]
pub fn install(driver: TerminationDriver) -> std::result::Result<(), TerminationDriver> {
    DRIVER.set(driver)
}

/// Register a hook with the process driver.
pub fn add_exit_hook(hook: ExitHook) -> Result<()> {
    driver().add_exit_hook(hook)
}

/// Unregister a hook from the process driver.
pub fn remove_exit_hook(hook: &ExitHook) -> bool {
    driver().remove_exit_hook(hook)
}

/// Toggle the built-in diagnostics hook on the process driver.
pub fn set_default_diagnostics(enabled: bool) {
    driver().set_default_diagnostics(enabled);
}

/// Run pending hooks with a manual reason, then exit with `exit_code`.
pub async fn terminate_with_hooks(
    exit_code: i32,
    extra: impl Into<serde_json::Value>,
) -> Option<i32> {
    driver().terminate_with_hooks(exit_code, extra).await
}

/// Drive `main` with the process driver. See [`TerminationDriver::run`].
pub async fn run<F, E>(main: F) -> i32
where
    F: Future<Output = std::result::Result<(), E>>,
    E: Into<anyhow::Error>,
{
    driver().run(main).await
}
