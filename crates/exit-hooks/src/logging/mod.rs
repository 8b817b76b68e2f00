//! Logging setup.
//!
//! The crate logs through `tracing`: state transitions at `info!`, pass
//! summaries and listener setup at `debug!`. Hook failures are never logged.
//! Hosts that do not install their own subscriber can call
//! [`init_subscriber`].

pub mod test_utils;

pub use test_utils::{CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over `level` when set. Calls after the first, or after
/// another subscriber was installed, are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
