//! Exit hook error types.

use thiserror::Error;

/// Errors surfaced to callers of the registration API.
#[derive(Debug, Error)]
pub enum ExitHookError {
    /// The hook could not be registered.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// A failure raised by a hook while it ran.
///
/// Produced and discarded inside the dispatch engine. It never reaches the
/// caller that triggered termination and never changes the exit status.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook returned an error.
    #[error("hook '{name}' failed: {message}")]
    Failed {
        /// Hook name.
        name: String,
        /// Rendered error chain.
        message: String,
    },

    /// The hook panicked.
    #[error("hook '{name}' panicked: {message}")]
    Panicked {
        /// Hook name.
        name: String,
        /// Panic payload, when it was a string.
        message: String,
    },
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, ExitHookError>;
