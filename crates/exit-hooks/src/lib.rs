//! # exit-hooks
//!
//! Shutdown hooks that run exactly once, in registration order, whatever ends
//! the process: the main future completing, an explicit exit, an unhandled
//! error or panic, or a termination signal.
//!
//! ## Execution Model
//!
//! Every trigger is classified into a [`TerminationReason`]. The
//! [`TerminationDriver`] then runs pending hooks in one of two passes:
//! - **Asynchronous**: every pending hook, awaited one at a time. Used by all
//!   triggers that can still wait.
//! - **Synchronous**: pending synchronous hooks only. Used by the final event
//!   right before the process exits.
//!
//! Exit status comes from the trigger: the natural code when draining, `1` for
//! exceptions, `128 + signal number` for signals, the caller's code for
//! explicit exits. Hook failures are discarded and never change it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use exit_hooks::{ExitHook, global};
//!
//! #[tokio::main]
//! async fn main() {
//!     global::add_exit_hook(ExitHook::future("flush", |reason| async move {
//!         eprintln!("flushing after {}", reason.category());
//!         anyhow::Ok(())
//!     }))
//!     .unwrap();
//!
//!     let code = global::run(async { anyhow::Ok(()) }).await;
//!     std::process::exit(code);
//! }
//! ```

#![deny(unsafe_code)]

pub mod classifier;
pub mod diagnostics;
pub mod dispatch;
pub mod driver;
pub mod errors;
pub mod global;
pub mod hook;
pub mod logging;
mod panic;
pub mod reason;
pub mod registry;
mod signals;

pub use classifier::Trigger;
pub use diagnostics::{DIAGNOSTICS_HOOK_NAME, DefaultDiagnostics};
pub use dispatch::{DispatchSummary, Dispatcher, running_hook};
pub use driver::{
    DriverState, EXCEPTION_EXIT_CODE, ProcessExit, RecordingExit, StdProcessExit,
    TerminationDriver,
};
pub use errors::{ExitHookError, HookError, Result};
pub use exit_hooks_settings::ExitHookSettings;
pub use hook::ExitHook;
pub use reason::{SIGNAL_EXIT_CODES, TerminationReason, TerminationSignal, Thrown, ThrownOrigin};
pub use registry::HookRegistry;
