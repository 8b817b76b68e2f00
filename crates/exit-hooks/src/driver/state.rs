//! Driver state machine.

use std::fmt;

use crate::classifier::Trigger;

/// Exit status for exceptions: panics and unhandled errors.
pub const EXCEPTION_EXIT_CODE: i32 = 1;

/// Where the driver is in the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    /// No trigger has fired yet.
    Running,
    /// The main future finished; hooks run with the natural exit code.
    Draining,
    /// A panic or an unhandled error is being handled.
    Failing,
    /// An external signal is being handled.
    Signaled,
    /// An explicit exit or manual termination is being handled.
    Terminating,
    /// The final event fired. Nothing else runs.
    Exited,
}

impl DriverState {
    /// Stable lowercase name, used as a log field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Failing => "failing",
            Self::Signaled => "signaled",
            Self::Terminating => "terminating",
            Self::Exited => "exited",
        }
    }

    /// Whether a forced termination is in progress.
    pub fn is_forced(self) -> bool {
        matches!(self, Self::Failing | Self::Signaled | Self::Terminating)
    }

    /// Decide what a trigger does from this state.
    pub(crate) fn on_trigger(self, trigger: &Trigger) -> Transition {
        if self == Self::Exited {
            return Transition::Ignore;
        }
        if let Trigger::Finalize { exit_code } = trigger {
            return Transition::Finalize(*exit_code);
        }

        let (next, exit_code) = target(trigger);
        match self {
            Self::Running => Transition::Dispatch { next, exit_code },
            Self::Draining if next != Self::Draining => Transition::Dispatch { next, exit_code },
            // A second signal while shutting down skips whatever is still pending.
            s if s.is_forced() && matches!(trigger, Trigger::Signal(_)) => {
                Transition::Finalize(exit_code)
            }
            _ => Transition::Ignore,
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of feeding a trigger to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Move to `next`, run the asynchronous pass, then exit with `exit_code`.
    Dispatch { next: DriverState, exit_code: i32 },
    /// Fire the final event with this status now.
    Finalize(i32),
    /// Termination is already decided.
    Ignore,
}

/// State a trigger drives towards and the status it exits with.
fn target(trigger: &Trigger) -> (DriverState, i32) {
    match trigger {
        Trigger::Drain { exit_code } => (DriverState::Draining, *exit_code),
        Trigger::Exit { exit_code }
        | Trigger::Manual { exit_code, .. }
        | Trigger::Finalize { exit_code } => (DriverState::Terminating, *exit_code),
        Trigger::Panic(_) | Trigger::UnhandledError(_) => {
            (DriverState::Failing, EXCEPTION_EXIT_CODE)
        }
        Trigger::Signal(signal) => (DriverState::Signaled, signal.exit_code()),
    }
}
