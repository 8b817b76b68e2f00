//! Reason classifier.
//!
//! Maps each termination trigger to the [`TerminationReason`] its hooks
//! observe. One rule per trigger, no state.

use crate::reason::{TerminationReason, TerminationSignal, Thrown};

/// Something that ends the process.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The main future completed and nothing else is pending.
    Drain {
        /// Natural exit code.
        exit_code: i32,
    },
    /// An explicit exit request from code that can still await.
    Exit {
        /// Requested exit code.
        exit_code: i32,
    },
    /// The final termination event, right before the process exits.
    Finalize {
        /// Status the process is about to exit with.
        exit_code: i32,
    },
    /// A panic nobody caught.
    Panic(Thrown),
    /// The main future resolved with an error.
    UnhandledError(Thrown),
    /// An external termination signal.
    Signal(TerminationSignal),
    /// Explicit termination with hooks run first.
    Manual {
        /// Status to exit with once hooks finish.
        exit_code: i32,
        /// Payload forwarded to hooks.
        extra: serde_json::Value,
    },
}

impl TerminationReason {
    /// Build the reason hooks observe for `trigger`.
    pub fn classify(trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Drain { exit_code }
            | Trigger::Exit { exit_code }
            | Trigger::Finalize { exit_code } => Self::Trivial {
                exit_code: *exit_code,
            },
            Trigger::Panic(thrown) | Trigger::UnhandledError(thrown) => Self::Exception {
                error_or_reason: thrown.clone(),
            },
            Trigger::Signal(signal) => Self::Signal { signal: *signal },
            Trigger::Manual { extra, .. } => Self::Manual {
                extra: extra.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn drain_and_exits_are_trivial() {
        for trigger in [
            Trigger::Drain { exit_code: 0 },
            Trigger::Exit { exit_code: 99 },
            Trigger::Finalize { exit_code: 3 },
        ] {
            assert_matches!(
                TerminationReason::classify(&trigger),
                TerminationReason::Trivial { .. }
            );
        }
        assert_matches!(
            TerminationReason::classify(&Trigger::Exit { exit_code: 99 }),
            TerminationReason::Trivial { exit_code: 99 }
        );
    }

    #[test]
    fn panic_and_error_are_exceptions() {
        let reason = TerminationReason::classify(&Trigger::Panic(Thrown::panicked("test error")));
        assert_matches!(reason, TerminationReason::Exception { ref error_or_reason } if error_or_reason.message() == "test error");

        let reason = TerminationReason::classify(&Trigger::UnhandledError(Thrown::from_error(
            anyhow::anyhow!("test error"),
        )));
        assert_matches!(reason, TerminationReason::Exception { ref error_or_reason } if error_or_reason.message() == "test error");
    }

    #[test]
    fn signal_keeps_name() {
        let reason = TerminationReason::classify(&Trigger::Signal(TerminationSignal::Term));
        assert_matches!(
            reason,
            TerminationReason::Signal {
                signal: TerminationSignal::Term
            }
        );
    }

    #[test]
    fn manual_forwards_extra() {
        let reason = TerminationReason::classify(&Trigger::Manual {
            exit_code: 99,
            extra: serde_json::json!("test data"),
        });
        assert_matches!(reason, TerminationReason::Manual { ref extra } if extra == "test data");
    }
}
