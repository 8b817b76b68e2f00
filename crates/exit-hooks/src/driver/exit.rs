//! Process exit seam.

use parking_lot::Mutex;

/// Ends the process once the exit status is decided.
pub trait ProcessExit: Send + Sync {
    /// Exit with `code`. The real implementation never returns.
    fn exit(&self, code: i32);
}

/// Calls [`std::process::exit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}

/// Records exit requests instead of exiting. For tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingExit {
    codes: Mutex<Vec<i32>>,
}

impl RecordingExit {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every code passed to [`ProcessExit::exit`], in order.
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().clone()
    }
}

impl ProcessExit for RecordingExit {
    fn exit(&self, code: i32) {
        self.codes.lock().push(code);
    }
}
