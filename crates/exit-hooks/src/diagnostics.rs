//! Default diagnostics hook.
//!
//! Prints one line for exception and signal terminations so a crash or an
//! interrupted run is never silent. Trivial and manual terminations print
//! nothing.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::hook::ExitHook;
use crate::reason::TerminationReason;

/// Name of the built-in diagnostics hook.
pub const DIAGNOSTICS_HOOK_NAME: &str = "default-diagnostics";

/// Writes a one-line summary of why the process is exiting.
#[derive(Clone)]
pub struct DefaultDiagnostics {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl DefaultDiagnostics {
    /// Diagnostics written to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(std::io::stderr())
    }

    /// Diagnostics written to `writer`.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// The line printed for `reason`, if any.
    pub fn message(reason: &TerminationReason) -> Option<String> {
        match reason {
            TerminationReason::Exception { error_or_reason } => Some(format!(
                "the program is now exiting due to unhandled exception: {error_or_reason}"
            )),
            TerminationReason::Signal { signal } => Some(format!(
                "the program is now exiting due to receiving signal: {signal}"
            )),
            TerminationReason::Trivial { .. } | TerminationReason::Manual { .. } => None,
        }
    }

    /// Write the line for `reason`.
    pub fn report(&self, reason: &TerminationReason) -> std::io::Result<()> {
        let Some(line) = Self::message(reason) else {
            return Ok(());
        };
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()
    }

    /// Wrap into a synchronous hook named [`DIAGNOSTICS_HOOK_NAME`].
    #[must_use]
    pub fn into_hook(self) -> ExitHook {
        ExitHook::sync(DIAGNOSTICS_HOOK_NAME, move |reason| {
            self.report(reason)?;
            Ok(())
        })
    }
}

impl Default for DefaultDiagnostics {
    fn default() -> Self {
        Self::stderr()
    }
}

impl std::fmt::Debug for DefaultDiagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultDiagnostics").finish_non_exhaustive()
    }
}

/// In-memory writer shared between a test and the hook it inspects.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
