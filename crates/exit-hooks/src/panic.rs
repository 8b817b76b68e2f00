//! Opt-in panic reporting.
//!
//! While installed, a panic on any thread that is not inside an exit hook
//! becomes a [`Trigger::Panic`], whether or not the program catches it later.
//! The previously installed hook still runs for those, so the usual panic
//! message is printed. Panics raised by hooks are already contained by the
//! dispatch engine and are left silent.

use std::panic::PanicHookInfo;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::classifier::Trigger;
use crate::dispatch::running_hook;
use crate::reason::Thrown;

type PanicHook = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

/// Restores the panic hook that was in place before [`install_panic_hook`].
#[must_use = "the previous panic hook is restored when the guard drops"]
pub(crate) struct PanicHookGuard {
    previous: Arc<PanicHook>,
}

/// Chain a panic hook that forwards panics to `triggers`.
pub(crate) fn install_panic_hook(triggers: UnboundedSender<Trigger>) -> PanicHookGuard {
    let previous: Arc<PanicHook> = Arc::from(std::panic::take_hook());
    let chained = previous.clone();
    std::panic::set_hook(Box::new(move |info| {
        if !running_hook() {
            let _ = triggers.send(Trigger::Panic(Thrown::from_panic(info.payload())));
            chained(info);
        }
    }));
    PanicHookGuard { previous }
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        // set_hook panics on a panicking thread.
        if std::thread::panicking() {
            return;
        }
        let previous = self.previous.clone();
        std::panic::set_hook(Box::new(move |info| previous(info)));
    }
}
