//! Termination driver.
//!
//! Owns the hook registry for the lifetime of the process and turns every
//! termination trigger into exactly one outcome:
//!
//! ```text
//! Running ──drain──────────► Draining ──┐
//!    │  └──panic/error──────► Failing ───┤
//!    │  └──signal───────────► Signaled ──┼── async pass ──► final event ──► Exited
//!    └─────exit/manual──────► Terminating┘       (sync pass, ProcessExit)
//! ```
//!
//! Failing, Signaled and Terminating preempt Draining. Once one of them is in
//! progress, only a further signal changes anything: it fires the final event
//! immediately with that signal's status.
//!
//! [`TerminationDriver::run`] drives the host's main future together with the
//! trigger channel fed by signal listeners and, when enabled, the panic hook.

mod exit;
mod state;

use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use exit_hooks_settings::ExitHookSettings;
use futures::future::LocalBoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use exit::{ProcessExit, RecordingExit, StdProcessExit};
pub use state::{DriverState, EXCEPTION_EXIT_CODE};

use self::state::Transition;
use crate::classifier::Trigger;
use crate::diagnostics::DefaultDiagnostics;
use crate::dispatch::Dispatcher;
use crate::errors::Result;
use crate::hook::ExitHook;
use crate::reason::{TerminationReason, TerminationSignal, Thrown};
use crate::registry::HookRegistry;
use crate::{panic, signals};

/// Process-scoped coordinator for exit hooks.
pub struct TerminationDriver {
    registry: Arc<Mutex<HookRegistry>>,
    dispatcher: Dispatcher,
    state: Mutex<DriverState>,
    finalized: AtomicBool,
    exit_code: AtomicI32,
    status: watch::Sender<Option<i32>>,
    process_exit: Arc<dyn ProcessExit>,
    diagnostics: ExitHook,
    signals: Vec<TerminationSignal>,
    install_panic_hook: bool,
    triggers: mpsc::UnboundedSender<Trigger>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Trigger>>>,
}

impl TerminationDriver {
    /// Driver that exits the real process, with diagnostics on stderr.
    pub fn new(settings: &ExitHookSettings) -> Self {
        Self::with_parts(
            settings,
            Arc::new(StdProcessExit),
            DefaultDiagnostics::stderr(),
        )
    }

    /// Driver with a custom exit implementation and diagnostics writer.
    pub fn with_parts(
        settings: &ExitHookSettings,
        process_exit: Arc<dyn ProcessExit>,
        diagnostics: DefaultDiagnostics,
    ) -> Self {
        let registry = Arc::new(Mutex::new(HookRegistry::new()));
        let (triggers, receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(None);
        let driver = Self {
            dispatcher: Dispatcher::new(registry.clone()),
            registry,
            state: Mutex::new(DriverState::Running),
            finalized: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            status,
            process_exit,
            diagnostics: diagnostics.into_hook(),
            signals: signals::parse_signals(&settings.signals),
            install_panic_hook: settings.install_panic_hook,
            triggers,
            receiver: Mutex::new(Some(receiver)),
        };
        driver.set_default_diagnostics(settings.default_diagnostics);
        driver
    }

    /// Register a hook. It runs after every hook registered before it.
    pub fn add_exit_hook(&self, hook: ExitHook) -> Result<()> {
        self.registry.lock().register(hook)
    }

    /// Unregister a hook by identity. Unknown hooks are ignored.
    pub fn remove_exit_hook(&self, hook: &ExitHook) -> bool {
        self.registry.lock().unregister(hook)
    }

    /// Enable or disable the built-in diagnostics hook.
    ///
    /// Re-enabling appends the same hook again, so it runs after hooks added
    /// in the meantime.
    pub fn set_default_diagnostics(&self, enabled: bool) {
        let mut registry = self.registry.lock();
        if enabled {
            if registry.contains(&self.diagnostics) {
                return;
            }
            if let Err(error) = registry.register(self.diagnostics.clone()) {
                warn!(%error, "Failed to register default diagnostics");
            }
        } else {
            let _ = registry.unregister(&self.diagnostics);
        }
    }

    /// Whether the diagnostics hook is registered.
    pub fn default_diagnostics_enabled(&self) -> bool {
        self.registry.lock().contains(&self.diagnostics)
    }

    /// Set the status used when the main future completes normally.
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// Natural exit status.
    pub fn exit_code(&self) -> i32 {
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        *self.state.lock()
    }

    /// The status the process exits with, once the final event has fired.
    pub fn exit_status(&self) -> Option<i32> {
        *self.status.borrow()
    }

    /// Wait until the final event has fired and return its status.
    pub async fn wait_for_exit(&self) -> i32 {
        let mut status = self.status.subscribe();
        let decided = status.wait_for(Option::is_some).await.ok().and_then(|code| *code);
        decided.unwrap_or(EXCEPTION_EXIT_CODE)
    }

    /// Queue a trigger for [`run`](Self::run). Returns `false` if the driver
    /// no longer accepts triggers.
    pub fn report(&self, trigger: Trigger) -> bool {
        self.triggers.send(trigger).is_ok()
    }

    /// Run every pending hook with a manual reason, then exit with
    /// `exit_code`.
    ///
    /// Returns the decided status, or `None` if termination was already under
    /// way. With [`StdProcessExit`] a decided call does not return.
    pub async fn terminate_with_hooks(
        &self,
        exit_code: i32,
        extra: impl Into<serde_json::Value>,
    ) -> Option<i32> {
        self.handle(Trigger::Manual {
            exit_code,
            extra: extra.into(),
        })
        .await
    }

    /// Explicit exit from code that can still await: pending hooks run with
    /// a trivial reason first.
    pub async fn exit(&self, exit_code: i32) -> Option<i32> {
        self.handle(Trigger::Exit { exit_code }).await
    }

    /// Explicit exit that cannot wait. Only synchronous hooks still pending
    /// run; awaitable hooks are skipped.
    pub fn exit_now(&self, exit_code: i32) -> Option<i32> {
        self.finalize(exit_code)
    }

    /// Classify `trigger`, run the hooks it calls for and decide the status.
    ///
    /// Returns `None` when the trigger was ignored or preempted by another
    /// trigger while its hooks ran.
    pub async fn handle(&self, trigger: Trigger) -> Option<i32> {
        let transition = {
            let mut state = self.state.lock();
            let transition = state.on_trigger(&trigger);
            if let Transition::Dispatch { next, .. } = transition {
                *state = next;
            }
            transition
        };

        match transition {
            Transition::Ignore => {
                debug!(state = %self.state(), "Termination already decided, ignoring trigger");
                None
            }
            Transition::Finalize(exit_code) => self.finalize(exit_code),
            Transition::Dispatch { next, exit_code } => {
                let reason = TerminationReason::classify(&trigger);
                info!(state = %next, category = reason.category(), "Running exit hooks");
                let _ = self.dispatcher.run_hooks(&reason).await;

                if self.state() != next {
                    debug!(state = %next, "Exit hook pass preempted");
                    return None;
                }
                // Hooks may still change the natural status while draining.
                let exit_code = if next == DriverState::Draining {
                    self.exit_code()
                } else {
                    exit_code
                };
                self.finalize(exit_code)
            }
        }
    }

    /// The final event: last synchronous pass, then exit. Fires once.
    fn finalize(&self, exit_code: i32) -> Option<i32> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return None;
        }
        *self.state.lock() = DriverState::Exited;

        let reason = TerminationReason::classify(&Trigger::Finalize { exit_code });
        let _ = self.dispatcher.run_sync_hooks(&reason);

        info!(exit_code, "Process exiting");
        let _ = self.status.send_replace(Some(exit_code));
        self.process_exit.exit(exit_code);
        Some(exit_code)
    }

    /// Drive `main` until an exit status is decided, then return it.
    ///
    /// Installs the configured signal listeners, plus the panic hook when
    /// enabled, for the duration of the call. `Ok(())` drains with the
    /// natural exit status; `Err` and a panic escaping `main` terminate with
    /// status 1. A panic `main` catches itself is not a trigger unless the
    /// panic hook is enabled. Calling this a second time only waits for the
    /// status.
    pub async fn run<F, E>(&self, main: F) -> i32
    where
        F: Future<Output = std::result::Result<(), E>>,
        E: Into<anyhow::Error>,
    {
        let Some(mut triggers) = self.receiver.lock().take() else {
            warn!("Termination driver is already running");
            return self.wait_for_exit().await;
        };
        let _panic_hook = self
            .install_panic_hook
            .then(|| panic::install_panic_hook(self.triggers.clone()));
        let listeners = signals::spawn_listeners(&self.signals, &self.triggers);

        let mut status = self.status.subscribe();
        let mut main = pin!(AssertUnwindSafe(main).catch_unwind());
        let mut main_done = false;
        let mut passes: FuturesUnordered<LocalBoxFuture<'_, Option<i32>>> = FuturesUnordered::new();

        let exit_code = loop {
            let decided = *status.borrow_and_update();
            if let Some(code) = decided {
                break code;
            }
            tokio::select! {
                outcome = &mut main, if !main_done => {
                    main_done = true;
                    let trigger = match outcome {
                        Ok(Ok(())) => Trigger::Drain { exit_code: self.exit_code() },
                        Ok(Err(error)) => Trigger::UnhandledError(Thrown::from_error(error.into())),
                        Err(payload) => Trigger::Panic(Thrown::from_panic(&*payload)),
                    };
                    passes.push(self.handle(trigger).boxed_local());
                }
                Some(trigger) = triggers.recv() => passes.push(self.handle(trigger).boxed_local()),
                Some(_) = passes.next(), if !passes.is_empty() => {}
                Ok(()) = status.changed() => {}
            }
        };

        for listener in listeners {
            listener.abort();
        }
        exit_code
    }
}

impl std::fmt::Debug for TerminationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationDriver")
            .field("state", &self.state())
            .field("exit_status", &self.exit_status())
            .field("hook_count", &self.registry.lock().len())
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
