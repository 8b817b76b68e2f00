//! Hook dispatch engine.
//!
//! Runs the unexecuted hooks for a termination reason, one at a time, in
//! registration order.
//!
//! # Execution Model
//!
//! Two passes:
//! - **Asynchronous** ([`run_hooks`](Dispatcher::run_hooks)): every unexecuted
//!   hook. Awaitable hooks are awaited to completion before the next hook starts.
//! - **Synchronous** ([`run_sync_hooks`](Dispatcher::run_sync_hooks)): only
//!   synchronous hooks. Used at the final termination event, where nothing can
//!   be awaited any more.
//!
//! A hook is marked executed immediately before it is invoked, so a re-entrant
//! pass started from inside a hook never picks it up again.
//!
//! # Failures
//!
//! Errors and panics raised by a hook are discarded. They do not stop the
//! pass, are not logged, and never change the exit status. While a hook runs
//! on a thread, [`running_hook`] is `true` there, so the panic hook can tell a
//! hook panic from an uncaught one.

use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::errors::HookError;
use crate::hook::{AsyncCallback, Callback, ExitHook, SyncCallback};
use crate::reason::{TerminationReason, panic_message};
use crate::registry::HookRegistry;

/// Counters for one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Hooks invoked by this pass.
    pub attempted: usize,
    /// Invoked hooks that returned an error or panicked.
    pub failed: usize,
    /// Snapshot entries another pass claimed first.
    pub skipped: usize,
}

impl DispatchSummary {
    /// Count a hook outcome and drop any failure.
    fn discard_hook_failure(&mut self, outcome: Result<(), HookError>) {
        self.attempted += 1;
        if outcome.is_err() {
            self.failed += 1;
        }
    }
}

/// Runs hooks from a shared registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Mutex<HookRegistry>>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<Mutex<HookRegistry>>) -> Self {
        Self { registry }
    }

    /// Asynchronous pass over every unexecuted hook.
    ///
    /// Returns once each hook in the snapshot has been attempted. A hook whose
    /// future never resolves stalls the pass.
    #[instrument(skip_all, fields(category = reason.category()))]
    pub async fn run_hooks(&self, reason: &TerminationReason) -> DispatchSummary {
        let hooks = self.registry.lock().snapshot(false);
        let mut summary = DispatchSummary::default();

        for hook in hooks {
            if !hook.mark_executed() {
                summary.skipped += 1;
                continue;
            }
            let outcome = match hook.callback() {
                Callback::Sync(callback) => invoke_sync(&hook, callback.as_ref(), reason),
                Callback::Async(callback) => {
                    invoke_async(&hook, callback.as_ref(), reason.clone()).await
                }
            };
            summary.discard_hook_failure(outcome);
        }

        debug!(
            attempted = summary.attempted,
            failed = summary.failed,
            skipped = summary.skipped,
            "Asynchronous exit hook pass complete"
        );
        summary
    }

    /// Synchronous pass over unexecuted synchronous hooks.
    ///
    /// Awaitable hooks that have not run yet are left alone; they never run.
    #[instrument(skip_all, fields(category = reason.category()))]
    pub fn run_sync_hooks(&self, reason: &TerminationReason) -> DispatchSummary {
        let hooks = self.registry.lock().snapshot(false);
        let mut summary = DispatchSummary::default();

        for hook in hooks {
            // Awaitable hooks stay pending; nothing can await them here.
            let Callback::Sync(callback) = hook.callback() else {
                continue;
            };
            if !hook.mark_executed() {
                summary.skipped += 1;
                continue;
            }
            let outcome = invoke_sync(&hook, callback.as_ref(), reason);
            summary.discard_hook_failure(outcome);
        }

        debug!(
            attempted = summary.attempted,
            failed = summary.failed,
            skipped = summary.skipped,
            "Synchronous exit hook pass complete"
        );
        summary
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &*self.registry.lock())
            .finish()
    }
}

thread_local! {
    static HOOK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Whether the current thread is inside a hook callback or polling a hook's
/// future.
pub fn running_hook() -> bool {
    HOOK_DEPTH.with(|depth| depth.get() > 0)
}

/// Marks the current thread as running a hook until dropped.
struct HookScope;

impl HookScope {
    fn enter() -> Self {
        HOOK_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for HookScope {
    fn drop(&mut self) {
        HOOK_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

fn invoke_sync(
    hook: &ExitHook,
    callback: &SyncCallback,
    reason: &TerminationReason,
) -> Result<(), HookError> {
    let _scope = HookScope::enter();
    match std::panic::catch_unwind(AssertUnwindSafe(|| callback(reason))) {
        Ok(result) => result.map_err(|e| failed(hook, &e)),
        Err(payload) => Err(panicked(hook, payload.as_ref())),
    }
}

async fn invoke_async(
    hook: &ExitHook,
    callback: &AsyncCallback,
    reason: TerminationReason,
) -> Result<(), HookError> {
    // Building the future can panic too.
    let built = {
        let _scope = HookScope::enter();
        std::panic::catch_unwind(AssertUnwindSafe(|| callback(reason)))
    };
    let mut future = match built {
        Ok(future) => future,
        Err(payload) => return Err(panicked(hook, payload.as_ref())),
    };
    let scoped = futures::future::poll_fn(move |cx| {
        let _scope = HookScope::enter();
        future.as_mut().poll(cx)
    });
    match AssertUnwindSafe(scoped).catch_unwind().await {
        Ok(result) => result.map_err(|e| failed(hook, &e)),
        Err(payload) => Err(panicked(hook, payload.as_ref())),
    }
}

fn failed(hook: &ExitHook, error: &anyhow::Error) -> HookError {
    HookError::Failed {
        name: hook.name().to_string(),
        message: format!("{error:#}"),
    }
}

fn panicked(hook: &ExitHook, payload: &(dyn std::any::Any + Send)) -> HookError {
    HookError::Panicked {
        name: hook.name().to_string(),
        message: panic_message(payload),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::reason::TerminationSignal;

    type Log = Arc<Mutex<Vec<String>>>;

    fn setup() -> (Arc<Mutex<HookRegistry>>, Dispatcher, Log) {
        let registry = Arc::new(Mutex::new(HookRegistry::new()));
        let dispatcher = Dispatcher::new(registry.clone());
        (registry, dispatcher, Arc::new(Mutex::new(Vec::new())))
    }

    fn recording_sync(name: &str, log: &Log) -> ExitHook {
        let log = log.clone();
        let label = name.to_string();
        ExitHook::sync(name, move |reason| {
            log.lock().push(format!("{label}:{}", reason.category()));
            Ok(())
        })
    }

    fn recording_async(name: &str, log: &Log) -> ExitHook {
        let log = log.clone();
        let label = name.to_string();
        ExitHook::future(name, move |reason| {
            let log = log.clone();
            let label = label.clone();
            async move {
                tokio::task::yield_now().await;
                log.lock().push(format!("{label}:{}", reason.category()));
                anyhow::Ok(())
            }
        })
    }

    fn explode() -> anyhow::Result<()> {
        panic!("async hook panic")
    }

    fn trivial(code: i32) -> TerminationReason {
        TerminationReason::Trivial { exit_code: code }
    }

    #[tokio::test]
    async fn runs_in_registration_order() {
        let (registry, dispatcher, log) = setup();
        {
            let mut registry = registry.lock();
            registry.register(recording_async("a", &log)).unwrap();
            registry.register(recording_sync("b", &log)).unwrap();
            registry.register(recording_async("c", &log)).unwrap();
        }

        let summary = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(summary.attempted, 3);
        assert_eq!(*log.lock(), ["a:trivial", "b:trivial", "c:trivial"]);
    }

    #[tokio::test]
    async fn async_hook_settles_before_next_starts() {
        let (registry, dispatcher, log) = setup();
        let slow_log = log.clone();
        let slow = ExitHook::future("slow", move |_| {
            let log = slow_log.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                log.lock().push("slow".to_string());
                anyhow::Ok(())
            }
        });
        {
            let mut registry = registry.lock();
            registry.register(slow).unwrap();
            registry.register(recording_sync("fast", &log)).unwrap();
        }

        let _ = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(*log.lock(), ["slow", "fast:trivial"]);
    }

    #[tokio::test]
    async fn second_pass_runs_nothing() {
        let (registry, dispatcher, log) = setup();
        registry.lock().register(recording_sync("a", &log)).unwrap();

        let first = dispatcher.run_hooks(&trivial(0)).await;
        let second = dispatcher.run_hooks(&trivial(0)).await;
        let sync = dispatcher.run_sync_hooks(&trivial(0));

        assert_eq!(first.attempted, 1);
        assert_eq!(second.attempted, 0);
        assert_eq!(sync.attempted, 0);
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn failing_hooks_do_not_stop_the_pass() {
        let (registry, dispatcher, log) = setup();
        {
            let mut registry = registry.lock();
            registry
                .register(ExitHook::sync("errs", |_| anyhow::bail!("nope")))
                .unwrap();
            registry
                .register(ExitHook::sync("panics", |_| panic!("hook panic")))
                .unwrap();
            registry
                .register(ExitHook::future("rejects", |_| async {
                    Err::<(), _>(anyhow::anyhow!("rejected"))
                }))
                .unwrap();
            registry
                .register(ExitHook::future("panics-async", |_| async { explode() }))
                .unwrap();
            registry.register(recording_sync("last", &log)).unwrap();
        }

        let summary = dispatcher
            .run_hooks(&TerminationReason::Signal {
                signal: TerminationSignal::Int,
            })
            .await;
        assert_eq!(summary.attempted, 5);
        assert_eq!(summary.failed, 4);
        assert_eq!(*log.lock(), ["last:signal"]);
    }

    #[test]
    fn sync_pass_skips_async_hooks() {
        let (registry, dispatcher, log) = setup();
        let pending = recording_async("async", &log);
        {
            let mut registry = registry.lock();
            registry.register(pending.clone()).unwrap();
            registry.register(recording_sync("sync", &log)).unwrap();
        }

        let summary = dispatcher.run_sync_hooks(&trivial(1));
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(*log.lock(), ["sync:trivial"]);
        assert!(!pending.executed());
        assert_eq!(registry.lock().snapshot(false).len(), 1);
    }

    #[tokio::test]
    async fn sync_pass_after_async_pass_finds_nothing() {
        let (registry, dispatcher, log) = setup();
        {
            let mut registry = registry.lock();
            registry.register(recording_async("a", &log)).unwrap();
            registry.register(recording_sync("b", &log)).unwrap();
        }

        let _ = dispatcher.run_hooks(&trivial(99)).await;
        let summary = dispatcher.run_sync_hooks(&trivial(99));
        assert_eq!(summary.attempted, 0);
        assert_eq!(*log.lock(), ["a:trivial", "b:trivial"]);
    }

    #[tokio::test]
    async fn reentrant_pass_does_not_double_fire() {
        let (registry, dispatcher, log) = setup();
        let inner = dispatcher.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let reentrant = ExitHook::future("reentrant", move |reason| {
            let inner = inner.clone();
            let counted = counted.clone();
            async move {
                let _ = counted.fetch_add(1, Ordering::SeqCst);
                let _ = inner.run_hooks(&reason).await;
                anyhow::Ok(())
            }
        });
        {
            let mut registry = registry.lock();
            registry.register(reentrant).unwrap();
            registry.register(recording_sync("after", &log)).unwrap();
        }

        let summary = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The nested pass claimed "after" first.
        assert_eq!(summary.skipped, 1);
        assert_eq!(*log.lock(), ["after:trivial"]);
    }

    #[tokio::test]
    async fn hook_registered_during_pass_waits_for_next_pass() {
        let (registry, dispatcher, log) = setup();
        let late = recording_sync("late", &log);
        let reg = registry.clone();
        let adder = ExitHook::sync("adder", move |_| {
            reg.lock().register(late.clone())?;
            Ok(())
        });
        registry.lock().register(adder).unwrap();

        let first = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(first.attempted, 1);
        assert!(log.lock().is_empty());

        let second = dispatcher.run_sync_hooks(&trivial(0));
        assert_eq!(second.attempted, 1);
        assert_eq!(*log.lock(), ["late:trivial"]);
    }

    #[tokio::test]
    async fn hook_removed_during_pass_still_runs_from_snapshot() {
        let (registry, dispatcher, log) = setup();
        let victim = recording_sync("victim", &log);
        let reg = registry.clone();
        let target = victim.clone();
        let remover = ExitHook::sync("remover", move |_| {
            let _ = reg.lock().unregister(&target);
            Ok(())
        });
        {
            let mut registry = registry.lock();
            registry.register(remover).unwrap();
            registry.register(victim).unwrap();
        }

        let _ = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(*log.lock(), ["victim:trivial"]);
    }

    #[tokio::test]
    async fn running_hook_is_set_only_inside_hooks() {
        let (registry, dispatcher, _) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sync_seen = seen.clone();
        let async_seen = seen.clone();
        {
            let mut registry = registry.lock();
            registry
                .register(ExitHook::sync("sync", move |_| {
                    sync_seen.lock().push(running_hook());
                    Ok(())
                }))
                .unwrap();
            registry
                .register(ExitHook::future("async", move |_| {
                    let seen = async_seen.clone();
                    async move {
                        tokio::task::yield_now().await;
                        seen.lock().push(running_hook());
                        anyhow::Ok(())
                    }
                }))
                .unwrap();
            registry
                .register(ExitHook::sync("panics", |_| panic!("inside")))
                .unwrap();
        }

        assert!(!running_hook());
        let _ = dispatcher.run_hooks(&trivial(0)).await;
        assert_eq!(*seen.lock(), [true, true]);
        assert!(!running_hook());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(usize),
        Unregister(usize),
        AsyncPass,
        SyncPass,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize).prop_map(Op::Register),
            (0..4usize).prop_map(Op::Unregister),
            Just(Op::AsyncPass),
            Just(Op::SyncPass),
        ]
    }

    proptest! {
        #[test]
        fn each_hook_runs_at_most_once(ops in proptest::collection::vec(op(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (registry, dispatcher, _) = setup();
            let counts: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
            let hooks: Vec<ExitHook> = counts
                .iter()
                .enumerate()
                .map(|(i, count)| {
                    let count = count.clone();
                    if i % 2 == 0 {
                        ExitHook::sync(format!("h{i}"), move |_| {
                            let _ = count.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                    } else {
                        ExitHook::future(format!("h{i}"), move |_| {
                            let count = count.clone();
                            async move {
                                let _ = count.fetch_add(1, Ordering::SeqCst);
                                anyhow::Ok(())
                            }
                        })
                    }
                })
                .collect();

            for op in ops {
                match op {
                    Op::Register(i) => registry.lock().register(hooks[i].clone()).unwrap(),
                    Op::Unregister(i) => {
                        let _ = registry.lock().unregister(&hooks[i]);
                    }
                    Op::AsyncPass => {
                        let _ = rt.block_on(dispatcher.run_hooks(&trivial(0)));
                    }
                    Op::SyncPass => {
                        let _ = dispatcher.run_sync_hooks(&trivial(0));
                    }
                }
            }

            for (hook, count) in hooks.iter().zip(&counts) {
                let runs = count.load(Ordering::SeqCst);
                prop_assert!(runs <= 1);
                prop_assert_eq!(runs == 1, hook.executed());
            }
        }

        #[test]
        fn pass_follows_registration_order(order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (registry, dispatcher, log) = setup();
            for i in &order {
                let hook = if i % 2 == 0 {
                    recording_sync(&i.to_string(), &log)
                } else {
                    recording_async(&i.to_string(), &log)
                };
                registry.lock().register(hook).unwrap();
            }

            let _ = rt.block_on(dispatcher.run_hooks(&trivial(0)));
            let expected: Vec<String> = order.iter().map(|i| format!("{i}:trivial")).collect();
            prop_assert_eq!(log.lock().clone(), expected);
        }
    }
}
