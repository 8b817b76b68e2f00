//! Exit hook handles.
//!
//! An [`ExitHook`] pairs a callback with its `executed` flag. Synchronous and
//! awaitable callbacks have separate constructors, so which dispatch pass may
//! run a hook is fixed by its type instead of inspected at call time.
//!
//! Handles are cheap [`Arc`] clones. Clones share identity and the flag, so the
//! handle you registered is the handle you remove with.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::reason::TerminationReason;

pub(crate) type SyncCallback = dyn Fn(&TerminationReason) -> anyhow::Result<()> + Send + Sync;
pub(crate) type AsyncCallback =
    dyn Fn(TerminationReason) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// The callback behind a hook.
pub(crate) enum Callback {
    /// Runs to completion when called.
    Sync(Box<SyncCallback>),
    /// Returns a future the asynchronous pass awaits.
    Async(Box<AsyncCallback>),
}

struct HookInner {
    name: String,
    callback: Callback,
    executed: AtomicBool,
}

/// A shutdown callback.
#[derive(Clone)]
pub struct ExitHook {
    inner: Arc<HookInner>,
}

impl ExitHook {
    /// A hook that runs synchronously.
    ///
    /// Synchronous hooks run in both dispatch passes, including the final
    /// pass right before the process exits.
    pub fn sync<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&TerminationReason) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_callback(name.into(), Callback::Sync(Box::new(callback)))
    }

    /// A hook that returns a future.
    ///
    /// Awaitable hooks only run in the asynchronous pass. If that pass never
    /// reaches them (e.g. `exit_now`), they are skipped.
    pub fn future<F, Fut>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(TerminationReason) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::with_callback(
            name.into(),
            Callback::Async(Box::new(move |reason| callback(reason).boxed())),
        )
    }

    fn with_callback(name: String, callback: Callback) -> Self {
        Self {
            inner: Arc::new(HookInner {
                name,
                callback,
                executed: AtomicBool::new(false),
            }),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the callback returns a future.
    pub fn is_async(&self) -> bool {
        matches!(self.inner.callback, Callback::Async(_))
    }

    /// Whether a dispatch pass has already picked this hook.
    pub fn executed(&self) -> bool {
        self.inner.executed.load(Ordering::SeqCst)
    }

    /// Identity comparison. Two separately built hooks are never the same,
    /// even with identical names and callbacks.
    pub fn same_hook(&self, other: &ExitHook) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Claim the hook for execution. Returns `false` if something else
    /// already did. Only the dispatch engine calls this.
    pub(crate) fn mark_executed(&self) -> bool {
        !self.inner.executed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn callback(&self) -> &Callback {
        &self.inner.callback
    }
}

impl fmt::Debug for ExitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitHook")
            .field("name", &self.name())
            .field("is_async", &self.is_async())
            .field("executed", &self.executed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_hook_is_not_async() {
        let hook = ExitHook::sync("flush", |_| Ok(()));
        assert!(!hook.is_async());
        assert_eq!(hook.name(), "flush");
        assert!(!hook.executed());
    }

    #[test]
    fn future_hook_is_async() {
        let hook = ExitHook::future("upload", |_| async { anyhow::Ok(()) });
        assert!(hook.is_async());
    }

    #[test]
    fn clones_share_identity_and_flag() {
        let hook = ExitHook::sync("a", |_| Ok(()));
        let clone = hook.clone();
        assert!(hook.same_hook(&clone));
        assert!(clone.mark_executed());
        assert!(hook.executed());
    }

    #[test]
    fn identical_hooks_are_distinct() {
        let a = ExitHook::sync("same", |_| Ok(()));
        let b = ExitHook::sync("same", |_| Ok(()));
        assert!(!a.same_hook(&b));
    }

    #[test]
    fn mark_executed_only_once() {
        let hook = ExitHook::sync("a", |_| Ok(()));
        assert!(hook.mark_executed());
        assert!(!hook.mark_executed());
        assert!(hook.executed());
    }

    #[test]
    fn debug_impl() {
        let hook = ExitHook::sync("dbg", |_| Ok(()));
        let debug = format!("{hook:?}");
        assert!(debug.contains("ExitHook"));
        assert!(debug.contains("dbg"));
    }
}
