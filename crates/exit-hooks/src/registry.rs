//! Hook registry.
//!
//! Keeps registered [`ExitHook`]s in insertion order, which is also their
//! execution order. The dispatch engine never iterates the live list: it takes
//! a [`snapshot`](HookRegistry::snapshot) and releases the registry before
//! running anything, so hooks can register or remove hooks while they run.

use tracing::debug;

use crate::errors::{ExitHookError, Result};
use crate::hook::ExitHook;

/// Ordered collection of exit hooks.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<ExitHook>,
}

impl HookRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook.
    ///
    /// The same handle may be registered more than once; each entry is a
    /// separate slot but they share one `executed` flag, so it still runs at
    /// most once.
    pub fn register(&mut self, hook: ExitHook) -> Result<()> {
        if hook.name().trim().is_empty() {
            return Err(ExitHookError::InvalidArgument(
                "hook name must not be blank".to_string(),
            ));
        }
        debug!(name = %hook.name(), is_async = hook.is_async(), "Registering exit hook");
        self.hooks.push(hook);
        Ok(())
    }

    /// Remove every entry that is the same hook as `hook`.
    ///
    /// Returns `true` if anything was removed.
    pub fn unregister(&mut self, hook: &ExitHook) -> bool {
        let before_len = self.hooks.len();
        self.hooks.retain(|h| !h.same_hook(hook));
        let removed = self.hooks.len() < before_len;
        if removed {
            debug!(name = %hook.name(), "Unregistered exit hook");
        }
        removed
    }

    /// Ordered copy of the hooks that have not executed yet.
    ///
    /// With `sync_only`, awaitable hooks are left out.
    #[must_use]
    pub fn snapshot(&self, sync_only: bool) -> Vec<ExitHook> {
        self.hooks
            .iter()
            .filter(|h| !h.executed())
            .filter(|h| !sync_only || !h.is_async())
            .cloned()
            .collect()
    }

    /// Whether `hook` is registered.
    #[must_use]
    pub fn contains(&self, hook: &ExitHook) -> bool {
        self.hooks.iter().any(|h| h.same_hook(hook))
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hook_count", &self.len())
            .finish()
    }
}
