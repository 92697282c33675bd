//! One-shot hooks keyed by subagent id.
//!
//! A hook runs at most once: firing removes it before it is invoked. A hook
//! that panics is logged and does not stop the remaining hooks.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, PoisonError};

pub type OneShotHook<T> = Box<dyn FnOnce(&T) + Send>;

pub struct OneShotHooks<T> {
    hooks: Mutex<HashMap<String, Vec<OneShotHook<T>>>>,
}

impl<T> Default for OneShotHooks<T> {
    fn default() -> Self {
        Self {
            hooks: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> OneShotHooks<T> {
    pub fn register(&self, key: impl Into<String>, hook: OneShotHook<T>) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.into())
            .or_default()
            .push(hook);
    }

    /// Remove and run every hook registered under `key`. Returns how many
    /// completed without panicking.
    pub fn fire(&self, key: &str, value: &T) -> usize {
        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .unwrap_or_default();

        let mut completed = 0;
        for hook in hooks {
            match catch_unwind(AssertUnwindSafe(|| hook(value))) {
                Ok(()) => completed += 1,
                Err(_) => tracing::error!(key, "One-shot hook panicked"),
            }
        }
        completed
    }

    /// Drop hooks for `key` without running them.
    pub fn discard(&self, key: &str) -> bool {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
