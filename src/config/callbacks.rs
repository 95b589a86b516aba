//! Callbacks run after every successful configuration reload.

use std::sync::{Arc, RwLock};

use super::ConfigManager;

/// A function run after a reload. Errors are logged, never propagated.
pub type ReloadCallback = Arc<dyn Fn(&ConfigManager) -> anyhow::Result<()> + Send + Sync>;

/// Ordered list of reload callbacks.
#[derive(Default)]
pub(crate) struct ReloadCallbacks {
    callbacks: RwLock<Vec<ReloadCallback>>,
}

impl ReloadCallbacks {
    /// Appends a callback. Registering the same callback twice runs it twice.
    pub fn register(&self, callback: ReloadCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }

    /// Copies the current list so callbacks run without the lock held.
    pub fn snapshot(&self) -> Vec<ReloadCallback> {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Runs every registered callback in registration order. Returns the
    /// number of callbacks that failed.
    pub fn notify(&self, manager: &ConfigManager) -> usize {
        let callbacks = self.snapshot();
        let mut failed = 0;

        for (index, callback) in callbacks.iter().enumerate() {
            if let Err(e) = callback(manager) {
                failed += 1;
                tracing::error!(index, error = %format!("{e:#}"), "Config reload callback failed");
            }
        }

        tracing::debug!(count = callbacks.len(), failed, "Ran config reload callbacks");
        failed
    }
}
