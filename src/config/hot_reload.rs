//! Configuration hot-reload functionality.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, trace, warn};

use super::loader::is_yaml_file;
use super::ConfigManager;
use crate::error::ConfigError;

/// Quiet period after a change before the reload runs. Further events in
/// the window are folded into the same reload.
pub const DEBOUNCE: Duration = Duration::from_millis(150);

/// Everything the watch loop reacts to, multiplexed on one channel.
#[derive(Debug)]
pub(crate) enum WatchSignal {
    /// A filesystem event or an observer error.
    Fs(notify::Result<Event>),
    /// Explicit stop request.
    Stop,
}

/// State held by a manager while it is watching.
pub(crate) struct WatchHandle {
    // Dropping the observer closes it.
    _watcher: Option<RecommendedWatcher>,
    stop_tx: Sender<WatchSignal>,
}

impl ConfigManager {
    /// Starts watching the configuration directory. Calling it while
    /// already watching does nothing.
    ///
    /// A create or write of a YAML file triggers [`ConfigManager::reload`]
    /// on a background thread. Reload failures and callback errors are
    /// logged and the watch continues.
    pub fn watch(self: &Arc<Self>) -> Result<(), ConfigError> {
        let mut state = self.watch.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_some() {
            debug!(dir = ?self.config_dir, "Config watcher already running");
            return Ok(());
        }

        let (tx, rx) = mpsc::channel();
        let fs_tx = tx.clone();
        let setup_error = |source: notify::Error| ConfigError::WatcherSetup {
            path: self.config_dir.clone(),
            source,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = fs_tx.send(WatchSignal::Fs(res));
            },
            Config::default(),
        )
        .map_err(setup_error)?;

        watcher
            .watch(&self.config_dir, RecursiveMode::NonRecursive)
            .map_err(setup_error)?;

        self.spawn_watch_loop(rx, DEBOUNCE)
            .map_err(|e| setup_error(notify::Error::io(e)))?;

        *state = Some(WatchHandle {
            _watcher: Some(watcher),
            stop_tx: tx,
        });

        info!(dir = ?self.config_dir, "Config hot-reload enabled");
        Ok(())
    }

    /// Stops watching. Safe to call any number of times, from any thread.
    /// Does not wait for an in-flight reload to finish.
    pub fn stop_watch(&self) {
        let handle = self.watch.lock().unwrap_or_else(|e| e.into_inner()).take();

        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(WatchSignal::Stop);
            drop(handle);
            info!(dir = ?self.config_dir, "Config hot-reload stopped");
        }
    }

    /// Returns true while a watcher is attached.
    pub fn is_watching(&self) -> bool {
        self.watch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Starts the watch loop over an externally fed event channel.
    #[cfg(test)]
    pub(crate) fn watch_with_source(
        self: &Arc<Self>,
        debounce: Duration,
    ) -> Sender<WatchSignal> {
        let (tx, rx) = mpsc::channel();
        self.spawn_watch_loop(rx, debounce)
            .expect("failed to spawn watch thread");
        *self.watch.lock().unwrap() = Some(WatchHandle {
            _watcher: None,
            stop_tx: tx.clone(),
        });
        tx
    }

    fn spawn_watch_loop(
        self: &Arc<Self>,
        rx: Receiver<WatchSignal>,
        debounce: Duration,
    ) -> std::io::Result<()> {
        let manager = Arc::downgrade(self);
        thread::Builder::new()
            .name("config-watch".to_string())
            .spawn(move || watch_loop(manager, rx, debounce))
            .map(|_| ())
    }
}

/// Outcome of waiting out a burst of events.
#[derive(Debug, PartialEq)]
enum Burst {
    Settled,
    Stopped,
}

/// Processes watch signals until stopped or the manager is dropped.
fn watch_loop(manager: Weak<ConfigManager>, rx: Receiver<WatchSignal>, debounce: Duration) {
    while let Ok(signal) = rx.recv() {
        match signal {
            WatchSignal::Stop => break,
            WatchSignal::Fs(Err(e)) => {
                warn!(error = %e, "Config watcher error");
            }
            WatchSignal::Fs(Ok(event)) => {
                if !is_reload_event(&event) {
                    trace!(kind = ?event.kind, paths = ?event.paths, "Ignoring config dir event");
                    continue;
                }

                debug!(paths = ?event.paths, "Config file changed");
                if wait_for_quiet(&rx, debounce) == Burst::Stopped {
                    break;
                }

                let Some(manager) = manager.upgrade() else {
                    break;
                };
                match manager.reload() {
                    Ok(()) => info!(generation = manager.generation(), "Configuration reloaded"),
                    Err(e) => error!(error = %e, "Configuration reload failed, keeping current config"),
                }
            }
        }
    }

    debug!("Config watch loop exited");
}

/// Absorbs events until no reload event arrives for `debounce`. Other
/// events are dropped without extending the window.
fn wait_for_quiet(rx: &Receiver<WatchSignal>, debounce: Duration) -> Burst {
    let mut deadline = Instant::now() + debounce;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(WatchSignal::Stop) | Err(RecvTimeoutError::Disconnected) => return Burst::Stopped,
            Ok(WatchSignal::Fs(Err(e))) => warn!(error = %e, "Config watcher error"),
            Ok(WatchSignal::Fs(Ok(event))) => {
                if is_reload_event(&event) {
                    deadline = Instant::now() + debounce;
                }
            }
            Err(RecvTimeoutError::Timeout) => return Burst::Settled,
        }
    }
}

/// Creates and content writes of YAML files trigger a reload. A rename
/// onto a YAML name counts as a create. Removals, renames away and
/// metadata changes are ignored.
fn is_reload_event(event: &Event) -> bool {
    let kind = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
    );
    kind && event.paths.iter().any(|p| is_yaml_file(p))
}
