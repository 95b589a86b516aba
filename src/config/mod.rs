//! Multi-file YAML configuration with namespace caching and hot reload.

pub mod callbacks;
pub mod hot_reload;
pub mod loader;
pub mod namespace;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, RwLock, RwLockReadGuard};

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::memo::MemoCache;
use callbacks::ReloadCallbacks;
use hot_reload::WatchHandle;

pub use callbacks::ReloadCallback;
pub use loader::ConfigTree;
pub use namespace::Namespace;

/// One loaded generation of the configuration.
struct Snapshot {
    tree: ConfigTree,
    root: Arc<Namespace>,
    generation: u64,
}

impl Snapshot {
    fn new(tree: ConfigTree, generation: u64) -> Self {
        let root = Arc::new(Namespace::new("", generation, tree.to_value()));
        Self {
            tree,
            root,
            generation,
        }
    }
}

/// Loads a configuration directory and serves cached namespace handles.
///
/// Handles returned by [`ConfigManager::get`] are shared: repeated calls
/// for one name return the same `Arc` until the next reset. A reset swaps
/// the tree and empties the cache in one critical section.
pub struct ConfigManager {
    config_dir: PathBuf,
    // Lock order: `snapshot` before the namespace cache's own lock.
    snapshot: RwLock<Snapshot>,
    namespaces: MemoCache<String, Namespace>,
    reload_lock: Mutex<()>,
    callbacks: ReloadCallbacks,
    watch: Mutex<Option<WatchHandle>>,
}

impl ConfigManager {
    /// Creates a manager and performs the initial load of `config_dir`.
    pub fn new(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let tree = loader::load_all(&config_dir)?;

        info!(dir = ?config_dir, namespaces = ?tree.names(), "Configuration loaded");

        Ok(Self {
            config_dir,
            snapshot: RwLock::new(Snapshot::new(tree, 1)),
            namespaces: MemoCache::new(),
            reload_lock: Mutex::new(()),
            callbacks: ReloadCallbacks::default(),
            watch: Mutex::new(None),
        })
    }

    /// Like [`ConfigManager::new`], but panics on failure.
    pub fn must_new(config_dir: impl AsRef<Path>) -> Self {
        match Self::new(config_dir) {
            Ok(manager) => manager,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the handle for a namespace, creating and caching it on first
    /// access. Names are case-insensitive.
    pub fn get(&self, name: &str) -> Result<Arc<Namespace>, ConfigError> {
        let name = loader::normalize_name(name);
        let name = name.as_str();
        let snapshot = self.read_snapshot();

        self.namespaces.get_or_try_init(name, || {
            let value = snapshot.tree.get(name).ok_or_else(|| ConfigError::NotFound {
                name: name.to_string(),
            })?;
            debug!(namespace = name, generation = snapshot.generation, "Caching config namespace");
            Ok(Namespace::new(name, snapshot.generation, value.clone()))
        })
    }

    /// Like [`ConfigManager::get`], but panics if the namespace is missing.
    pub fn must_get(&self, name: &str) -> Arc<Namespace> {
        match self.get(name) {
            Ok(namespace) => namespace,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns a handle over the whole merged tree.
    pub fn root(&self) -> Arc<Namespace> {
        Arc::clone(&self.read_snapshot().root)
    }

    /// Returns the names of the namespaces currently cached, sorted.
    pub fn list(&self) -> Vec<String> {
        self.namespaces.keys()
    }

    /// Returns every namespace name in the loaded tree, sorted.
    pub fn all_names(&self) -> Vec<String> {
        self.read_snapshot().tree.names()
    }

    /// Returns the file a namespace was loaded from.
    pub fn source_of(&self, name: &str) -> Option<PathBuf> {
        self.read_snapshot().tree.source(name).map(Path::to_path_buf)
    }

    /// Returns the configuration directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the current generation. It starts at 1 and increases on every
    /// successful reset.
    pub fn generation(&self) -> u64 {
        self.read_snapshot().generation
    }

    /// Returns true if the handle was built from the current generation.
    pub fn is_current(&self, namespace: &Namespace) -> bool {
        namespace.generation() == self.generation()
    }

    /// Reloads the directory and replaces the tree, discarding every cached
    /// handle. On failure the current tree is kept.
    pub fn reset(&self) -> Result<(), ConfigError> {
        let _serial = self.reload_lock.lock().unwrap_or_else(|e| e.into_inner());

        let tree = loader::load_all(&self.config_dir)?;

        let mut snapshot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let generation = snapshot.generation + 1;
        *snapshot = Snapshot::new(tree, generation);
        let dropped = self.namespaces.clear();
        drop(snapshot);

        info!(
            dir = ?self.config_dir,
            generation,
            evicted = dropped.len(),
            "Configuration reset"
        );
        Ok(())
    }

    /// Resets the configuration, then runs the reload callbacks.
    pub fn reload(&self) -> Result<(), ConfigError> {
        self.reset()?;
        self.callbacks.notify(self);
        Ok(())
    }

    /// Registers a callback run after every successful reload.
    pub fn on_reload<F>(&self, callback: F)
    where
        F: Fn(&ConfigManager) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.register(Arc::new(callback));
    }

    /// Returns the number of registered reload callbacks.
    pub fn reload_callback_count(&self) -> usize {
        self.callbacks.len()
    }

    fn read_snapshot(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConfigManager {
    fn drop(&mut self) {
        self.stop_watch();
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("config_dir", &self.config_dir)
            .field("generation", &self.generation())
            .field("cached", &self.list())
            .field("watching", &self.is_watching())
            .finish()
    }
}

static DEFAULT_MANAGER: OnceLock<Arc<ConfigManager>> = OnceLock::new();
static DEFAULT_INIT: Mutex<()> = Mutex::new(());

/// Initializes the process-wide default manager.
///
/// Only the first successful call loads `config_dir`; later calls return the
/// existing manager whatever directory they name.
pub fn init(config_dir: impl AsRef<Path>) -> Result<Arc<ConfigManager>, ConfigError> {
    if let Some(manager) = DEFAULT_MANAGER.get() {
        return Ok(Arc::clone(manager));
    }

    let _guard = DEFAULT_INIT.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(manager) = DEFAULT_MANAGER.get() {
        return Ok(Arc::clone(manager));
    }

    let manager = Arc::new(ConfigManager::new(config_dir)?);
    Ok(Arc::clone(DEFAULT_MANAGER.get_or_init(|| manager)))
}

/// Like [`init`], but panics on failure.
pub fn must_init(config_dir: impl AsRef<Path>) -> Arc<ConfigManager> {
    match init(config_dir) {
        Ok(manager) => manager,
        Err(e) => panic!("{e}"),
    }
}

/// Returns the default manager, or `NotInitialized` before [`init`].
pub fn try_default() -> Result<Arc<ConfigManager>, ConfigError> {
    DEFAULT_MANAGER
        .get()
        .cloned()
        .ok_or(ConfigError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use tempfile::TempDir;

    fn config_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("app.yaml"),
            "service:\n  name: initial\n  port: 8080\ndatabase:\n  host: localhost\n",
        )
        .unwrap();
        fs::write(dir.path().join("cache.yml"), "cache:\n  ttl: 30s\n").unwrap();
        dir
    }

    #[test]
    fn test_get_returns_same_handle() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let first = manager.get("service").unwrap();
        let second = manager.get("service").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.get_str("name"), Some("initial"));
        assert_eq!(first.generation(), 1);
    }

    #[test]
    fn test_concurrent_get_shares_one_handle() {
        let dir = config_dir();
        let manager = Arc::new(ConfigManager::new(dir.path()).unwrap());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager.get("database").unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(manager.list(), vec!["database"]);
    }

    #[test]
    fn test_get_missing_namespace() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let err = manager.get("nonexistent").unwrap_err();
        assert!(err.is_not_found());
        assert!(manager.list().is_empty());
    }

    #[test]
    #[should_panic(expected = "nonexistent")]
    fn test_must_get_panics_on_missing_namespace() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();
        manager.must_get("nonexistent");
    }

    #[test]
    #[should_panic(expected = "Failed to read config directory")]
    fn test_must_new_panics_on_missing_directory() {
        let dir = TempDir::new().unwrap();
        ConfigManager::must_new(dir.path().join("nope"));
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let upper = manager.get("Database").unwrap();
        let lower = manager.get("database").unwrap();

        assert!(Arc::ptr_eq(&upper, &lower));
        assert_eq!(upper.name(), "database");
        assert_eq!(manager.list(), vec!["database"]);
        assert!(manager.source_of("DATABASE").is_some());
    }

    #[test]
    fn test_list_and_all_names() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        manager.get("database").unwrap();

        assert_eq!(manager.list(), vec!["database"]);
        assert_eq!(manager.all_names(), vec!["cache", "database", "service"]);
    }

    #[test]
    fn test_root_spans_namespaces() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let root = manager.root();
        assert_eq!(root.name(), "");
        assert_eq!(root.get_str("database.host"), Some("localhost"));
        assert_eq!(root.get_i64("service.port"), Some(8080));
        assert!(manager.list().is_empty());
    }

    #[test]
    fn test_reset_clears_cache_and_picks_up_changes() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();

        let before = manager.get("service").unwrap();
        fs::write(dir.path().join("app.yaml"), "service:\n  name: modified\n").unwrap();

        manager.reset().unwrap();
        assert!(manager.list().is_empty());
        assert_eq!(manager.generation(), 2);
        assert!(!manager.is_current(&before));

        let after = manager.get("service").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.get_str("name"), Some("modified"));
        assert!(manager.get("database").unwrap_err().is_not_found());
    }

    #[test]
    fn test_failed_reset_keeps_previous_state() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();
        let cached = manager.get("service").unwrap();

        fs::write(dir.path().join("dup.yaml"), "service:\n  name: clash\n").unwrap();

        assert!(manager.reset().unwrap_err().is_duplicate_key());
        assert_eq!(manager.generation(), 1);
        assert!(Arc::ptr_eq(&cached, &manager.get("service").unwrap()));
    }

    #[test]
    fn test_reload_runs_callbacks_in_order() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let order = Arc::clone(&order);
            manager.on_reload(move |m| {
                order.lock().unwrap().push((id, m.generation()));
                if id == 1 {
                    anyhow::bail!("callback {id} failed");
                }
                Ok(())
            });
        }

        manager.reload().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![(0, 2), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_callback_registered_during_reload_runs_next_time() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();
        let late_calls = Arc::new(AtomicUsize::new(0));

        let late = Arc::clone(&late_calls);
        manager.on_reload(move |m| {
            let late = Arc::clone(&late);
            m.on_reload(move |_| {
                late.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        manager.reload().unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        assert_eq!(manager.reload_callback_count(), 2);

        manager.reload().unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_reload_skips_callbacks() {
        let dir = config_dir();
        let manager = ConfigManager::new(dir.path()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        manager.on_reload(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        fs::write(dir.path().join("broken.yaml"), "x: [").unwrap();
        assert!(manager.reload().unwrap_err().is_file_read());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(dir.path()).unwrap();

        assert!(manager.all_names().is_empty());
        assert!(manager.get("anything").unwrap_err().is_not_found());
    }

    #[test]
    fn test_new_fails_on_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = ConfigManager::new(dir.path().join("nope")).unwrap_err();
        assert!(err.is_directory_read());
    }

    #[test]
    fn test_default_manager_initializes_once() {
        let first = TempDir::new().unwrap();
        fs::write(first.path().join("a.yaml"), "first:\n  x: 1\n").unwrap();
        let second = config_dir();

        let a = init(first.path()).unwrap();
        let b = init(second.path()).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &try_default().unwrap()));
        assert_eq!(b.all_names(), vec!["first"]);
    }
}
