//! Ordered service registry.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::service::{Runner, Service};
use crate::error::KernelError;

#[derive(Clone)]
struct Entry {
    service: Arc<dyn Service>,
    runner: Option<Arc<dyn Runner>>,
    any: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// Holds services by name and remembers the order they were bound in.
///
/// Binding a name that already exists replaces the service but keeps its
/// original position.
#[derive(Default)]
pub struct Container {
    inner: RwLock<Inner>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a service under `name`.
    pub fn bind<S: Service + 'static>(&self, name: impl Into<String>, service: Arc<S>) {
        let entry = Entry {
            service: service.clone(),
            runner: None,
            any: service,
        };
        self.insert(name.into(), entry);
    }

    /// Binds a long-running service under `name`.
    pub fn bind_runner<R: Runner + 'static>(&self, name: impl Into<String>, runner: Arc<R>) {
        let entry = Entry {
            service: runner.clone(),
            runner: Some(runner.clone()),
            any: runner,
        };
        self.insert(name.into(), entry);
    }

    /// Returns the service bound to `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Service>, KernelError> {
        self.entry(name).map(|e| e.service)
    }

    /// Like [`Container::get`], but panics if the name is unbound.
    pub fn must_get(&self, name: &str) -> Arc<dyn Service> {
        match self.get(name) {
            Ok(service) => service,
            Err(e) => panic!("{e}"),
        }
    }

    /// Returns the service bound to `name` as its concrete type.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, KernelError> {
        let entry = self.entry(name)?;
        entry
            .any
            .downcast::<T>()
            .map_err(|_| KernelError::ServiceType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns every service in bind order.
    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        self.ordered().into_iter().map(|e| e.service).collect()
    }

    /// Returns the long-running services in bind order, with their names.
    pub fn runners(&self) -> Vec<(String, Arc<dyn Runner>)> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| {
                let runner = inner.entries.get(name)?.runner.clone()?;
                Some((name.clone(), runner))
            })
            .collect()
    }

    /// Returns every bound name in bind order.
    pub fn names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().order.is_empty()
    }

    fn insert(&self, name: String, entry: Entry) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.entries.insert(name.clone(), entry).is_none() {
            inner.order.push(name);
        }
    }

    fn entry(&self, name: &str) -> Result<Entry, KernelError> {
        self.read()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| KernelError::ServiceNotFound {
                name: name.to_string(),
            })
    }

    fn ordered(&self) -> Vec<Entry> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name).cloned())
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container").field("services", &self.names()).finish()
    }
}
