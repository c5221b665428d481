//! Registry of instantiated dialects and gadgets.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::{KernelError, KernelResult};

/// Type-erased component produced by a dialect or gadget constructor.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wraps a concrete value as an [`Instance`].
#[must_use]
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// Name-keyed store of components; the dependency injection container.
#[derive(Default)]
pub struct Injector {
    inner: RwLock<BTreeMap<String, Instance>>,
}

impl std::fmt::Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injector")
            .field("registered", &self.names())
            .finish()
    }
}

impl Injector {
    /// Creates an empty injector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::DuplicateComponent`] if the name is taken.
    pub fn register(&self, name: impl Into<String>, component: Instance) -> KernelResult<()> {
        let name = name.into();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.contains_key(&name) {
            return Err(KernelError::DuplicateComponent { name });
        }
        debug!(component = %name, "component registered");
        inner.insert(name, component);
        Ok(())
    }

    /// Returns the component registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Instance> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.get(name).cloned()
    }

    /// Returns the component under `name` if it has type `T`.
    #[must_use]
    pub fn lookup<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.downcast::<T>().ok()
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.contains_key(name)
    }

    /// Lists registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.keys().cloned().collect()
    }

    /// Returns the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
