// Dependency registry used to instantiate class-based collaborators

use crate::Error;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Marker trait for values the container can hold
pub trait Provider: Any + Send + Sync {}

impl<T: Any + Send + Sync> Provider for T {}

/// The dependency registry.
///
/// The pipeline only uses it as an opaque `make`-style capability: middleware
/// and exception-handler factories receive `&Container` at commit time and
/// pull whatever collaborators they were built with. It is never consulted on
/// the hot request path.
#[derive(Clone, Default)]
pub struct Container {
    providers: Arc<RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new dependency registry");
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a provider instance
    pub fn register<T: Provider>(&self, instance: T) {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Registering provider");
        self.providers
            .write()
            .insert(TypeId::of::<T>(), Arc::new(instance));

        debug!(provider = type_name, "Provider registered");
    }

    /// Register a provider built by a factory function
    pub fn register_factory<T: Provider, F>(&self, factory: F)
    where
        F: FnOnce() -> T,
    {
        let type_name = std::any::type_name::<T>();
        debug!(provider = type_name, "Creating provider from factory");

        self.register(factory());
    }

    /// Resolve a provider by type
    pub fn resolve<T: Provider>(&self) -> Result<Arc<T>, Error> {
        let type_name = std::any::type_name::<T>();

        trace!(provider = type_name, "Resolving provider");
        self.providers
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|any| any.clone().downcast::<T>().ok())
            .ok_or_else(|| Error::ProviderNotFound(type_name.to_string()))
    }

    /// Check if a provider is registered
    pub fn has<T: Provider>(&self) -> bool {
        self.providers.read().contains_key(&TypeId::of::<T>())
    }
}
