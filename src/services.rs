//! Request-lifetime service registry.
//!
//! Services are keyed by their type. Trait objects are registered by their
//! `Arc<dyn Trait>` form, so `register::<Arc<dyn PropertyResolver>>` stores
//! the resolver and `try_get::<Arc<dyn PropertyResolver>>` finds it again.

use crate::errors::{ApplyError, Result};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct ServiceScope {
    services: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for ServiceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceScope")
            .field("services", &self.services.read().len())
            .finish()
    }
}

impl ServiceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service`, replacing any earlier registration of `T`.
    pub fn register<T: Send + Sync + 'static>(&self, service: T) {
        debug!(service = std::any::type_name::<T>(), "registering service");
        self.services
            .write()
            .insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Registers an already shared instance.
    pub fn register_shared<T: Send + Sync + 'static>(&self, service: Arc<T>) {
        debug!(service = std::any::type_name::<T>(), "registering shared service");
        self.services.write().insert(TypeId::of::<T>(), service);
    }

    pub fn remove<T: Send + Sync + 'static>(&self) -> bool {
        self.services.write().remove(&TypeId::of::<T>()).is_some()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.read().contains_key(&TypeId::of::<T>())
    }

    pub fn try_get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let services = self.services.read();
        services
            .get(&TypeId::of::<T>())
            .and_then(|s| s.clone().downcast::<T>().ok())
    }

    /// Like `try_get`, but a missing registration is a configuration error.
    pub fn get_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.try_get::<T>().ok_or(ApplyError::MissingRegistration {
            type_name: std::any::type_name::<T>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Answer(u32);

    #[test]
    fn lookup_by_type() {
        let scope = ServiceScope::new();
        assert!(scope.try_get::<Answer>().is_none());
        scope.register(Answer(42));
        assert_eq!(*scope.try_get::<Answer>().unwrap(), Answer(42));
        assert!(scope.contains::<Answer>());
    }

    #[test]
    fn shared_registration_returns_same_instance() {
        let scope = ServiceScope::new();
        let shared = Arc::new(Answer(7));
        scope.register_shared(shared.clone());
        assert!(Arc::ptr_eq(&shared, &scope.get_required::<Answer>().unwrap()));
    }

    #[test]
    fn required_lookup_names_the_missing_type() {
        let scope = ServiceScope::new();
        match scope.get_required::<Answer>() {
            Err(ApplyError::MissingRegistration { type_name }) => assert!(type_name.ends_with("Answer")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn remove_drops_registration() {
        let scope = ServiceScope::new();
        scope.register(Answer(1));
        assert!(scope.remove::<Answer>());
        assert!(!scope.remove::<Answer>());
        assert!(scope.try_get::<Answer>().is_none());
    }
}
