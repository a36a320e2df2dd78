//! Service/provider registry.
//!
//! One process-wide `Registry` indexes every registered service, its
//! providers, and its methods. Tests that need isolation from each other
//! push a fresh registry with [`RegistryScope::push`] and let it drop at
//! the end of the scope — a real LIFO stack, not a thread-local context
//! manager, so pushes and pops nest predictably even across `.await`
//! points.

use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

use dashmap::DashMap;
use std::sync::Arc;

use crate::descriptor::{MethodDescriptor, ProviderDescriptor, ServiceDescriptor, ServiceKey};
use crate::error::GatewayError;

/// A fully registered service: its descriptor, its method table, and the
/// providers it was registered with, in declaration order.
pub struct RegisteredService {
    pub descriptor: ServiceDescriptor,
    pub methods: Vec<MethodDescriptor>,
    pub providers: Vec<ProviderDescriptor>,
}

impl RegisteredService {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Per-service mutable sub-storages, namespaced by strategy. `RoundRobin`
/// stores its call counters under namespace `round_robin_calls`; other
/// strategies may claim their own namespace without colliding.
#[derive(Default)]
pub struct ServiceLocals {
    namespaces: DashMap<String, Arc<DashMap<String, u64>>>,
}

impl ServiceLocals {
    pub fn namespace(&self, name: &str) -> Arc<DashMap<String, u64>> {
        self.namespaces.entry(name.to_string()).or_insert_with(|| Arc::new(DashMap::new())).clone()
    }
}

#[derive(Default)]
pub struct Registry {
    services: DashMap<ServiceKey, Arc<RegisteredService>>,
    order: Mutex<Vec<ServiceKey>>,
    locals: DashMap<ServiceKey, Arc<ServiceLocals>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejected if `(name, version)` is already registered.
    pub fn register(&self, service: RegisteredService) -> Result<(), GatewayError> {
        let key = service.descriptor.key();
        if self.services.contains_key(&key) {
            return Err(GatewayError::ConfigurationError {
                message: format!("service `{}` v{} is already registered", key.name, key.version),
            });
        }
        self.services.insert(key.clone(), Arc::new(service));
        self.order.lock().expect("registry order lock poisoned").push(key.clone());
        self.locals.insert(key, Arc::new(ServiceLocals::default()));
        Ok(())
    }

    pub fn get_service(&self, name: &str, version: u32) -> Option<Arc<RegisteredService>> {
        self.services.get(&ServiceKey::new(name, version)).map(|entry| entry.clone())
    }

    /// Insertion order, as required by `get_services()`.
    pub fn get_services(&self) -> Vec<Arc<RegisteredService>> {
        self.order
            .lock()
            .expect("registry order lock poisoned")
            .iter()
            .filter_map(|key| self.services.get(key).map(|e| e.clone()))
            .collect()
    }

    /// Providers advertising a superset of `required`, in declaration order.
    /// Empty if the service itself is unknown or no provider qualifies.
    pub fn get_providers(&self, name: &str, version: u32, required: &[&str]) -> Vec<ProviderDescriptor> {
        let Some(service) = self.get_service(name, version) else { return Vec::new() };
        service.providers.iter().filter(|p| p.supports_all(required)).cloned().collect()
    }

    pub fn locals(&self, name: &str, version: u32) -> Option<Arc<ServiceLocals>> {
        self.locals.get(&ServiceKey::new(name, version)).map(|e| e.clone())
    }

    pub fn required_methods_union(&self, _name: &str, _version: u32) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

static STACK: OnceLock<Mutex<Vec<Arc<Registry>>>> = OnceLock::new();
static DEFAULT: OnceLock<Arc<Registry>> = OnceLock::new();

fn stack() -> &'static Mutex<Vec<Arc<Registry>>> {
    STACK.get_or_init(|| Mutex::new(Vec::new()))
}

/// The active registry: the top of the override stack, or the process-wide
/// default if the stack is empty.
pub fn current() -> Arc<Registry> {
    let guard = stack().lock().expect("registry stack lock poisoned");
    guard
        .last()
        .cloned()
        .unwrap_or_else(|| DEFAULT.get_or_init(|| Arc::new(Registry::new())).clone())
}

/// A pushed override. Dropping it pops the registry it pushed — but only if
/// it is still the top of the stack; an out-of-order drop (scopes dropped
/// in the wrong order) leaves the stack untouched and logs instead of
/// silently popping someone else's registry.
pub struct RegistryScope {
    registry: Arc<Registry>,
}

impl RegistryScope {
    pub fn push(registry: Arc<Registry>) -> Self {
        stack().lock().expect("registry stack lock poisoned").push(registry.clone());
        Self { registry }
    }

    pub fn push_fresh() -> Self {
        Self::push(Arc::new(Registry::new()))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Drop for RegistryScope {
    fn drop(&mut self) {
        let mut guard = stack().lock().expect("registry stack lock poisoned");
        match guard.last() {
            Some(top) if Arc::ptr_eq(top, &self.registry) => {
                guard.pop();
            }
            _ => {
                tracing::error!("registry scope dropped out of LIFO order; stack left untouched");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, version: u32) -> RegisteredService {
        RegisteredService {
            descriptor: ServiceDescriptor::new(name, version, name),
            methods: vec![MethodDescriptor::new("send", "POST", false)],
            providers: vec![
                ProviderDescriptor::new("a", ["send_email"]),
                ProviderDescriptor::new("b", ["send_email", "send_bulk"]),
            ],
        }
    }

    #[test]
    fn duplicate_name_and_version_is_rejected_distinct_version_succeeds() {
        let registry = Registry::new();
        registry.register(service("email", 1)).unwrap();
        assert!(registry.register(service("email", 1)).is_err());
        assert!(registry.register(service("email", 2)).is_ok());
    }

    #[test]
    fn get_providers_returns_superset_in_declaration_order() {
        let registry = Registry::new();
        registry.register(service("email", 1)).unwrap();
        let providers = registry.get_providers("email", 1, &["send_email"]);
        assert_eq!(providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let providers = registry.get_providers("email", 1, &["send_email", "send_bulk"]);
        assert_eq!(providers.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(), vec!["b"]);

        let providers = registry.get_providers("email", 1, &["send_fax"]);
        assert!(providers.is_empty());
    }

    #[test]
    fn get_services_preserves_insertion_order() {
        let registry = Registry::new();
        registry.register(service("sms", 1)).unwrap();
        registry.register(service("email", 1)).unwrap();
        let names: Vec<_> = registry.get_services().iter().map(|s| s.descriptor.name.clone()).collect();
        assert_eq!(names, vec!["sms", "email"]);
    }

    #[test]
    fn scope_push_pop_is_lifo_and_isolates_registries() {
        let outer = RegistryScope::push_fresh();
        outer.registry().register(service("email", 1)).unwrap();
        assert!(current().get_service("email", 1).is_some());

        {
            let inner = RegistryScope::push_fresh();
            assert!(current().get_service("email", 1).is_none());
            inner.registry().register(service("sms", 1)).unwrap();
            assert!(current().get_service("sms", 1).is_some());
        }

        assert!(current().get_service("email", 1).is_some());
        assert!(current().get_service("sms", 1).is_none());
    }

    #[test]
    fn locals_namespace_is_shared_across_lookups() {
        let registry = Registry::new();
        registry.register(service("email", 1)).unwrap();
        let locals = registry.locals("email", 1).unwrap();
        locals.namespace("round_robin_calls").insert("a".into(), 1);
        let locals_again = registry.locals("email", 1).unwrap();
        assert_eq!(*locals_again.namespace("round_robin_calls").get("a").unwrap(), 1);
    }
}
