//! Ties a registered service's descriptor to its concrete implementation.
//!
//! `Registry` only knows descriptors; the actual `ServiceMethods` impl and
//! its providers are supplied by whoever builds the service (normally
//! `sgateway-services`) and handed to a `Dispatcher` here.

use std::collections::HashMap;
use std::sync::Arc;

use sgateway_core::descriptor::ServiceKey;
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::provider::Provider;
use sgateway_core::registry::Registry;
use sgateway_core::service::{ServiceBase, ServiceContext, ServiceMethods};
use sgateway_core::strategy::SelectionStrategy;

/// Everything needed to invoke one registered service: its method
/// dispatcher, its concrete providers keyed by name, and the strategy used
/// to pick one when the caller doesn't name one explicitly.
pub struct ServiceInstance {
    pub methods: Arc<dyn ServiceMethods>,
    pub providers: HashMap<String, Provider>,
    pub strategy: Arc<dyn SelectionStrategy>,
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    instances: HashMap<ServiceKey, ServiceInstance>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry, instances: HashMap::new() }
    }

    pub fn add_instance(&mut self, key: ServiceKey, instance: ServiceInstance) {
        self.instances.insert(key, instance);
    }

    /// Builds a [`ServiceContext`] for the registered service and hands
    /// control to its `ServiceMethods` impl — provider acquisition
    /// (single-shot or failover) is the service's own decision, not the
    /// dispatcher's.
    pub async fn dispatch(&self, envelope: &mut Envelope) -> Result<GatewayResponse, GatewayError> {
        let key = envelope.service.key();
        let registered = self
            .registry
            .get_service(&key.name, key.version)
            .ok_or_else(|| GatewayError::ServiceNotFound { message: format!("no such service `{}` v{}", key.name, key.version) })?;
        let instance = self
            .instances
            .get(&key)
            .ok_or_else(|| GatewayError::ServiceNotFound { message: format!("service `{}` v{} has no implementation wired", key.name, key.version) })?;

        let base = ServiceBase::new(&self.registry, registered);
        let method_name = envelope.method.name.clone();
        let ctx = ServiceContext { base, providers: &instance.providers, strategy: instance.strategy.as_ref() };

        instance.methods.call_method(&method_name, envelope, ctx).await
    }
}
