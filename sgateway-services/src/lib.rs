//! Reference service implementations exercised by the gateway's own test
//! fixtures: `email`, `sms`, `currency_exchange`, `domains`. Each module
//! exposes a `bundle(..)` constructor returning everything a facade needs
//! to register the service and wire a [`sgateway_http::ServiceInstance`]
//! for it (kept crate-agnostic of `sgateway-http` itself, since that
//! crate, not this one, owns the HTTP-adapter type).

use std::collections::HashMap;
use std::sync::Arc;

use sgateway_core::provider::Provider;
use sgateway_core::registry::RegisteredService;
use sgateway_core::service::ServiceMethods;
use sgateway_core::strategy::SelectionStrategy;

pub mod currency_exchange;
pub mod domains;
pub mod email;
pub mod sms;

/// Everything needed to register a service and drive it from a dispatcher:
/// its descriptor/method/provider table, its `ServiceMethods` impl, the
/// concrete `Provider`s keyed by name, and the default selection strategy.
pub struct ServiceBundle {
    pub registered: RegisteredService,
    pub methods: Arc<dyn ServiceMethods>,
    pub providers: HashMap<String, Provider>,
    pub strategy: Arc<dyn SelectionStrategy>,
}
