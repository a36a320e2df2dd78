//! Wires a [`GatewaySettings`] into a running [`AppState`]: registers the
//! reference service bundles, builds the fixed middleware pipeline, and
//! hands back the one struct both the HTTP router and the MQ adapter share.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sgateway_cache::{CacheMiddleware, CacheStore};
use sgateway_core::config::GatewaySettings;
use sgateway_core::error::ErrorMode;
use sgateway_core::pipeline::{Middleware, Pipeline};
use sgateway_core::registry::Registry;
use sgateway_data::IdempotencyStore;
use sgateway_events::{BillingMiddleware, LoggerMiddleware, MessageBus, StartTimeMiddleware};
use sgateway_http::dispatch::{Dispatcher, ServiceInstance};
use sgateway_http::AppState;
use sgateway_ratelimit::{Quota, RateLimitBackend, RateLimitMiddleware};
use sgateway_services::ServiceBundle;

/// Everything [`build_app_state`] needs that can't be constructed from
/// `GatewaySettings` alone — the concrete backends, each already connected.
pub struct BootstrapInputs {
    pub vendor_config: HashMap<String, String>,
    pub idempotency_store: Arc<dyn IdempotencyStore>,
    pub cache_store: Arc<dyn CacheStore>,
    pub rate_limit_backend: Arc<dyn RateLimitBackend>,
    /// `None` when no AMQP broker is configured; the domain-registration
    /// bundle still needs *some* bus, so callers without AMQP should pass
    /// `Arc::new(LocalBus::new())` here rather than `None` — this field
    /// models the ambient logging/publish backend, not the domains bundle's
    /// hard dependency.
    pub bus: Option<Arc<dyn MessageBus>>,
    pub domains_bus: Arc<dyn MessageBus>,
}

pub struct Bootstrapped {
    pub state: Arc<AppState>,
}

fn service_enabled(settings: &GatewaySettings, name: &str) -> bool {
    settings.installed_services.is_empty() || settings.installed_services.iter().any(|s| s == name)
}

fn flatten_price_list(price_list: &HashMap<String, HashMap<String, f64>>) -> HashMap<(String, String), f64> {
    let mut flat = HashMap::new();
    for (service, methods) in price_list {
        for (method, price) in methods {
            flat.insert((service.clone(), method.clone()), *price);
        }
    }
    flat
}

fn per_service_quotas(settings: &GatewaySettings) -> HashMap<String, Quota> {
    settings
        .per_service_quota_per_hour
        .iter()
        .map(|(service, limit)| (service.clone(), Quota::new((*limit).max(0) as u64, Duration::from_secs(3600))))
        .collect()
}

fn register_bundle(registry: &Registry, dispatcher: &mut Dispatcher, bundle: ServiceBundle) {
    let key = bundle.registered.descriptor.key();
    registry.register(bundle.registered).expect("service bundle registers exactly once at startup");
    dispatcher.add_instance(key, ServiceInstance { methods: bundle.methods, providers: bundle.providers, strategy: bundle.strategy });
}

pub fn build_app_state(settings: &GatewaySettings, inputs: BootstrapInputs) -> Bootstrapped {
    let registry = Arc::new(Registry::new());
    let mut dispatcher = Dispatcher::new(registry.clone());

    if service_enabled(settings, "email") {
        register_bundle(&registry, &mut dispatcher, sgateway_services::email::bundle(inputs.vendor_config.clone()));
    }
    if service_enabled(settings, "sms") {
        register_bundle(&registry, &mut dispatcher, sgateway_services::sms::bundle(inputs.vendor_config.clone()));
    }
    if service_enabled(settings, "currency_exchange") {
        register_bundle(&registry, &mut dispatcher, sgateway_services::currency_exchange::bundle(inputs.vendor_config.clone()));
    }
    if service_enabled(settings, "domains") {
        register_bundle(&registry, &mut dispatcher, sgateway_services::domains::bundle(inputs.vendor_config, inputs.domains_bus));
    }

    // Fixed order, matching the original's `SERVICES_PIPELINE_MIDDLEWARES`
    // default — see the workspace `DESIGN.md` for why this isn't resolved
    // dynamically from the config-listed class paths.
    let middlewares: Vec<Arc<dyn Middleware>> = vec![
        Arc::new(StartTimeMiddleware),
        Arc::new(sgateway_auth::AuthMiddleware::new(settings.internal_gateway_key.as_bytes(), settings.is_local)),
        Arc::new(sgateway_data::IdempotencyMiddleware::new(inputs.idempotency_store, Duration::from_secs(settings.idempotency_ttl_seconds.max(0) as u64))),
        Arc::new(RateLimitMiddleware::new(
            inputs.rate_limit_backend,
            Quota::new(settings.total_quota_per_hour.max(0) as u64, Duration::from_secs(3600)),
            per_service_quotas(settings),
        )),
        Arc::new(BillingMiddleware::new(flatten_price_list(&settings.price_list))),
        Arc::new(CacheMiddleware::new(inputs.cache_store)),
        Arc::new(LoggerMiddleware::new(if settings.service_mq_logging { inputs.bus } else { None })),
    ];

    let state = Arc::new(AppState {
        registry,
        pipeline: Pipeline::new(middlewares),
        dispatcher,
        error_mode: if settings.is_local { ErrorMode::Debug } else { ErrorMode::Production },
    });

    Bootstrapped { state }
}
