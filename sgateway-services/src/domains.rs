//! Domain registration: availability check, a registration-intention
//! workflow gated on tenant identity, and a DNS-update webhook that retries
//! with exponential backoff until the registrar reports the domain live.
//!
//! Unlike the other three services, state survives across calls (the
//! intention a tenant is walking through) and provider selection for
//! registration depends on a runtime fact — which registrar actually has
//! the domain available — rather than a fixed strategy, which is why
//! `create_registration_intention` probes providers directly instead of
//! going through `ServiceContext::get_single`.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};

use sgateway_core::descriptor::{MethodDescriptor, ProviderDescriptor, ServiceDescriptor};
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::provider::{Provider, ProviderOutcome, ProviderResult};
use sgateway_core::registry::RegisteredService;
use sgateway_core::service::{ServiceContext, ServiceMethods};
use sgateway_core::strategy::RoundRobin;
use sgateway_events::MessageBus;

use crate::ServiceBundle;

/// Flat per-zone registration price. A zone absent from this table is not
/// sold through this gateway at all.
fn zone_prices() -> HashMap<&'static str, f64> {
    HashMap::from([("com", 12.0), ("net", 14.0), ("org", 13.0)])
}

fn zone_of(domain: &str) -> Option<&str> {
    domain.rsplit('.').next().filter(|z| !z.is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntentionStatus {
    IntentionCreated,
    DataValidated,
    ProviderAccountReady,
    DomainPurchased,
    DnsScheduled,
    DnsUpdated,
}

impl IntentionStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::IntentionCreated => "intention_created",
            Self::DataValidated => "data_validated",
            Self::ProviderAccountReady => "provider_account_ready",
            Self::DomainPurchased => "domain_purchased",
            Self::DnsScheduled => "dns_scheduled",
            Self::DnsUpdated => "dns_updated",
        }
    }
}

struct Intention {
    entity_id: Value,
    domain: String,
    provider_name: String,
    status: IntentionStatus,
    finished: bool,
}

#[derive(Default)]
struct IntentionStore {
    next_id: AtomicU64,
    rows: DashMap<u64, Intention>,
}

impl IntentionStore {
    fn insert(&self, row: Intention) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.insert(id, row);
        id
    }
}

/// Exponential backoff parameters for the DNS-update retry loop. Exposed as
/// a field (rather than hardcoded constants) so tests can shrink the delay
/// without waiting on the production schedule.
#[derive(Clone, Copy, Debug)]
struct RetryConfig {
    attempts: u32,
    initial_delay: Duration,
    factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { attempts: 5, initial_delay: Duration::from_secs(2), factor: 2 }
    }
}

fn require_config(config: &HashMap<String, String>, key: &str) -> ProviderResult<String> {
    config
        .get(key)
        .cloned()
        .ok_or_else(|| ProviderOutcome::Domain(GatewayError::ConfigurationError { message: format!("missing required config key `{key}`") }))
}

fn mocked_provider() -> Provider {
    let dns_attempt = Arc::new(AtomicU64::new(0));
    Provider::new("_mocked_")
        .with_method("check_availability", |_args| Box::pin(async { Ok(json!({"available": true})) }))
        .with_method("purchase_domain", |args| {
            let args = args.clone();
            Box::pin(async move { Ok(json!({"purchased": true, "domain": args.get("domain")})) })
        })
        .with_method("setup_dns", move |_args| {
            let dns_attempt = dns_attempt.clone();
            Box::pin(async move {
                let attempt = dns_attempt.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"ready": attempt >= 2}))
            })
        })
}

fn godaddy_provider(config: HashMap<String, String>) -> Provider {
    let check_config = config.clone();
    let purchase_config = config.clone();
    Provider::new("godaddy")
        .with_method("check_availability", move |_args| {
            let config = check_config.clone();
            Box::pin(async move {
                require_config(&config, "GODADDY_API_KEY")?;
                Ok(json!({"available": true}))
            })
        })
        .with_method("purchase_domain", move |args| {
            let config = purchase_config.clone();
            let args = args.clone();
            Box::pin(async move {
                require_config(&config, "GODADDY_API_KEY")?;
                Ok(json!({"purchased": true, "domain": args.get("domain")}))
            })
        })
        .with_method("setup_dns", move |_args| {
            let config = config.clone();
            Box::pin(async move {
                require_config(&config, "GODADDY_API_KEY")?;
                Ok(json!({"ready": true}))
            })
        })
}

fn namecheap_provider(config: HashMap<String, String>) -> Provider {
    let check_config = config.clone();
    let purchase_config = config.clone();
    Provider::new("namecheap")
        .with_method("check_availability", move |_args| {
            let config = check_config.clone();
            Box::pin(async move {
                require_config(&config, "NAMECHEAP_API_KEY")?;
                Ok(json!({"available": true}))
            })
        })
        .with_method("purchase_domain", move |args| {
            let config = purchase_config.clone();
            let args = args.clone();
            Box::pin(async move {
                require_config(&config, "NAMECHEAP_API_KEY")?;
                Ok(json!({"purchased": true, "domain": args.get("domain")}))
            })
        })
        .with_method("setup_dns", move |_args| {
            let config = config.clone();
            Box::pin(async move {
                require_config(&config, "NAMECHEAP_API_KEY")?;
                Ok(json!({"ready": true}))
            })
        })
}

struct DomainsService {
    store: IntentionStore,
    bus: Arc<dyn MessageBus>,
    retry: RetryConfig,
}

impl DomainsService {
    /// Probes every provider advertising `check_availability` for `domain`
    /// and returns the cheapest one reporting it available, mirroring the
    /// core's own `DomainRegistrant` selection strategy but run inline
    /// since the provider map here is only borrowed for this call.
    async fn cheapest_available<'a>(&self, ctx: &ServiceContext<'a>, domain: &str, zone_price: f64) -> Result<Option<(String, f64)>, GatewayError> {
        let mut best: Option<(String, f64)> = None;
        for desc in ctx.base.registered.providers.iter().filter(|d| d.supports_all(&["check_availability"])) {
            let provider = ctx.provider(desc)?;
            let result = provider.call_method("check_availability", &json!({"domain": domain})).await?;
            let available = result.get("available").and_then(Value::as_bool).unwrap_or(false);
            if available && best.as_ref().map(|(_, price)| zone_price < *price).unwrap_or(true) {
                best = Some((desc.name.clone(), zone_price));
            }
        }
        Ok(best)
    }

    async fn check_availability(&self, envelope: &Envelope, ctx: &ServiceContext<'_>) -> Result<GatewayResponse, GatewayError> {
        let data = envelope.get_data();
        let domain = data.get("domain").and_then(Value::as_str).filter(|s| !s.is_empty()).ok_or_else(|| {
            GatewayError::bad_request_field("`domain` is required", "domain")
        })?;
        let Some(zone) = zone_of(domain) else {
            return Err(GatewayError::bad_request_field("`domain` has no recognizable zone", "domain"));
        };
        let Some(&price) = zone_prices().get(zone) else {
            return Ok(GatewayResponse::json(json!({"available": false, "reason": "zone not supported"})));
        };
        match self.cheapest_available(ctx, domain, price).await? {
            Some((provider, price)) => Ok(GatewayResponse::json(json!({"available": true, "provider": provider, "price": price}))),
            None => Ok(GatewayResponse::json(json!({"available": false}))),
        }
    }

    async fn create_registration_intention(&self, envelope: &mut Envelope, ctx: &ServiceContext<'_>) -> Result<GatewayResponse, GatewayError> {
        let entity_id = envelope
            .get_lazy_property("entity_id")
            .await
            .ok_or_else(|| GatewayError::Unauthenticated { message: "a registration intention requires an authenticated tenant".into() })?;

        let data = envelope.get_data();
        let domain = data.get("domain").and_then(Value::as_str).filter(|s| !s.is_empty()).ok_or_else(|| {
            GatewayError::bad_request_field("`domain` is required", "domain")
        })?;
        let zone = zone_of(domain).ok_or_else(|| GatewayError::bad_request_field("`domain` has no recognizable zone", "domain"))?;
        let price = *zone_prices()
            .get(zone)
            .ok_or_else(|| GatewayError::bad_request_field(format!("zone `.{zone}` is not sold through this gateway"), "domain"))?;

        let Some((provider_name, _price)) = self.cheapest_available(ctx, domain, price).await? else {
            return Err(GatewayError::bad_request("no registrar reports this domain as available; check availability first"));
        };

        let intention_id = self.store.insert(Intention {
            entity_id,
            domain: domain.to_string(),
            provider_name,
            status: IntentionStatus::IntentionCreated,
            finished: false,
        });

        Ok(GatewayResponse::json(json!({"intention_id": intention_id, "status": IntentionStatus::IntentionCreated.as_str()})).with_status(201))
    }

    fn owned_intention(&self, intention_id: u64, entity_id: &Value) -> Result<(), GatewayError> {
        let row = self.store.rows.get(&intention_id).ok_or_else(|| GatewayError::bad_request("no such registration intention"))?;
        if &row.entity_id != entity_id {
            return Err(GatewayError::ServiceRestricted { message: "this intention does not belong to the calling tenant".into() });
        }
        Ok(())
    }

    async fn submit_registration_intention(&self, envelope: &mut Envelope, ctx: &ServiceContext<'_>) -> Result<GatewayResponse, GatewayError> {
        let entity_id = envelope
            .get_lazy_property("entity_id")
            .await
            .ok_or_else(|| GatewayError::Unauthenticated { message: "submitting an intention requires an authenticated tenant".into() })?;

        let data = envelope.get_data();
        let intention_id = data
            .get("intention_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| GatewayError::bad_request_field("`intention_id` is required", "intention_id"))?;

        self.owned_intention(intention_id, &entity_id)?;

        if self.store.rows.get(&intention_id).map(|r| r.finished).unwrap_or(false) {
            return Ok(GatewayResponse::unfulfilled(json!({"intention_id": intention_id, "status": IntentionStatus::DnsScheduled.as_str()})).with_status(304));
        }

        let (provider_name, domain) = {
            let row = self.store.rows.get(&intention_id).expect("existence checked above");
            (row.provider_name.clone(), row.domain.clone())
        };

        // validate_data
        if let Some(mut row) = self.store.rows.get_mut(&intention_id) {
            row.status = IntentionStatus::DataValidated;
        }

        // collect_provider_account + purchase_domain, in one provider call
        let provider = ctx.get_single(envelope, &[], Some(&provider_name)).await?;
        provider.call_method("purchase_domain", &json!({"domain": domain})).await?;
        if let Some(mut row) = self.store.rows.get_mut(&intention_id) {
            row.status = IntentionStatus::ProviderAccountReady;
            row.status = IntentionStatus::DomainPurchased;
        }

        // schedule_dns_update: handed off to the bus rather than run inline
        self.bus
            .publish("sl.topic", "sgateway.service_call", json!({"service": "domains", "method": "update_registered_dns", "intention_id": intention_id}))
            .await
            .map_err(|err| GatewayError::Internal { message: format!("failed to schedule DNS update: {err}"), details: None })?;

        if let Some(mut row) = self.store.rows.get_mut(&intention_id) {
            row.status = IntentionStatus::DnsScheduled;
            row.finished = true;
        }

        Ok(GatewayResponse::json(json!({"intention_id": intention_id, "status": IntentionStatus::DnsScheduled.as_str()})).with_status(201))
    }

    async fn update_registered_dns(&self, envelope: &mut Envelope, ctx: &ServiceContext<'_>) -> Result<GatewayResponse, GatewayError> {
        let data = envelope.get_data();
        let intention_id = data
            .get("intention_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| GatewayError::bad_request_field("`intention_id` is required", "intention_id"))?;

        let (provider_name, domain) = self
            .store
            .rows
            .get(&intention_id)
            .map(|r| (r.provider_name.clone(), r.domain.clone()))
            .ok_or_else(|| GatewayError::bad_request("no such registration intention"))?;

        if self.store.rows.get(&intention_id).map(|r| r.status == IntentionStatus::DnsUpdated).unwrap_or(false) {
            return Ok(GatewayResponse::unfulfilled(json!({"intention_id": intention_id, "status": IntentionStatus::DnsUpdated.as_str()})).with_status(304));
        }

        let provider = ctx.get_single(envelope, &[], Some(&provider_name)).await?;

        let mut delay = self.retry.initial_delay;
        let mut ready = false;
        for attempt in 0..self.retry.attempts {
            let result = provider.call_method("setup_dns", &json!({"domain": domain})).await?;
            if result.get("ready").and_then(Value::as_bool).unwrap_or(false) {
                ready = true;
                break;
            }
            if attempt + 1 < self.retry.attempts {
                tokio::time::sleep(delay).await;
                delay *= self.retry.factor;
            }
        }

        if !ready {
            return Err(GatewayError::FailoverFail { message: "registrar never reported the domain's DNS as ready".into() });
        }

        if let Some(mut row) = self.store.rows.get_mut(&intention_id) {
            row.status = IntentionStatus::DnsUpdated;
        }

        Ok(GatewayResponse::json(json!({"intention_id": intention_id, "status": IntentionStatus::DnsUpdated.as_str()})))
    }
}

impl ServiceMethods for DomainsService {
    fn call_method<'a>(
        &'a self,
        method: &'a str,
        envelope: &'a mut Envelope,
        ctx: ServiceContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<GatewayResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            match method {
                "check_availability" => self.check_availability(envelope, &ctx).await,
                "create_registration_intention" => self.create_registration_intention(envelope, &ctx).await,
                "submit_registration_intention" => self.submit_registration_intention(envelope, &ctx).await,
                "update_registered_dns" => self.update_registered_dns(envelope, &ctx).await,
                other => Err(GatewayError::ConfigurationError { message: format!("domains has no method `{other}`") }),
            }
        })
    }
}

pub fn bundle(vendor_config: HashMap<String, String>, bus: Arc<dyn MessageBus>) -> ServiceBundle {
    bundle_with_retry(vendor_config, bus, RetryConfig::default())
}

fn bundle_with_retry(vendor_config: HashMap<String, String>, bus: Arc<dyn MessageBus>, retry: RetryConfig) -> ServiceBundle {
    let registered = RegisteredService {
        descriptor: ServiceDescriptor::new("domains", 1, "Domain registration service"),
        methods: vec![
            MethodDescriptor::new("check_availability", "GET", false),
            MethodDescriptor::new("create_registration_intention", "POST", false),
            MethodDescriptor::new("submit_registration_intention", "POST", false),
            MethodDescriptor::new("update_registered_dns", "POST", true),
        ],
        providers: vec![
            ProviderDescriptor::new("_mocked_", ["check_availability", "purchase_domain", "setup_dns"]),
            ProviderDescriptor::new("godaddy", ["check_availability", "purchase_domain", "setup_dns"]),
            ProviderDescriptor::new("namecheap", ["check_availability", "purchase_domain", "setup_dns"]),
        ],
    };

    let mut providers = HashMap::new();
    providers.insert("_mocked_".to_string(), mocked_provider());
    providers.insert("godaddy".to_string(), godaddy_provider(vendor_config.clone()));
    providers.insert("namecheap".to_string(), namecheap_provider(vendor_config));

    let methods = DomainsService { store: IntentionStore::default(), bus, retry };
    ServiceBundle { registered, methods: Arc::new(methods), providers, strategy: Arc::new(RoundRobin) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgateway_core::envelope::{LazyProperty, TransportRequest};
    use sgateway_core::registry::Registry;
    use sgateway_core::service::ServiceBase;
    use sgateway_events::LocalBus;
    use std::collections::HashMap as StdHashMap;

    fn envelope(method: &'static str, http_method: &'static str, data: Value, authenticated: bool) -> Envelope {
        let (query, body) = if http_method == "GET" {
            let mut q = StdHashMap::new();
            if let Value::Object(map) = &data {
                for (k, v) in map {
                    q.insert(k.clone(), v.as_str().unwrap_or_default().to_string());
                }
            }
            (q, None)
        } else {
            (StdHashMap::new(), Some(data))
        };
        let transport = TransportRequest {
            headers: StdHashMap::new(),
            query,
            body,
            remote_addr: None,
            path: format!("/domains/v1/{method}"),
            http_method,
            scheme: "https",
        };
        let mut env = Envelope::new(transport, ServiceDescriptor::new("domains", 1, "Domains"), MethodDescriptor::new(method, http_method, false));
        if authenticated {
            env.add_lazy_property("entity_id", LazyProperty::from_value(Value::from(42)));
        }
        env
    }

    fn registered_domains() -> RegisteredService {
        RegisteredService {
            descriptor: ServiceDescriptor::new("domains", 1, "Domains"),
            methods: vec![
                MethodDescriptor::new("check_availability", "GET", false),
                MethodDescriptor::new("create_registration_intention", "POST", false),
                MethodDescriptor::new("submit_registration_intention", "POST", false),
                MethodDescriptor::new("update_registered_dns", "POST", true),
            ],
            providers: vec![ProviderDescriptor::new("_mocked_", ["check_availability", "purchase_domain", "setup_dns"])],
        }
    }

    fn ctx_for<'a>(registry: &'a Registry, bundle: &'a ServiceBundle) -> ServiceContext<'a> {
        let registered = registry.get_service("domains", 1).unwrap();
        let base = ServiceBase::new(registry, registered);
        ServiceContext { base, providers: &bundle.providers, strategy: bundle.strategy.as_ref() }
    }

    fn tiny_bundle() -> ServiceBundle {
        bundle_with_retry(HashMap::new(), Arc::new(LocalBus::new()), RetryConfig { attempts: 5, initial_delay: Duration::from_millis(1), factor: 2 })
    }

    #[test]
    fn zone_of_reads_the_last_label() {
        assert_eq!(zone_of("example.com"), Some("com"));
        assert_eq!(zone_of("a.b.co.uk"), Some("uk"));
        assert_eq!(zone_of(""), None);
    }

    #[tokio::test]
    async fn check_availability_reports_unsupported_zones_without_a_provider_call() {
        let bundle = tiny_bundle();
        let registry = Registry::new();
        registry.register(registered_domains()).unwrap();
        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("check_availability", "GET", json!({"domain": "example.zz"}), false);
        let response = bundle.methods.call_method("check_availability", &mut env, ctx).await.unwrap();
        assert_eq!(response.response_data["available"], json!(false));
    }

    #[tokio::test]
    async fn check_availability_reports_the_mocked_provider_as_available() {
        let bundle = tiny_bundle();
        let registry = Registry::new();
        registry.register(registered_domains()).unwrap();
        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("check_availability", "GET", json!({"domain": "example.com"}), false);
        let response = bundle.methods.call_method("check_availability", &mut env, ctx).await.unwrap();
        assert_eq!(response.response_data["available"], json!(true));
    }

    #[tokio::test]
    async fn create_registration_intention_requires_identity() {
        let bundle = tiny_bundle();
        let registry = Registry::new();
        registry.register(registered_domains()).unwrap();
        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("create_registration_intention", "POST", json!({"domain": "example.com"}), false);
        let err = bundle.methods.call_method("create_registration_intention", &mut env, ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn full_workflow_reaches_dns_updated_after_a_few_retries() {
        let bundle = tiny_bundle();
        let registry = Registry::new();
        registry.register(registered_domains()).unwrap();

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("create_registration_intention", "POST", json!({"domain": "example.com"}), true);
        let created = bundle.methods.call_method("create_registration_intention", &mut env, ctx).await.unwrap();
        assert_eq!(created.status_code, Some(201));
        let intention_id = created.response_data["intention_id"].as_u64().unwrap();

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("submit_registration_intention", "POST", json!({"intention_id": intention_id}), true);
        let submitted = bundle.methods.call_method("submit_registration_intention", &mut env, ctx).await.unwrap();
        assert_eq!(submitted.status_code, Some(201));
        assert!(submitted.request_fulfilled);

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("submit_registration_intention", "POST", json!({"intention_id": intention_id}), true);
        let resubmitted = bundle.methods.call_method("submit_registration_intention", &mut env, ctx).await.unwrap();
        assert_eq!(resubmitted.status_code, Some(304));
        assert!(!resubmitted.request_fulfilled);

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("update_registered_dns", "POST", json!({"intention_id": intention_id}), false);
        let dns = bundle.methods.call_method("update_registered_dns", &mut env, ctx).await.unwrap();
        assert_eq!(dns.response_data["status"], json!("dns_updated"));
    }

    #[tokio::test]
    async fn submit_registration_intention_rejects_an_intention_owned_by_another_tenant() {
        let bundle = tiny_bundle();
        let registry = Registry::new();
        registry.register(registered_domains()).unwrap();

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("create_registration_intention", "POST", json!({"domain": "example.com"}), true);
        let created = bundle.methods.call_method("create_registration_intention", &mut env, ctx).await.unwrap();
        let intention_id = created.response_data["intention_id"].as_u64().unwrap();

        let ctx = ctx_for(&registry, &bundle);
        let mut env = envelope("submit_registration_intention", "POST", json!({"intention_id": intention_id}), false);
        env.add_lazy_property("entity_id", LazyProperty::from_value(Value::from(999)));
        let err = bundle.methods.call_method("submit_registration_intention", &mut env, ctx).await.unwrap_err();
        assert!(matches!(err, GatewayError::ServiceRestricted { .. }));
    }
}
