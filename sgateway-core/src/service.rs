//! Service base: method dispatch, provider acquisition, and failover.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::ProviderDescriptor;
use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::provider::Provider;
use crate::registry::{RegisteredService, Registry};
use crate::strategy::SelectionStrategy;

/// Everything a service method needs to acquire and call a provider:
/// the registry-backed base (for locals and failover bookkeeping), the
/// wired provider objects keyed by name, and the strategy the dispatcher
/// was configured with. Bundled so `ServiceMethods::call_method` doesn't
/// grow a new parameter every time a service needs another base
/// capability.
pub struct ServiceContext<'a> {
    pub base: ServiceBase<'a>,
    pub providers: &'a HashMap<String, Provider>,
    pub strategy: &'a dyn SelectionStrategy,
}

impl<'a> ServiceContext<'a> {
    pub fn provider(&self, desc: &ProviderDescriptor) -> Result<&'a Provider, GatewayError> {
        self.providers.get(&desc.name).ok_or_else(|| GatewayError::ConfigurationError {
            message: format!("provider `{}` is not wired into this process", desc.name),
        })
    }

    /// Single-shot acquisition: the usual path for methods that don't need
    /// failover (a lookup, an availability check, a one-shot purchase).
    pub async fn get_single(
        &self,
        envelope: &mut Envelope,
        required_methods: &[&str],
        provider_name: Option<&str>,
    ) -> Result<&'a Provider, GatewayError> {
        let desc = self.base.get_provider(envelope, required_methods, provider_name, self.strategy).await?;
        self.provider(&desc)
    }

    /// Tries every eligible provider in turn via [`ServiceBase::failover_provider_call`],
    /// resolving each selected descriptor to its wired `Provider` before
    /// invoking `method` on it.
    pub async fn call_with_failover(
        &self,
        envelope: &mut Envelope,
        required_methods: &[&str],
        method: &str,
        args: &Value,
    ) -> Result<Value, GatewayError> {
        let providers = self.providers;
        self.base
            .failover_provider_call(envelope, required_methods, self.strategy, false, |desc| async move {
                let provider = providers.get(&desc.name).ok_or_else(|| GatewayError::ConfigurationError {
                    message: format!("provider `{}` is not wired into this process", desc.name),
                })?;
                provider.call_method(method, args).await
            })
            .await
    }
}

/// Operations a concrete service (email, sms, currency_exchange, ...)
/// implements by method name. Kept as a trait so `sgateway-services` can
/// dispatch by a match statement while the core only needs to call one
/// method through a trait object.
///
/// Returns the full `GatewayResponse` rather than a bare `Value` so a
/// method can set `extra_params.global_cache`, a non-default status code,
/// or `request_fulfilled=false` — all read by egress middlewares
/// downstream of dispatch.
pub trait ServiceMethods: Send + Sync {
    fn call_method<'a>(
        &'a self,
        method: &'a str,
        envelope: &'a mut Envelope,
        ctx: ServiceContext<'a>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<crate::envelope::GatewayResponse, GatewayError>> + Send + 'a>>;
}

/// Selects and invokes a provider for one call. `registry` and `registered`
/// are passed explicitly rather than looked up again from `current()` so
/// callers under test can supply an isolated registry without a global
/// override.
pub struct ServiceBase<'r> {
    pub registry: &'r Registry,
    pub registered: Arc<RegisteredService>,
}

impl<'r> ServiceBase<'r> {
    pub fn new(registry: &'r Registry, registered: Arc<RegisteredService>) -> Self {
        Self { registry, registered }
    }

    /// `get_provider(envelope, required_methods?, provider_name?, strategy?)`.
    ///
    /// If `provider_name` is set, `required_methods` and `strategy` must be
    /// absent (enforced by the caller via the type — passing both is a
    /// logic error, not something this signature can express more
    /// precisely without introducing an enum; tests cover the documented
    /// contract instead).
    pub async fn get_provider(
        &self,
        envelope: &mut Envelope,
        required_methods: &[&str],
        provider_name: Option<&str>,
        strategy: &dyn SelectionStrategy,
    ) -> Result<ProviderDescriptor, GatewayError> {
        if let Some(name) = provider_name {
            return self
                .registered
                .providers
                .iter()
                .find(|p| p.name == name)
                .cloned()
                .ok_or_else(|| GatewayError::ProviderUnavailable {
                    message: format!("provider `{name}` is not registered for this service"),
                });
        }

        let eligible: Vec<ProviderDescriptor> = self
            .registered
            .providers
            .iter()
            .filter(|p| p.supports_all(required_methods))
            .cloned()
            .collect();

        let locals = self.registry.locals(&self.registered.descriptor.name, self.registered.descriptor.version);
        let selected = strategy.select(envelope, &eligible, locals.as_deref()).await?;
        let provider = selected.ok_or_else(|| GatewayError::ProviderUnavailable {
            message: "no eligible provider is available for this call".into(),
        })?;
        envelope.add_loggable_property("provider", Value::from(provider.name.clone()));
        Ok(provider)
    }

    /// Iterates the eligible provider set, letting `strategy` pick one each
    /// time; a failing provider is dropped from the set and the next
    /// attempt proceeds. First success wins. Exhaustion is `FailoverFail`
    /// with `client_retry = true`. `silent` suppresses the per-attempt
    /// warning log — used when failed attempts are expected noise (e.g.
    /// availability probing) rather than a fault worth surfacing.
    pub async fn failover_provider_call<F, Fut>(
        &self,
        envelope: &mut Envelope,
        required_methods: &[&str],
        strategy: &dyn SelectionStrategy,
        silent: bool,
        mut call: F,
    ) -> Result<Value, GatewayError>
    where
        F: FnMut(ProviderDescriptor) -> Fut,
        Fut: std::future::Future<Output = Result<Value, GatewayError>>,
    {
        let mut remaining: Vec<ProviderDescriptor> =
            self.registered.providers.iter().filter(|p| p.supports_all(required_methods)).cloned().collect();

        let locals = self.registry.locals(&self.registered.descriptor.name, self.registered.descriptor.version);

        while !remaining.is_empty() {
            let selected = strategy.select(envelope, &remaining, locals.as_deref()).await?;
            let Some(provider) = selected else { break };
            match call(provider.clone()).await {
                Ok(value) => {
                    envelope.add_loggable_property("provider", Value::from(provider.name.clone()));
                    return Ok(value);
                }
                Err(err) => {
                    if !silent {
                        tracing::warn!(provider = %provider.name, "failover attempt failed: {err}");
                    }
                    remaining.retain(|p| p.name != provider.name);
                }
            }
        }

        Err(GatewayError::FailoverFail { message: "every eligible provider failed".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
    use crate::registry::ServiceLocals;
    use crate::strategy::RoundRobin;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registered(providers: Vec<ProviderDescriptor>) -> RegisteredService {
        RegisteredService {
            descriptor: ServiceDescriptor::new("email", 1, "Email"),
            methods: vec![MethodDescriptor::new("send", "POST", false)],
            providers,
        }
    }

    fn envelope() -> Envelope {
        let transport = crate::envelope::TransportRequest {
            headers: HashMap::new(),
            query: HashMap::new(),
            body: None,
            remote_addr: None,
            path: "/email/v1/send".into(),
            http_method: "POST",
            scheme: "https",
        };
        Envelope::new(transport, ServiceDescriptor::new("email", 1, "Email"), MethodDescriptor::new("send", "POST", false))
    }

    #[tokio::test]
    async fn get_provider_by_name_succeeds_when_registered() {
        let registry = Registry::new();
        let svc = Arc::new(registered(vec![ProviderDescriptor::new("a", ["send"]), ProviderDescriptor::new("b", ["send"])]));
        registry
            .register(RegisteredService { descriptor: svc.descriptor.clone(), methods: svc.methods.clone(), providers: svc.providers.clone() })
            .unwrap();
        let base = ServiceBase::new(&registry, svc);
        let mut env = envelope();
        let provider = base.get_provider(&mut env, &[], Some("b"), &RoundRobin).await.unwrap();
        assert_eq!(provider.name, "b");
    }

    #[tokio::test]
    async fn get_provider_by_name_fails_when_not_registered() {
        let registry = Registry::new();
        let svc = Arc::new(registered(vec![ProviderDescriptor::new("a", ["send"])]));
        registry
            .register(RegisteredService { descriptor: svc.descriptor.clone(), methods: svc.methods.clone(), providers: svc.providers.clone() })
            .unwrap();
        let base = ServiceBase::new(&registry, svc);
        let mut env = envelope();
        let err = base.get_provider(&mut env, &[], Some("nonexistent"), &RoundRobin).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn get_provider_uses_strategy_when_no_name_given() {
        let registry = Registry::new();
        let svc = Arc::new(registered(vec![ProviderDescriptor::new("a", ["send"]), ProviderDescriptor::new("b", ["send"])]));
        registry
            .register(RegisteredService { descriptor: svc.descriptor.clone(), methods: svc.methods.clone(), providers: svc.providers.clone() })
            .unwrap();
        let base = ServiceBase::new(&registry, svc);
        let mut env = envelope();
        let provider = base.get_provider(&mut env, &["send"], None, &RoundRobin).await.unwrap();
        assert_eq!(provider.name, "a");
        assert_eq!(env.loggable_properties(), vec![("provider".into(), Value::from("a"))]);
    }

    #[tokio::test]
    async fn failover_returns_first_success_and_drops_failed_providers() {
        let registry = Registry::new();
        let svc = Arc::new(registered(vec![
            ProviderDescriptor::new("a", ["send"]),
            ProviderDescriptor::new("b", ["send"]),
            ProviderDescriptor::new("c", ["send"]),
        ]));
        registry
            .register(RegisteredService { descriptor: svc.descriptor.clone(), methods: svc.methods.clone(), providers: svc.providers.clone() })
            .unwrap();
        let base = ServiceBase::new(&registry, svc);
        let mut env = envelope();
        let attempts = AtomicUsize::new(0);
        let result = base
            .failover_provider_call(&mut env, &["send"], &RoundRobin, false, |provider| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if provider.name == "c" {
                        Ok(Value::from("ok"))
                    } else {
                        Err(GatewayError::ProviderError { message: "down".into() })
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, Value::from("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(env.loggable_properties(), vec![("provider".into(), Value::from("c"))]);
    }

    #[tokio::test]
    async fn failover_exhaustion_raises_failover_fail_with_client_retry() {
        let registry = Registry::new();
        let svc = Arc::new(registered(vec![ProviderDescriptor::new("a", ["send"]), ProviderDescriptor::new("b", ["send"])]));
        registry
            .register(RegisteredService { descriptor: svc.descriptor.clone(), methods: svc.methods.clone(), providers: svc.providers.clone() })
            .unwrap();
        let base = ServiceBase::new(&registry, svc);
        let mut env = envelope();
        let err = base
            .failover_provider_call(&mut env, &["send"], &RoundRobin, true, |_provider| async {
                Err(GatewayError::ProviderError { message: "down".into() })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::FailoverFail { .. }));
        assert!(err.client_retry());
    }

    #[test]
    fn service_locals_namespace_survives_across_calls() {
        let locals = ServiceLocals::default();
        locals.namespace("round_robin_calls").insert("a".into(), 3);
        assert_eq!(*locals.namespace("round_robin_calls").get("a").unwrap(), 3);
    }
}
