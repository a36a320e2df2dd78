//! Provider-selection strategies.
//!
//! A strategy picks one provider from the eligible set for a given call. It
//! may suspend (e.g. `DomainRegistrant` checks availability upstream) and
//! may read or mutate the service's process-local namespaced storage
//! (`ServiceLocals`), but holds no state of its own between calls.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::descriptor::ProviderDescriptor;
use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::registry::ServiceLocals;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A provider availability check used by [`DomainRegistrant`]. Kept as a
/// trait object so `sgateway-core` does not need to know about concrete
/// domain-registrar providers.
pub trait AvailabilityCheck: Send + Sync {
    fn check_availability<'a>(&'a self, provider: &'a str, domain: &'a str) -> BoxFuture<'a, Result<Option<f64>, GatewayError>>;
}

pub trait SelectionStrategy: Send + Sync {
    fn select<'a>(
        &'a self,
        envelope: &'a Envelope,
        providers: &'a [ProviderDescriptor],
        locals: Option<&'a ServiceLocals>,
    ) -> BoxFuture<'a, Result<Option<ProviderDescriptor>, GatewayError>>;
}

/// Selects the provider with the fewest calls so far, under namespace
/// `round_robin_calls`; ties broken by declaration order. Requires
/// `ServiceLocals` to be present — this is the strategy's own invariant,
/// not an incidental limitation.
pub struct RoundRobin;

impl SelectionStrategy for RoundRobin {
    fn select<'a>(
        &'a self,
        _envelope: &'a Envelope,
        providers: &'a [ProviderDescriptor],
        locals: Option<&'a ServiceLocals>,
    ) -> BoxFuture<'a, Result<Option<ProviderDescriptor>, GatewayError>> {
        Box::pin(async move {
            let Some(locals) = locals else {
                return Err(GatewayError::Internal {
                    message: "RoundRobin strategy requires service locals storage".into(),
                    details: None,
                });
            };
            if providers.is_empty() {
                return Ok(None);
            }
            let counters = locals.namespace("round_robin_calls");
            let chosen = providers
                .iter()
                .min_by_key(|p| counters.get(&p.name).map(|c| *c).unwrap_or(0))
                .expect("providers is non-empty")
                .clone();
            *counters.entry(chosen.name.clone()).or_insert(0) += 1;
            Ok(Some(chosen))
        })
    }
}

/// Selects the cheapest provider reporting availability for the domain
/// named in the envelope's `domain` query arg / extension. Raises
/// `BadRequest` if none are available.
pub struct DomainRegistrant {
    pub availability: Arc<dyn AvailabilityCheck>,
}

impl SelectionStrategy for DomainRegistrant {
    fn select<'a>(
        &'a self,
        envelope: &'a Envelope,
        providers: &'a [ProviderDescriptor],
        _locals: Option<&'a ServiceLocals>,
    ) -> BoxFuture<'a, Result<Option<ProviderDescriptor>, GatewayError>> {
        Box::pin(async move {
            let domain = envelope
                .get_extension("domain")
                .and_then(|v| v.as_str())
                .or_else(|| envelope.transport.query_arg("domain"))
                .ok_or_else(|| GatewayError::bad_request("a `domain` is required to select a registrant"))?;

            let mut candidates: Vec<(ProviderDescriptor, f64)> = Vec::new();
            for provider in providers {
                if let Some(price) = self.availability.check_availability(&provider.name, domain).await? {
                    candidates.push((provider.clone(), price));
                }
            }
            match candidates.into_iter().min_by(|a, b| a.1.total_cmp(&b.1)) {
                Some((provider, _)) => Ok(Some(provider)),
                None => Err(GatewayError::bad_request("no registrar reports this domain as available; check availability first")),
            }
        })
    }
}

/// Selects the first provider whose `supported_countries` includes the
/// configured country.
pub struct DomesticSale {
    pub country: String,
    pub supported_countries: Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>,
}

impl SelectionStrategy for DomesticSale {
    fn select<'a>(
        &'a self,
        _envelope: &'a Envelope,
        providers: &'a [ProviderDescriptor],
        _locals: Option<&'a ServiceLocals>,
    ) -> BoxFuture<'a, Result<Option<ProviderDescriptor>, GatewayError>> {
        Box::pin(async move {
            for provider in providers {
                let countries = (self.supported_countries)(&provider.name);
                if countries.iter().any(|c| c == &self.country) {
                    return Ok(Some(provider.clone()));
                }
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
    use std::collections::HashMap;

    fn providers(names: &[&str]) -> Vec<ProviderDescriptor> {
        names.iter().map(|n| ProviderDescriptor::new(*n, ["m"])).collect()
    }

    fn envelope() -> Envelope {
        let transport = crate::envelope::TransportRequest {
            headers: HashMap::new(),
            query: HashMap::new(),
            body: None,
            remote_addr: None,
            path: "/domains/v1/check_availability".into(),
            http_method: "GET",
            scheme: "https",
        };
        Envelope::new(transport, ServiceDescriptor::new("domains", 1, "Domains"), MethodDescriptor::new("check_availability", "GET", false))
    }

    #[tokio::test]
    async fn round_robin_is_fair_over_many_selections() {
        let locals = ServiceLocals::default();
        let provs = providers(&["a", "b", "c"]);
        let env = envelope();
        let strategy = RoundRobin;
        let mut counts: HashMap<String, u32> = HashMap::new();
        let k = 30;
        for _ in 0..k {
            let chosen = strategy.select(&env, &provs, Some(&locals)).await.unwrap().unwrap();
            *counts.entry(chosen.name).or_insert(0) += 1;
        }
        let n = provs.len() as u32;
        let floor = k / n;
        let ceil = floor + if k % n == 0 { 0 } else { 1 };
        for p in &provs {
            let c = *counts.get(&p.name).unwrap_or(&0);
            assert!(c >= floor && c <= ceil, "{} got {} calls (expected {}..={})", p.name, c, floor, ceil);
        }
    }

    #[tokio::test]
    async fn round_robin_ties_broken_by_declaration_order() {
        let locals = ServiceLocals::default();
        let provs = providers(&["a", "b"]);
        let env = envelope();
        let strategy = RoundRobin;
        let first = strategy.select(&env, &provs, Some(&locals)).await.unwrap().unwrap();
        assert_eq!(first.name, "a");
    }

    #[tokio::test]
    async fn round_robin_without_locals_fails_fatally() {
        let provs = providers(&["a"]);
        let env = envelope();
        let strategy = RoundRobin;
        assert!(strategy.select(&env, &provs, None).await.is_err());
    }

    struct FakeAvailability {
        prices: HashMap<&'static str, Option<f64>>,
    }

    impl AvailabilityCheck for FakeAvailability {
        fn check_availability<'a>(&'a self, provider: &'a str, _domain: &'a str) -> BoxFuture<'a, Result<Option<f64>, GatewayError>> {
            let result = self.prices.get(provider).cloned().flatten();
            Box::pin(async move { Ok(result) })
        }
    }

    #[tokio::test]
    async fn domain_registrant_picks_cheapest_available() {
        let mut prices = HashMap::new();
        prices.insert("expensive", Some(20.0));
        prices.insert("cheap", Some(5.0));
        prices.insert("unavailable", None);
        let strategy = DomainRegistrant { availability: Arc::new(FakeAvailability { prices }) };
        let provs = providers(&["expensive", "cheap", "unavailable"]);
        let mut env = envelope();
        env.add_extension("domain", serde_json::Value::from("example.com"));
        let chosen = strategy.select(&env, &provs, None).await.unwrap().unwrap();
        assert_eq!(chosen.name, "cheap");
    }

    #[tokio::test]
    async fn domain_registrant_errors_when_none_available() {
        let mut prices = HashMap::new();
        prices.insert("a", None);
        let strategy = DomainRegistrant { availability: Arc::new(FakeAvailability { prices }) };
        let provs = providers(&["a"]);
        let mut env = envelope();
        env.add_extension("domain", serde_json::Value::from("example.com"));
        assert!(strategy.select(&env, &provs, None).await.is_err());
    }

    #[tokio::test]
    async fn domestic_sale_picks_first_supporting_country() {
        let strategy = DomesticSale {
            country: "FR".into(),
            supported_countries: Arc::new(|name| match name {
                "global" => vec!["US".into(), "FR".into()],
                "us-only" => vec!["US".into()],
                _ => vec![],
            }),
        };
        let provs = providers(&["us-only", "global"]);
        let env = envelope();
        let chosen = strategy.select(&env, &provs, None).await.unwrap();
        assert_eq!(chosen.unwrap().name, "global");
    }
}
