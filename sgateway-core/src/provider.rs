//! Provider base: uniform invocation and error normalization.
//!
//! A provider method can fail two ways: with a domain error it deliberately
//! raised (a quota check it performed itself, a `BadRequest` for malformed
//! provider-specific input) or with some other failure (an HTTP client
//! error, a parse failure, a panic-worthy bug surfaced as an error instead).
//! `Provider::call_method` only ever hands the caller a `GatewayError` —
//! domain errors pass through unwrapped, everything else becomes
//! `ProviderError`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GatewayError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a provider method raised, before normalization. Providers that want
/// a specific status/code (a `BadRequest` for a malformed phone number, a
/// `ConfigurationError` for a missing API key) return `Domain`; anything
/// else — a reqwest error, a JSON parse failure — is `Other` and becomes
/// `ProviderError` at the boundary.
pub enum ProviderOutcome {
    Domain(GatewayError),
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl<E> From<E> for ProviderOutcome
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::Other(Box::new(err))
    }
}

pub type ProviderResult<T> = Result<T, ProviderOutcome>;

/// A single callable method on a provider, keyed by name in
/// [`Provider::methods`].
pub type ProviderMethod = Arc<dyn for<'a> Fn(&'a Value) -> BoxFuture<'a, ProviderResult<Value>> + Send + Sync>;

/// One concrete upstream integration (SendGrid, Twilio, a currency feed).
/// Method bodies are registered by name rather than matched on an enum so
/// that `sgateway-services` can build providers declaratively.
pub struct Provider {
    pub name: String,
    methods: HashMap<String, ProviderMethod>,
}

impl Provider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), methods: HashMap::new() }
    }

    pub fn with_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: for<'a> Fn(&'a Value) -> BoxFuture<'a, ProviderResult<Value>> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Look up `name` and invoke it with `args`. A missing method is itself
    /// a configuration fault, not a caller error — the registry promised
    /// this provider supports the method.
    pub async fn call_method(&self, name: &str, args: &Value) -> Result<Value, GatewayError> {
        let method = self.methods.get(name).ok_or_else(|| GatewayError::ConfigurationError {
            message: format!("provider `{}` has no method `{name}` despite advertising it", self.name),
        })?;
        match method(args).await {
            Ok(value) => Ok(value),
            Err(ProviderOutcome::Domain(err)) => Err(err),
            Err(ProviderOutcome::Other(_err)) => Err(GatewayError::ProviderError { message: "Error occurred during provider call".into() }),
        }
        .map_err(|err| {
            if let GatewayError::ProviderError { .. } = &err {
                tracing::warn!(provider = %self.name, method = name, "provider call failed: {err}");
            }
            err
        })
    }
}
