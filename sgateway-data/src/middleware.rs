//! `IdempotencyMiddleware`: duplicate-request suppression keyed by
//! client-supplied token + request scope.

use std::sync::Arc;
use std::time::Duration;

use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::pipeline::Middleware;

use crate::idempotency::{IdempotencyStore, LockOutcome};

fn request_key(envelope: &Envelope) -> Option<String> {
    envelope
        .transport
        .header("X-Idempotency-Key")
        .or_else(|| envelope.transport.query_arg("idempotency_key"))
        .map(|s| s.to_string())
}

fn scope(envelope: &Envelope, entity_id: Option<i64>) -> String {
    let entity = entity_id.map(|id| id.to_string()).unwrap_or_else(|| "any".to_string());
    format!("{entity}.{}", envelope.path_repr())
}

pub struct IdempotencyMiddleware {
    store: Arc<dyn IdempotencyStore>,
    ttl: Duration,
}

impl IdempotencyMiddleware {
    pub fn new(store: Arc<dyn IdempotencyStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

impl Middleware for IdempotencyMiddleware {
    fn name(&self) -> &'static str {
        "IdempotencyMiddleware"
    }

    fn process_request<'a>(
        &'a self,
        envelope: &'a mut Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(key) = request_key(envelope) else { return Ok(None) };
            let entity_id = envelope.get_lazy_property("entity_id").await.and_then(|v| v.as_i64());
            let scope = scope(envelope, entity_id);

            match self.store.try_acquire(&key, &scope, self.ttl).await {
                Ok(LockOutcome::Acquired) => {
                    envelope.add_extension("idempotency.key", serde_json::Value::String(key));
                    envelope.add_extension("idempotency.scope", serde_json::Value::String(scope));
                    Ok(None)
                }
                Ok(LockOutcome::AlreadyHeld { remaining_seconds }) => Err(GatewayError::RequestIdempotencyError {
                    message: "a request with this idempotency key is already in flight or was already fulfilled".into(),
                    remaining_seconds,
                }),
                Err(err) => Err(GatewayError::Internal { message: err.to_string(), details: None }),
            }
        })
    }

    fn process_response<'a>(
        &'a self,
        envelope: &'a mut Envelope,
        response: Option<GatewayResponse>,
        _error: Option<&'a GatewayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let (Some(key), Some(scope)) = (
                envelope.get_extension("idempotency.key").and_then(|v| v.as_str()).map(|s| s.to_string()),
                envelope.get_extension("idempotency.scope").and_then(|v| v.as_str()).map(|s| s.to_string()),
            ) else {
                return Ok(None);
            };

            let fulfilled = response.as_ref().map(|r| r.request_fulfilled).unwrap_or(false);
            if !fulfilled {
                self.store.release(&key, &scope).await.map_err(|err| GatewayError::Internal { message: err.to_string(), details: None })?;
            }
            Ok(None)
        })
    }
}
