//! Message-bus abstraction: a thin trait plus swappable backends, matching
//! this stack's existing pattern for cache and rate-limit backends.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug)]
pub struct BusError(pub String);

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bus error: {}", self.0)
    }
}

impl std::error::Error for BusError {}

/// Publishes a JSON payload to a topic under a routing key. The inbound
/// `sgateway_calls` consumer is transport-specific (AMQP-only) and lives
/// in `sgateway-events-amqp` rather than on this trait.
pub trait MessageBus: Send + Sync {
    fn publish<'a>(&'a self, topic: &'a str, routing_key: &'a str, payload: Value) -> BoxFuture<'a, Result<(), BusError>>;
}
