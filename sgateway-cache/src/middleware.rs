//! `CacheMiddleware`: GET-only response cache, opt-in via `global_cache`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::pipeline::Middleware;

use crate::codec;
use crate::store::CacheStore;

const FIXED_TTL: Duration = Duration::from_secs(300);

fn fingerprint(envelope: &Envelope) -> String {
    let mut query: Vec<(&String, &String)> = envelope.transport.query.iter().collect();
    query.sort_by(|a, b| a.0.cmp(b.0));
    let normalized = query.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
    let raw = format!("{}?{}", envelope.path_repr(), normalized);
    base64::engine::general_purpose::STANDARD.encode(raw)
}

pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
}

impl CacheMiddleware {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "CacheMiddleware"
    }

    fn process_request<'a>(
        &'a self,
        envelope: &'a mut Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            if envelope.transport.http_method != "GET" {
                return Ok(None);
            }
            let key = fingerprint(envelope);
            match self.store.get(&key).await {
                Some(bytes) => match codec::decode(&bytes) {
                    Some(data) => {
                        envelope.add_loggable_property("from_cache", serde_json::Value::Bool(true));
                        Ok(Some(GatewayResponse::json(data)))
                    }
                    None => Ok(None),
                },
                None => Ok(None),
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
            if envelope.transport.http_method != "GET" {
                return Ok(None);
            }
            let Some(response) = response else { return Ok(None) };
            if !response.global_cache() {
                return Ok(None);
            }
            let key = fingerprint(envelope);
            let encoded: Bytes = codec::encode(&response.response_data).into();
            self.store.set(&key, encoded, FIXED_TTL).await;
            Ok(None)
        })
    }
}
