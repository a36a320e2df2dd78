//! `RateLimitMiddleware`: joint total + per-service fixed-window quotas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::pipeline::Middleware;

use crate::backend::RateLimitBackend;

#[derive(Clone, Copy)]
pub struct Quota {
    pub limit: u64,
    pub window: Duration,
    /// If `false`, the per-service counter increments on every response
    /// regardless of whether the upstream call actually fulfilled the
    /// request. The total quota always honors `request_fulfilled`.
    pub only_limit_fulfilled: bool,
}

impl Quota {
    pub fn new(limit: u64, window: Duration) -> Self {
        Self { limit, window, only_limit_fulfilled: true }
    }
}

pub struct RateLimitMiddleware {
    backend: Arc<dyn RateLimitBackend>,
    total: Quota,
    per_service: HashMap<String, Quota>,
}

impl RateLimitMiddleware {
    pub fn new(backend: Arc<dyn RateLimitBackend>, total: Quota, per_service: HashMap<String, Quota>) -> Self {
        Self { backend, total, per_service }
    }

    fn service_quota(&self, service: &str) -> Option<&Quota> {
        self.per_service.get(service)
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "RateLimitMiddleware"
    }

    fn process_request<'a>(
        &'a self,
        envelope: &'a mut Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(entity_id) = envelope.get_lazy_property("entity_id").await else {
                return Ok(None);
            };

            let total_key = format!("ratelimit.total.{entity_id}");
            let total_count = self.backend.get_or_create(&total_key, self.total.window).await;
            let remaining_total = self.total.limit.saturating_sub(total_count);
            if remaining_total == 0 {
                return Err(GatewayError::TotalQuotaExceeded { message: "total request quota exhausted".into() });
            }
            envelope.add_extension("ratelimit.remaining_total", serde_json::Value::from(remaining_total));

            if let Some(quota) = self.service_quota(&envelope.service.name) {
                let service_key = format!("ratelimit.service.{entity_id}.{}", envelope.service.name);
                let service_count = self.backend.get_or_create(&service_key, quota.window).await;
                let remaining_service = quota.limit.saturating_sub(service_count);
                if remaining_service == 0 {
                    return Err(GatewayError::ServiceQuotaExceeded { message: format!("quota exhausted for service `{}`", envelope.service.name) });
                }
                envelope.add_extension("ratelimit.remaining_service", serde_json::Value::from(remaining_service));
            }

            Ok(None)
        })
    }

    fn process_response<'a>(
        &'a self,
        envelope: &'a mut Envelope,
        response: Option<GatewayResponse>,
        _error: Option<&'a GatewayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(entity_id) = envelope.get_lazy_property("entity_id").await else {
                return Ok(None);
            };
            let Some(mut response) = response else { return Ok(None) };

            let fulfilled = response.request_fulfilled;
            let remaining_total = envelope.get_extension("ratelimit.remaining_total").and_then(|v| v.as_u64());

            if let Some(remaining_total) = remaining_total {
                if fulfilled {
                    self.backend.increment(&format!("ratelimit.total.{entity_id}")).await;
                }
                response = response.add_header("X-Total-Quota", (remaining_total - 1).to_string());
            }

            if let Some(quota) = self.service_quota(&envelope.service.name) {
                let remaining_service = envelope.get_extension("ratelimit.remaining_service").and_then(|v| v.as_u64());
                if let Some(remaining_service) = remaining_service {
                    if fulfilled || !quota.only_limit_fulfilled {
                        self.backend.increment(&format!("ratelimit.service.{entity_id}.{}", envelope.service.name)).await;
                    }
                    response = response.add_header("X-Service-Quota", (remaining_service - 1).to_string());
                }
            }

            Ok(Some(response))
        })
    }
}
