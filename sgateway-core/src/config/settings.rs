//! Typed view over the keys this gateway recognizes.
//!
//! Built by hand against [`ConfigProperties`] rather than via a derive
//! macro — the workspace dropped its codegen crate along with the rest of
//! the DI scaffolding it came with (see the workspace's `DESIGN.md`).

use std::collections::HashMap;

use super::{ConfigError, ConfigProperties, GatewayConfig, PropertyMeta};

/// Recognized configuration keys (§6), plus the ambient keys needed to wire
/// logging/cache/rate-limit/idempotency. Unknown keys are ignored.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub internal_gateway_key: String,
    pub installed_services: Vec<String>,
    pub db_config: String,
    pub redis_config: String,
    pub services_pipeline_middlewares: Vec<String>,
    pub amqp_url: Option<String>,
    pub service_mq_logging: bool,
    pub is_local: bool,
    pub cache_ttl_seconds: i64,
    pub idempotency_ttl_seconds: i64,
    pub total_quota_per_hour: i64,
    /// Per-service request quotas, keyed by service name. Absent services
    /// fall back to the joint total quota only.
    pub per_service_quota_per_hour: HashMap<String, i64>,
    /// Per-call prices, keyed by service then method name, consumed by
    /// `BillingMiddleware`.
    pub price_list: HashMap<String, HashMap<String, f64>>,
}

impl ConfigProperties for GatewaySettings {
    fn prefix() -> &'static str {
        ""
    }

    fn properties_metadata() -> Vec<PropertyMeta> {
        vec![
            PropertyMeta {
                key: "internal_gateway_key".into(),
                full_key: "internal_gateway_key".into(),
                type_name: "String",
                required: true,
                default_value: None,
                description: Some("HS256 signing key used to verify bearer JWTs".into()),
            },
            PropertyMeta {
                key: "db_config".into(),
                full_key: "db_config".into(),
                type_name: "String",
                required: true,
                default_value: None,
                description: Some("Postgres connection string for the idempotency store".into()),
            },
            PropertyMeta {
                key: "redis_config".into(),
                full_key: "redis_config".into(),
                type_name: "String",
                required: true,
                default_value: None,
                description: Some("Redis connection string for cache and rate-limit counters".into()),
            },
        ]
    }

    fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            internal_gateway_key: config.get("internal_gateway_key")?,
            installed_services: config.get_or("installed_services", Vec::new()),
            db_config: config.get("db_config")?,
            redis_config: config.get("redis_config")?,
            services_pipeline_middlewares: config.get_or("services_pipeline_middlewares", Vec::new()),
            amqp_url: config.get("amqp_url").ok(),
            service_mq_logging: config.get_or("service_mq_logging", false),
            is_local: config.get_or("is_local", false),
            cache_ttl_seconds: config.get_or("cache_ttl_seconds", 300),
            idempotency_ttl_seconds: config.get_or("idempotency_ttl_seconds", 3600),
            total_quota_per_hour: config.get_or("rate_limits.total_per_hour", 5000),
            per_service_quota_per_hour: config.get_or("rate_limits.per_service", HashMap::new()),
            price_list: config.get_or("price_list", HashMap::new()),
        })
    }
}
