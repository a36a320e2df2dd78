//! Currency exchange: `rates` and `convert`, both read-only GETs whose
//! responses are safe to cache globally across tenants.
//!
//! Unlike email/sms this service acquires a single provider per call rather
//! than failing over — a stale or wrong exchange rate is worse than an
//! honest error, so there is no silent fallback to a second feed.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};

use sgateway_core::descriptor::{MethodDescriptor, ProviderDescriptor, ServiceDescriptor};
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::provider::{Provider, ProviderOutcome, ProviderResult};
use sgateway_core::registry::RegisteredService;
use sgateway_core::service::{ServiceContext, ServiceMethods};
use sgateway_core::strategy::RoundRobin;

use crate::ServiceBundle;

fn parse_date(data: &Value) -> Result<Option<NaiveDate>, GatewayError> {
    match data.get("date").and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| GatewayError::bad_request_field(format!("`date` is not a valid YYYY-MM-DD date: {raw}"), "date")),
    }
}

fn parse_amount(data: &Value) -> Result<f64, GatewayError> {
    match data.get("amount") {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| GatewayError::bad_request_field("`amount` is not a valid number", "amount")),
        Some(Value::String(s)) => s.parse::<f64>().map_err(|_| GatewayError::bad_request_field("`amount` is not a valid number", "amount")),
        _ => Err(GatewayError::bad_request_field("`amount` is required", "amount")),
    }
}

fn require_currency(data: &Value, field: &str) -> Result<String, GatewayError> {
    data.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::bad_request_field(format!("`{field}` is required"), field))
}

fn require_config(config: &HashMap<String, String>, key: &str) -> ProviderResult<String> {
    config
        .get(key)
        .cloned()
        .ok_or_else(|| ProviderOutcome::Domain(GatewayError::ConfigurationError { message: format!("missing required config key `{key}`") }))
}

fn mocked_rates() -> serde_json::Map<String, Value> {
    let mut rates = serde_json::Map::new();
    rates.insert("EUR".into(), json!(0.92));
    rates.insert("GBP".into(), json!(0.79));
    rates.insert("JPY".into(), json!(157.3));
    rates
}

fn mocked_provider() -> Provider {
    Provider::new("_mocked_")
        .with_method("get_rates", |args| {
            let base = args.get("base").and_then(Value::as_str).unwrap_or("USD").to_string();
            Box::pin(async move { Ok(json!({"base": base, "date": "latest", "rates": mocked_rates()})) })
        })
        .with_method("convert", |args| {
            let args = args.clone();
            Box::pin(async move {
                let amount = args.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                let rate = args.get("to").and_then(Value::as_str).and_then(|c| mocked_rates().get(c).and_then(Value::as_f64)).unwrap_or(1.0);
                Ok(json!({"amount": amount * rate, "from": args.get("from"), "to": args.get("to")}))
            })
        })
}

/// Hits a real upstream in the original system; here it only validates its
/// own configuration is present, since no live HTTP call is made.
fn fixerio_provider(config: HashMap<String, String>) -> Provider {
    let get_rates_config = config.clone();
    Provider::new("fixerio")
        .with_method("get_rates", move |_args| {
            let config = get_rates_config.clone();
            Box::pin(async move {
                require_config(&config, "FIXER_API_KEY")?;
                Ok(json!({"base": "EUR", "date": "latest", "rates": mocked_rates()}))
            })
        })
        .with_method("convert", move |args| {
            let config = config.clone();
            let args = args.clone();
            Box::pin(async move {
                require_config(&config, "FIXER_API_KEY")?;
                let amount = args.get("amount").and_then(Value::as_f64).unwrap_or(0.0);
                Ok(json!({"amount": amount, "from": args.get("from"), "to": args.get("to")}))
            })
        })
}

/// Advertises no methods at all — present in the provider set only to
/// exercise selection strategies that must skip providers which can't
/// fulfil a call.
fn dummy_provider() -> Provider {
    Provider::new("dummy")
}

/// Always unavailable; used to exercise the "provider selected but call
/// itself fails" path distinctly from "no eligible provider".
fn jsonrates_provider() -> Provider {
    let unavailable = || ProviderOutcome::Domain(GatewayError::ProviderError { message: "Not available now".into() });
    Provider::new("jsonrates")
        .with_method("get_rates", move |_args| Box::pin(async move { Err(unavailable()) }))
        .with_method("convert", move |_args| Box::pin(async move { Err(unavailable()) }))
}

struct CurrencyExchangeService;

impl ServiceMethods for CurrencyExchangeService {
    fn call_method<'a>(
        &'a self,
        method: &'a str,
        envelope: &'a mut Envelope,
        ctx: ServiceContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<GatewayResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            match method {
                "rates" => {
                    let data = envelope.get_data();
                    parse_date(&data)?;
                    let provider = ctx.get_single(envelope, &["get_rates"], None).await?;
                    let result = provider.call_method("get_rates", &data).await?;
                    Ok(GatewayResponse::json(result).with_param("global_cache", Value::Bool(true)))
                }
                "convert" => {
                    let data = envelope.get_data();
                    parse_amount(&data)?;
                    require_currency(&data, "from")?;
                    require_currency(&data, "to")?;
                    let provider = ctx.get_single(envelope, &["convert"], None).await?;
                    let result = provider.call_method("convert", &data).await?;
                    Ok(GatewayResponse::json(result).with_param("global_cache", Value::Bool(true)))
                }
                other => Err(GatewayError::ConfigurationError { message: format!("currency_exchange has no method `{other}`") }),
            }
        })
    }
}

pub fn bundle(vendor_config: HashMap<String, String>) -> ServiceBundle {
    let registered = RegisteredService {
        descriptor: ServiceDescriptor::new("currency_exchange", 1, "Currency exchange service"),
        methods: vec![MethodDescriptor::new("rates", "GET", false), MethodDescriptor::new("convert", "GET", false)],
        providers: vec![
            ProviderDescriptor::new("_mocked_", ["get_rates", "convert"]),
            ProviderDescriptor::new("fixerio", ["get_rates", "convert"]),
            ProviderDescriptor::new("dummy", []),
            ProviderDescriptor::new("jsonrates", ["get_rates", "convert"]),
        ],
    };

    let mut providers = HashMap::new();
    providers.insert("_mocked_".to_string(), mocked_provider());
    providers.insert("fixerio".to_string(), fixerio_provider(vendor_config));
    providers.insert("dummy".to_string(), dummy_provider());
    providers.insert("jsonrates".to_string(), jsonrates_provider());

    ServiceBundle { registered, methods: Arc::new(CurrencyExchangeService), providers, strategy: Arc::new(RoundRobin) }
}
