//! SMS delivery: `send` over a failover chain of vendor adapters.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};

use sgateway_core::descriptor::{MethodDescriptor, ProviderDescriptor, ServiceDescriptor};
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::provider::{Provider, ProviderOutcome, ProviderResult};
use sgateway_core::registry::RegisteredService;
use sgateway_core::service::{ServiceContext, ServiceMethods};
use sgateway_core::strategy::RoundRobin;

use crate::ServiceBundle;

const MAX_BODY_LEN: usize = 1600;

/// `sender` is either a phone number (`sender_number`) or an alphanumeric
/// sender id (`sender_alphaname`) — never both, never neither.
fn validate(data: &Value) -> Result<(), GatewayError> {
    let has_number = data.get("sender_number").and_then(Value::as_str).is_some();
    let has_alphaname = data.get("sender_alphaname").and_then(Value::as_str).is_some();
    if has_number == has_alphaname {
        return Err(GatewayError::bad_request_field(
            "exactly one of `sender_number` or `sender_alphaname` is required",
            "sender",
        ));
    }
    let to = data.get("to_number").and_then(Value::as_str);
    if to.map(str::is_empty).unwrap_or(true) {
        return Err(GatewayError::bad_request_field("`to_number` is required", "to_number"));
    }
    let body = data.get("body").and_then(Value::as_str).unwrap_or("");
    if body.is_empty() {
        return Err(GatewayError::bad_request_field("`body` is required", "body"));
    }
    if body.len() > MAX_BODY_LEN {
        return Err(GatewayError::bad_request_field(format!("`body` must be at most {MAX_BODY_LEN} characters"), "body"));
    }
    Ok(())
}

fn require_config(config: &HashMap<String, String>, key: &str) -> ProviderResult<String> {
    config
        .get(key)
        .cloned()
        .ok_or_else(|| ProviderOutcome::Domain(GatewayError::ConfigurationError { message: format!("missing required config key `{key}`") }))
}

fn mocked_provider() -> Provider {
    Provider::new("_mocked_").with_method("send_sms", |_data| Box::pin(async { Ok(json!({"sent": true})) }))
}

/// Twilio's payload is `{To, From, Body}`, auth is basic over account
/// sid/token; `From` is the sender however it was expressed upstream.
fn twilio_provider(config: HashMap<String, String>) -> Provider {
    Provider::new("twilio").with_method("send_sms", move |data| {
        let config = config.clone();
        let sender = data.get("sender_number").or_else(|| data.get("sender_alphaname")).cloned().unwrap_or(Value::Null);
        let payload = json!({"To": data.get("to_number"), "From": sender, "Body": data.get("body")});
        Box::pin(async move {
            require_config(&config, "TWILIO_ACCOUNT_SID")?;
            require_config(&config, "TWILIO_AUTH_TOKEN")?;
            Ok(json!({"sent": true, "vendor_payload": payload}))
        })
    })
}

struct SmsService;

impl ServiceMethods for SmsService {
    fn call_method<'a>(
        &'a self,
        method: &'a str,
        envelope: &'a mut Envelope,
        ctx: ServiceContext<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<GatewayResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            match method {
                "send" => {
                    let data = envelope.get_data();
                    validate(&data)?;
                    let result = ctx.call_with_failover(envelope, &["send_sms"], "send_sms", &data).await?;
                    if !result.get("sent").and_then(Value::as_bool).unwrap_or(false) {
                        return Err(GatewayError::ServiceInternal { message: "sorry, can't send the SMS".into() });
                    }
                    Ok(GatewayResponse::json(json!({"sent": true})))
                }
                other => Err(GatewayError::ConfigurationError { message: format!("sms has no method `{other}`") }),
            }
        })
    }
}

pub fn bundle(vendor_config: HashMap<String, String>) -> ServiceBundle {
    let registered = RegisteredService {
        descriptor: ServiceDescriptor::new("sms", 1, "SMS service"),
        methods: vec![MethodDescriptor::new("send", "POST", false)],
        providers: vec![ProviderDescriptor::new("_mocked_", ["send_sms"]), ProviderDescriptor::new("twilio", ["send_sms"])],
    };

    let mut providers = HashMap::new();
    providers.insert("_mocked_".to_string(), mocked_provider());
    providers.insert("twilio".to_string(), twilio_provider(vendor_config));

    ServiceBundle { registered, methods: Arc::new(SmsService), providers, strategy: Arc::new(RoundRobin) }
}
