//! Email delivery: `send` over a failover chain of vendor adapters, plus a
//! webhook `callback` the vendors post delivery-status events to.
//!
//! The vendor adapters model request-shape transformation and failure
//! mapping only — no HTTP call is made against a live upstream (contract
//! only), matching the gateway's own scope: it mediates through typed
//! provider adapters, it doesn't ship concrete upstream HTTP clients.

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

fn validate(data: &Value) -> Result<(), GatewayError> {
    let to = data.get("to").and_then(Value::as_str);
    if to.map(str::is_empty).unwrap_or(true) {
        return Err(GatewayError::bad_request_field("`to` is required", "to"));
    }
    if data.get("subject").and_then(Value::as_str).is_none() {
        return Err(GatewayError::bad_request_field("`subject` is required", "subject"));
    }
    if data.get("body_plain_text").is_none() && data.get("body_html").is_none() {
        return Err(GatewayError::bad_request("one of `body_plain_text` or `body_html` is required"));
    }
    Ok(())
}

/// Reshapes the gateway's generic message fields into SendGrid's
/// `personalizations`/`content` request body.
fn sendgrid_payload(data: &Value) -> Value {
    let mut content = Vec::new();
    if let Some(text) = data.get("body_plain_text") {
        content.push(json!({"type": "text/plain", "value": text}));
    }
    if let Some(html) = data.get("body_html") {
        content.push(json!({"type": "text/html", "value": html}));
    }
    json!({
        "from": data.get("from_email"),
        "reply_to": data.get("reply_to"),
        "personalizations": [{
            "subject": data.get("subject"),
            "to": data.get("to"),
            "cc": data.get("cc"),
            "bcc": data.get("bcc"),
        }],
        "content": content,
    })
}

/// Mailgun is form-encoded, not JSON, and drops null fields entirely —
/// modeled here as a JSON object with nulls stripped.
fn mailgun_payload(data: &Value) -> Value {
    let mut fields = serde_json::Map::new();
    for (out_key, in_key) in [("from", "from_email"), ("to", "to"), ("cc", "cc"), ("bcc", "bcc"), ("subject", "subject"), ("text", "body_plain_text"), ("html", "body_html")] {
        if let Some(value) = data.get(in_key) {
            if !value.is_null() {
                fields.insert(out_key.to_string(), value.clone());
            }
        }
    }
    Value::Object(fields)
}

fn postmark_payload(data: &Value, sender: &str) -> Value {
    json!({
        "From": sender,
        "To": data.get("to"),
        "Cc": data.get("cc"),
        "Bcc": data.get("bcc"),
        "Subject": data.get("subject"),
        "TextBody": data.get("body_plain_text"),
        "HtmlBody": data.get("body_html"),
    })
}

fn require_config(config: &HashMap<String, String>, key: &str) -> ProviderResult<String> {
    config.get(key).cloned().ok_or_else(|| {
        ProviderOutcome::Domain(GatewayError::ConfigurationError { message: format!("missing required config key `{key}`") })
    })
}

fn mocked_provider() -> Provider {
    Provider::new("_mocked_").with_method("send", |_data| Box::pin(async { Ok(json!({"sent": true})) }))
}

fn sendgrid_provider(config: HashMap<String, String>) -> Provider {
    Provider::new("sendgrid").with_method("send", move |data| {
        let config = config.clone();
        let payload = sendgrid_payload(data);
        Box::pin(async move {
            require_config(&config, "SENDGRID_API_KEY")?;
            Ok(json!({"sent": true, "vendor_payload": payload}))
        })
    })
}

fn mailgun_provider(config: HashMap<String, String>) -> Provider {
    Provider::new("mailgun").with_method("send", move |data| {
        let config = config.clone();
        let payload = mailgun_payload(data);
        Box::pin(async move {
            require_config(&config, "MAILGUN_DOMAIN")?;
            require_config(&config, "MAILGUN_API_KEY")?;
            Ok(json!({"sent": true, "vendor_payload": payload}))
        })
    })
}

fn postmark_provider(config: HashMap<String, String>) -> Provider {
    Provider::new("postmark").with_method("send", move |data| {
        let config = config.clone();
        let data = data.clone();
        Box::pin(async move {
            require_config(&config, "POSTMARK_API_KEY")?;
            let sender = require_config(&config, "POSTMARK_SENDER")?;
            Ok(json!({"sent": true, "vendor_payload": postmark_payload(&data, &sender)}))
        })
    })
}

struct EmailService;

impl ServiceMethods for EmailService {
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
                    let result = ctx.call_with_failover(envelope, &["send"], "send", &data).await?;
                    if !result.get("sent").and_then(Value::as_bool).unwrap_or(false) {
                        return Err(GatewayError::ServiceInternal { message: "sorry, can't send the email".into() });
                    }
                    Ok(GatewayResponse::json(json!({"sent": true})))
                }
                "callback" => Ok(GatewayResponse::json(json!({}))),
                other => Err(GatewayError::ConfigurationError { message: format!("email has no method `{other}`") }),
            }
        })
    }
}

pub fn bundle(vendor_config: HashMap<String, String>) -> ServiceBundle {
    let registered = RegisteredService {
        descriptor: ServiceDescriptor::new("email", 1, "Emails service"),
        methods: vec![MethodDescriptor::new("send", "POST", false), MethodDescriptor::new("callback", "POST", true)],
        providers: vec![
            ProviderDescriptor::new("_mocked_", ["send"]),
            ProviderDescriptor::new("sendgrid", ["send"]),
            ProviderDescriptor::new("mailgun", ["send"]),
            ProviderDescriptor::new("postmark", ["send"]),
        ],
    };

    let mut providers = HashMap::new();
    providers.insert("_mocked_".to_string(), mocked_provider());
    providers.insert("sendgrid".to_string(), sendgrid_provider(vendor_config.clone()));
    providers.insert("mailgun".to_string(), mailgun_provider(vendor_config.clone()));
    providers.insert("postmark".to_string(), postmark_provider(vendor_config));

    ServiceBundle { registered, methods: Arc::new(EmailService), providers, strategy: Arc::new(RoundRobin) }
}
