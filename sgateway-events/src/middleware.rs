//! Billing and structured-logging middlewares.
//!
//! `StartTimeMiddleware` and `LoggerMiddleware` cooperate across a single
//! envelope: the former stashes a timestamp on ingress, the latter reads it
//! back on egress to compute processing time. They are declared as two
//! middlewares (not one) so the pipeline can insert other stages between
//! them if a deployment ever needs to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use sgateway_core::envelope::{Envelope, GatewayResponse};
use sgateway_core::error::GatewayError;
use sgateway_core::pipeline::Middleware;

use crate::bus::MessageBus;

const START_TIME_EXTENSION: &str = "_start_time";

fn now_millis() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs_f64() * 1000.0
}

pub struct StartTimeMiddleware;

impl Middleware for StartTimeMiddleware {
    fn name(&self) -> &'static str {
        "StartTimeMiddleware"
    }

    fn webhook_friendly(&self) -> bool {
        true
    }

    fn process_request<'a>(
        &'a self,
        envelope: &'a mut Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            envelope.add_extension(START_TIME_EXTENSION, Value::from(now_millis()));
            Ok(None)
        })
    }
}

pub struct LoggerMiddleware {
    bus: Option<Arc<dyn MessageBus>>,
}

impl LoggerMiddleware {
    pub fn new(bus: Option<Arc<dyn MessageBus>>) -> Self {
        Self { bus }
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "LoggerMiddleware"
    }

    fn webhook_friendly(&self) -> bool {
        true
    }

    fn process_response<'a>(
        &'a self,
        envelope: &'a mut Envelope,
        response: Option<GatewayResponse>,
        error: Option<&'a GatewayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let elapsed_ms = envelope.get_extension(START_TIME_EXTENSION).and_then(|v| v.as_f64()).map(|start| (now_millis() - start).max(0.0));
            envelope.add_loggable_property("processing_time", json!(elapsed_ms));

            let mut record = json!({
                "service": envelope.service.name,
                "version": envelope.service.version,
                "method": envelope.method.name,
                "protocol": if envelope.transport.scheme == "amqp" { "mq" } else { "http" },
                "request_fulfilled": response.as_ref().map(|r| r.request_fulfilled).unwrap_or(false),
                "processing_time": elapsed_ms,
            });
            let obj = record.as_object_mut().expect("record is always an object");
            for (name, value) in envelope.loggable_properties() {
                obj.insert(format!("prop_{name}"), value);
            }
            if let Some(err) = error {
                obj.insert("error_name".into(), Value::String(err.error_name().to_string()));
                obj.insert("error_msg".into(), Value::String(err.message().to_string()));
            }

            tracing::info!(record = %record, "service_request");

            if let Some(bus) = &self.bus {
                let routing_key = format!("sgateway.log.service_request.{}", envelope.service.name);
                if let Err(err) = bus.publish("sl.topic", &routing_key, record).await {
                    tracing::warn!(%err, "failed to publish service_request log to bus");
                }
            }

            Ok(None)
        })
    }
}

pub struct BillingMiddleware {
    price_list: HashMap<(String, String), f64>,
}

impl BillingMiddleware {
    pub fn new(price_list: HashMap<(String, String), f64>) -> Self {
        Self { price_list }
    }

    fn price_for(&self, service: &str, method: &str) -> Option<f64> {
        self.price_list.get(&(service.to_string(), method.to_string())).copied()
    }
}

impl Middleware for BillingMiddleware {
    fn name(&self) -> &'static str {
        "BillingMiddleware"
    }

    fn process_response<'a>(
        &'a self,
        envelope: &'a mut Envelope,
        response: Option<GatewayResponse>,
        _error: Option<&'a GatewayError>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(response) = response else { return Ok(None) };
            let Some(cost) = self.price_for(&envelope.service.name, &envelope.method.name) else { return Ok(None) };

            envelope.add_loggable_property("cost", json!(cost));
            let response = response.add_header("X-Request-Cost", cost.to_string()).add_header("X-Request-Cost-Currency", "USD");
            Ok(Some(response))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBus;
    use sgateway_core::descriptor::{MethodDescriptor, ServiceDescriptor};
    use sgateway_core::envelope::TransportRequest;
    use std::collections::HashMap as StdHashMap;

    fn envelope() -> Envelope {
        let transport = TransportRequest {
            headers: StdHashMap::new(),
            query: StdHashMap::new(),
            body: None,
            remote_addr: None,
            path: "/email/v1/send".into(),
            http_method: "POST",
            scheme: "https",
        };
        Envelope::new(transport, ServiceDescriptor::new("email", 1, "Email"), MethodDescriptor::new("send", "POST", false))
    }

    #[tokio::test]
    async fn logger_computes_elapsed_time_since_start_time() {
        let start = StartTimeMiddleware;
        let logger = LoggerMiddleware::new(None);
        let mut env = envelope();
        start.process_request(&mut env).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        logger.process_response(&mut env, Some(GatewayResponse::json(json!({}))), None).await.unwrap();
        let props = env.loggable_properties();
        let processing_time = props.iter().find(|(name, _)| name == "processing_time").unwrap();
        assert!(processing_time.1.as_f64().unwrap() >= 5.0);
    }

    #[tokio::test]
    async fn logger_publishes_to_bus_when_configured() {
        let bus = Arc::new(LocalBus::new());
        let logger = LoggerMiddleware::new(Some(bus.clone()));
        let mut env = envelope();
        logger.process_response(&mut env, Some(GatewayResponse::json(json!({}))), None).await.unwrap();
        let msgs = bus.published("sl.topic");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].routing_key, "sgateway.log.service_request.email");
    }

    #[tokio::test]
    async fn billing_attaches_headers_when_priced() {
        let mut price_list = HashMap::new();
        price_list.insert(("email".to_string(), "send".to_string()), 0.05);
        let mw = BillingMiddleware::new(price_list);
        let mut env = envelope();
        let response = mw.process_response(&mut env, Some(GatewayResponse::json(json!({}))), None).await.unwrap().unwrap();
        assert_eq!(response.extra_headers.get("X-Request-Cost").unwrap(), "0.05");
        assert_eq!(response.extra_headers.get("X-Request-Cost-Currency").unwrap(), "USD");
    }

    #[tokio::test]
    async fn billing_is_a_no_op_for_unpriced_methods() {
        let mw = BillingMiddleware::new(HashMap::new());
        let mut env = envelope();
        let result = mw.process_response(&mut env, Some(GatewayResponse::json(json!({}))), None).await.unwrap();
        assert!(result.is_none());
    }
}
