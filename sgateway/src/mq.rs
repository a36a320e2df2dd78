//! Inbound AMQP call adapter: runs the same pipeline/dispatcher as HTTP,
//! over a synthetic envelope built from one `sgateway_calls` message.

use std::pin::Pin;
use std::sync::Arc;

use sgateway_core::descriptor::ServiceDescriptor;
use sgateway_core::envelope::{Envelope, TransportRequest};
use sgateway_core::error::GatewayError;
use sgateway_events_amqp::{CallHandler, CallMessage, HandlerError};
use sgateway_http::AppState;

/// Mirrors the original's synthetic `GatewayMQRequest`: no real HTTP
/// connection backs this call, so the scheme is `amqp` and the path is the
/// queue name rather than a URL.
const MQ_PATH: &str = "//sgateway_calls";

pub struct GatewayCallHandler {
    state: Arc<AppState>,
}

impl GatewayCallHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn dispatch(&self, call: &CallMessage) -> Result<(), GatewayError> {
        let registered = self
            .state
            .registry
            .get_service(&call.service, call.version)
            .ok_or_else(|| GatewayError::ServiceNotFound { message: format!("no such service `{}` v{}", call.service, call.version) })?;
        let method = registered
            .method(&call.method)
            .cloned()
            .ok_or_else(|| GatewayError::ServiceNotFound { message: format!("`{}` has no method `{}`", call.service, call.method) })?;

        let transport = TransportRequest {
            headers: Default::default(),
            query: Default::default(),
            body: Some(call.payload.clone()),
            remote_addr: None,
            path: MQ_PATH.to_string(),
            http_method: method.http_method.as_str(),
            scheme: "amqp",
        };
        let service = ServiceDescriptor::new(registered.descriptor.name.clone(), registered.descriptor.version, registered.descriptor.verbose_name.clone());
        let mut envelope = Envelope::new(transport, service, method);

        let (ingress_response, ingress_error) = self.state.pipeline.run_ingress(&mut envelope).await;
        let (response, error) = if ingress_error.is_none() && ingress_response.is_none() {
            match self.state.dispatcher.dispatch(&mut envelope).await {
                Ok(response) => (Some(response), None),
                Err(err) => (None, Some(err)),
            }
        } else {
            (ingress_response, ingress_error)
        };
        let (_response, error) = self.state.pipeline.run_egress(&mut envelope, response, error).await;

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl CallHandler for GatewayCallHandler {
    fn handle<'a>(&'a self, call: &'a CallMessage) -> Pin<Box<dyn std::future::Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.dispatch(call)
                .await
                .map_err(|err| HandlerError { message: err.message().to_string(), client_retry: err.client_retry() })
        })
    }
}
