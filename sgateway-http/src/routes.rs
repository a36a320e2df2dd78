//! Wires a single catch-all axum route to the gateway's own path grammar.
//!
//! A conventional per-segment axum router can't express `v{version}` (a
//! literal prefix glued to a dynamic segment) in one path component, so
//! every request is matched by hand in `route::parse` instead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use sgateway_core::error::{render, ErrorMode, GatewayError};
use sgateway_core::pipeline::Pipeline;
use sgateway_core::registry::Registry;

use crate::dispatch::Dispatcher;
use crate::request::build_envelope;
use crate::route::{parse, Route};

pub struct AppState {
    pub registry: Arc<Registry>,
    pub pipeline: Pipeline,
    pub dispatcher: Dispatcher,
    pub error_mode: ErrorMode,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = match parse(uri.path()) {
        Ok(route) => route,
        Err(err) => return render(&err, state.error_mode),
    };

    match route {
        Route::Catalog => {
            if method != Method::GET {
                return render(&GatewayError::ServiceNotFound { message: "catalog route only accepts GET".into() }, state.error_mode);
            }
            axum::Json(sgateway_openapi::catalog(&state.registry)).into_response()
        }
        Route::ServiceSchema { name, version } => {
            if method != Method::GET {
                return render(&GatewayError::ServiceNotFound { message: "service schema route only accepts GET".into() }, state.error_mode);
            }
            match sgateway_openapi::service_schema(&state.registry, &name, version) {
                Some(schema) => axum::Json(schema).into_response(),
                None => (StatusCode::NOT_FOUND, axum::Json(serde_json::json!({"message": "no such service"}))).into_response(),
            }
        }
        Route::Call { service, version, method: method_name, is_webhook } => {
            handle_call(&state, &service, version, &method_name, is_webhook, method, uri, headers, Some(addr.to_string()), body).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_call(
    state: &AppState,
    service: &str,
    version: u32,
    method_name: &str,
    is_webhook: bool,
    http_method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<String>,
    body: Bytes,
) -> Response {
    let Some(registered) = state.registry.get_service(service, version) else {
        return render(&GatewayError::ServiceNotFound { message: format!("no such service `{service}` v{version}") }, state.error_mode);
    };

    let mut envelope = match build_envelope(&registered, method_name, http_method, uri, headers, remote_addr, body, is_webhook) {
        Ok(envelope) => envelope,
        Err(err) => return render(&err, state.error_mode),
    };

    let (ingress_response, ingress_error) = state.pipeline.run_ingress(&mut envelope).await;

    let (response, error) = if ingress_error.is_none() && ingress_response.is_none() {
        match state.dispatcher.dispatch(&mut envelope).await {
            Ok(response) => (Some(response), None),
            Err(err) => (None, Some(err)),
        }
    } else {
        (ingress_response, ingress_error)
    };

    let (response, error) = state.pipeline.run_egress(&mut envelope, response, error).await;

    match (response, error) {
        (_, Some(err)) => render(&err, state.error_mode),
        (Some(response), None) => crate::response::render(response),
        (None, None) => render(&GatewayError::Internal { message: "no middleware produced a response".into(), details: None }, state.error_mode),
    }
}
