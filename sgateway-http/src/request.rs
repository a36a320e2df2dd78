//! Builds an `Envelope` from one inbound axum request.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};
use serde_json::Value;
use sgateway_core::descriptor::{MethodDescriptor, ServiceDescriptor};
use sgateway_core::envelope::{Envelope, TransportRequest};
use sgateway_core::error::GatewayError;
use sgateway_core::registry::RegisteredService;

fn query_map(uri: &Uri) -> HashMap<String, String> {
    uri.query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
        .collect()
}

fn parse_body(method: &Method, bytes: &Bytes) -> Result<Option<Value>, GatewayError> {
    if method == Method::GET || bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|err| GatewayError::bad_request(format!("request body is not valid JSON: {err}")))
}

/// `registered` is looked up by the caller (it needs the registry anyway
/// for the error it raises when absent); this only needs the method
/// descriptor and verb to validate the request against it.
pub fn build_envelope(
    registered: &RegisteredService,
    requested_method: &str,
    http_method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<String>,
    body: Bytes,
    is_webhook_route: bool,
) -> Result<Envelope, GatewayError> {
    let method = registered
        .method(requested_method)
        .cloned()
        .ok_or_else(|| GatewayError::ServiceNotFound { message: format!("`{}` has no method `{requested_method}`", registered.descriptor.name) })?;

    if method.is_webhook != is_webhook_route {
        return Err(GatewayError::ServiceNotFound { message: format!("`{requested_method}` is not reachable under this path") });
    }
    if method.http_method.as_str() != http_method.as_str() {
        return Err(GatewayError::ServiceNotFound { message: format!("`{requested_method}` does not accept {http_method}") });
    }

    let scheme: &'static str = if http_method == Method::GET { "https" } else { "https" };
    let http_method_str: &'static str = match http_method {
        Method::GET => "GET",
        Method::POST => "POST",
        _ => return Err(GatewayError::ServiceNotFound { message: format!("unsupported HTTP method {http_method}") }),
    };

    let transport = TransportRequest {
        headers: header_map(&headers),
        query: query_map(&uri),
        body: parse_body(&http_method, &body)?,
        remote_addr,
        path: uri.path().to_string(),
        http_method: http_method_str,
        scheme,
    };

    let service = ServiceDescriptor::new(registered.descriptor.name.clone(), registered.descriptor.version, registered.descriptor.verbose_name.clone());
    Ok(Envelope::new(transport, service, method))
}
