//! Transport-neutral request/response carrier.
//!
//! `Envelope` is what the HTTP and MQ adapters both produce from their own
//! wire format and what the pipeline, the service base, and every
//! middleware operate on. Nothing downstream of adapter construction knows
//! whether the call arrived over HTTP or off a queue.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::descriptor::{MethodDescriptor, ServiceDescriptor};
use crate::error::GatewayError;

/// The inbound side of a call: headers, query args, body, and everything a
/// middleware needs to decide or annotate, regardless of transport.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
    pub remote_addr: Option<String>,
    pub path: String,
    pub http_method: &'static str,
    pub scheme: &'static str,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_arg(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }
}

/// A value resolved once and shared by every subsequent reader. Models the
/// spec's "lazy envelope property that may await": the first caller
/// computes under a lock, later callers observe the cached result rather
/// than racing a second resolution.
#[derive(Clone)]
pub struct LazyProperty<T: Clone + Send + Sync + 'static> {
    cell: Arc<OnceCell<T>>,
    source: Arc<dyn Fn() -> Pin<Box<dyn Future<Output = T> + Send>> + Send + Sync>,
}

impl<T: Clone + Send + Sync + 'static> LazyProperty<T> {
    pub fn new<F, Fut>(source: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self { cell: Arc::new(OnceCell::new()), source: Arc::new(move || Box::pin(source())) }
    }

    pub fn from_value(value: T) -> Self {
        Self::new(move || {
            let value = value.clone();
            async move { value }
        })
    }

    /// Resolve and cache on first call; concurrent callers await the same
    /// in-flight future rather than each starting their own.
    pub async fn get(&self) -> T {
        self.cell.get_or_init(|| (self.source)()).await.clone()
    }
}

/// Request envelope: everything a middleware or service method can read or
/// annotate for one in-flight call.
pub struct Envelope {
    pub transport: TransportRequest,
    pub service: ServiceDescriptor,
    pub method: MethodDescriptor,
    pub is_webhook: bool,
    extensions: HashMap<String, Value>,
    lazy: HashMap<String, LazyProperty<Value>>,
    loggable: Vec<(String, Value)>,
}

impl Envelope {
    pub fn new(transport: TransportRequest, service: ServiceDescriptor, method: MethodDescriptor) -> Self {
        let is_webhook = method.is_webhook;
        Self {
            transport,
            service,
            method,
            is_webhook,
            extensions: HashMap::new(),
            lazy: HashMap::new(),
            loggable: Vec::new(),
        }
    }

    pub fn path_repr(&self) -> String {
        format!("{}.v{}.{}", self.service.name, self.service.version, self.method.name)
    }

    pub fn add_extension(&mut self, key: impl Into<String>, value: Value) {
        self.extensions.insert(key.into(), value);
    }

    pub fn get_extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    pub fn require_extension(&self, key: &str) -> Result<&Value, GatewayError> {
        self.get_extension(key)
            .ok_or_else(|| GatewayError::Internal { message: format!("required extension `{key}` is absent"), details: None })
    }

    pub fn add_lazy_property(&mut self, name: impl Into<String>, property: LazyProperty<Value>) {
        self.lazy.insert(name.into(), property);
    }

    /// Resolve a lazy property by name. Returns `None` if nothing was
    /// published under that name (distinct from the property resolving to
    /// JSON `null`).
    pub async fn get_lazy_property(&self, name: &str) -> Option<Value> {
        match self.lazy.get(name) {
            Some(prop) => Some(prop.get().await),
            None => None,
        }
    }

    pub fn add_loggable_property(&mut self, name: impl Into<String>, value: Value) {
        self.loggable.push((name.into(), value));
    }

    /// Flattened view: later entries with the same name win, declaration
    /// order otherwise preserved for first occurrence.
    pub fn loggable_properties(&self) -> Vec<(String, Value)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut out: Vec<(String, Value)> = Vec::new();
        for (name, value) in &self.loggable {
            if let Some(&idx) = seen.get(name.as_str()) {
                out[idx].1 = value.clone();
            } else {
                seen.insert(name.as_str(), out.len());
                out.push((name.clone(), value.clone()));
            }
        }
        out
    }

    /// GET → query args as a JSON object; otherwise the parsed body.
    /// Validation against a JSON schema is the caller's responsibility
    /// (kept in `sgateway-services`, since `jsonschema`-style validation is
    /// only needed by the handful of services that declare a schema).
    pub fn get_data(&self) -> Value {
        if self.transport.http_method == "GET" {
            let map: serde_json::Map<String, Value> =
                self.transport.query.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
            Value::Object(map)
        } else {
            self.transport.body.clone().unwrap_or(Value::Null)
        }
    }
}

/// Response envelope returned by a service method, possibly rewritten by
/// egress middlewares.
#[derive(Clone, Debug, Default)]
pub struct GatewayResponse {
    pub response_data: Value,
    pub request_fulfilled: bool,
    pub extra_headers: HashMap<String, String>,
    pub status_code: Option<u16>,
    pub extra_params: HashMap<String, Value>,
}

impl GatewayResponse {
    pub fn json(data: Value) -> Self {
        Self { response_data: data, request_fulfilled: true, ..Default::default() }
    }

    pub fn unfulfilled(data: Value) -> Self {
        Self { response_data: data, request_fulfilled: false, ..Default::default() }
    }

    pub fn add_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_params.insert(key.into(), value);
        self
    }

    pub fn global_cache(&self) -> bool {
        self.extra_params.get("global_cache").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}
