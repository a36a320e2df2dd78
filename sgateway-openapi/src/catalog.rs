//! Builds the two introspection responses directly from registry
//! descriptors, rather than a generic OpenAPI document — the gateway has
//! no need for a standalone spec file, only for clients to discover what a
//! service accepts.

use std::collections::HashMap;

use serde::Serialize;
use sgateway_core::descriptor::MethodDescriptor;
use sgateway_core::registry::{RegisteredService, Registry};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MethodSchema {
    pub http_method: &'static str,
    pub request_schema: Option<serde_json::Value>,
}

impl From<&MethodDescriptor> for MethodSchema {
    fn from(method: &MethodDescriptor) -> Self {
        Self { http_method: method.http_method.as_str(), request_schema: method.request_schema.clone() }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceSchema {
    pub name: String,
    pub version: u32,
    pub verbose_name: String,
    pub methods: HashMap<String, MethodSchema>,
}

impl From<&RegisteredService> for ServiceSchema {
    fn from(service: &RegisteredService) -> Self {
        Self {
            name: service.descriptor.name.clone(),
            version: service.descriptor.version,
            verbose_name: service.descriptor.verbose_name.clone(),
            methods: service.methods.iter().map(|m| (m.name.clone(), MethodSchema::from(m))).collect(),
        }
    }
}

/// `GET /services/_schema`: the full catalog.
pub fn catalog(registry: &Registry) -> Vec<ServiceSchema> {
    registry.get_services().iter().map(|service| ServiceSchema::from(service.as_ref())).collect()
}

/// `GET /services/{name}/v{version}`: one service's schema.
pub fn service_schema(registry: &Registry, name: &str, version: u32) -> Option<ServiceSchema> {
    registry.get_service(name, version).map(|service| ServiceSchema::from(service.as_ref()))
}
