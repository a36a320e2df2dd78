//! Static descriptors: the data shape of what the registry indexes.
//!
//! These are plain data — constructing one does not register anything.
//! Registration is `Registry::register`, below in `registry.rs`.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub name: String,
    pub version: u32,
}

impl ServiceKey {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub name: String,
    pub version: u32,
    pub verbose_name: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, version: u32, verbose_name: impl Into<String>) -> Self {
        Self { name: name.into(), version, verbose_name: verbose_name.into() }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(self.name.clone(), self.version)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
}

impl HttpVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    pub name: String,
    pub http_method: HttpVerb,
    pub is_webhook: bool,
    pub request_schema: Option<Value>,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, http_method: &str, is_webhook: bool) -> Self {
        Self {
            name: name.into(),
            http_method: HttpVerb::parse(http_method).unwrap_or_else(|| panic!("unsupported HTTP method: {http_method}")),
            is_webhook,
            request_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.request_schema = Some(schema);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ProviderDescriptor {
    pub name: String,
    pub verbose_name: Option<String>,
    pub methods: std::collections::BTreeSet<String>,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, methods: impl IntoIterator<Item = &'static str>) -> Self {
        Self { name: name.into(), verbose_name: None, methods: methods.into_iter().map(String::from).collect() }
    }

    pub fn supports_all(&self, required: &[&str]) -> bool {
        required.iter().all(|m| self.methods.contains(*m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_keys_compare_by_name_and_version() {
        let a = ServiceKey::new("email", 1);
        let b = ServiceKey::new("email", 1);
        let c = ServiceKey::new("email", 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn provider_supports_all_requires_full_superset() {
        let provider = ProviderDescriptor::new("sendgrid", ["send_email", "send_bulk"]);
        assert!(provider.supports_all(&["send_email"]));
        assert!(provider.supports_all(&["send_email", "send_bulk"]));
        assert!(!provider.supports_all(&["send_email", "send_fax"]));
    }
}
