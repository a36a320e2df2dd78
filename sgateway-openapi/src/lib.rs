//! Service catalog introspection: `GET /services/_schema` and
//! `GET /services/{name}/v{version}`.

pub mod catalog;

pub use catalog::{catalog, service_schema, MethodSchema, ServiceSchema};
