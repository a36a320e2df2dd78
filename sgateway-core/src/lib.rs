pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod service;
pub mod strategy;

pub use config::{ConfigError, GatewayConfig, GatewaySettings};
pub use descriptor::{HttpVerb, MethodDescriptor, ProviderDescriptor, ServiceDescriptor, ServiceKey};
pub use envelope::{Envelope, GatewayResponse, LazyProperty, TransportRequest};
pub use error::{mask_non_domain, render, ErrorMode, GatewayError};
pub use pipeline::{Middleware, Pipeline};
pub use provider::{Provider, ProviderOutcome, ProviderResult};
pub use registry::{current, RegisteredService, Registry, RegistryScope, ServiceLocals};
pub use service::{ServiceBase, ServiceContext, ServiceMethods};
pub use strategy::{AvailabilityCheck, DomainRegistrant, DomesticSale, RoundRobin, SelectionStrategy};
