//! Assembles the concrete gateway: registry, dispatcher, and middleware
//! pipeline wired from `GatewaySettings`, plus the inbound MQ adapter that
//! runs the same pipeline over AMQP calls.

pub mod bootstrap;
pub mod mq;

pub use bootstrap::{build_app_state, Bootstrapped};
pub use mq::GatewayCallHandler;
