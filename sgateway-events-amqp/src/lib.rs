//! Real AMQP transport for `sgateway-events`'s `MessageBus`, plus the
//! `sgateway_calls` inbound queue adapter.

pub mod bus;
pub mod consumer;

pub use bus::AmqpBus;
pub use consumer::{declare_queue, CallHandler, CallMessage, HandlerError, QUEUE_NAME};
