//! Message bus abstraction and the logging/billing middleware pair that
//! publishes to it.
//!
//! The AMQP-backed implementation lives in `sgateway-events-amqp`; this
//! crate only knows about the `MessageBus` trait and an in-memory backend
//! good enough for tests and the `IS_LOCAL` profile.

pub mod bus;
pub mod local;
pub mod middleware;

pub use bus::{BusError, MessageBus};
pub use local::{LocalBus, PublishedMessage};
pub use middleware::{BillingMiddleware, LoggerMiddleware, StartTimeMiddleware};

pub mod prelude {
    pub use crate::{BillingMiddleware, BusError, LocalBus, LoggerMiddleware, MessageBus, StartTimeMiddleware};
}
