//! Backend-agnostic idempotency store abstraction.
//!
//! This crate defines the pure abstraction for the gateway's idempotency
//! lock: `(key, scope)` pairs, lease TTLs, and the error type shared with
//! the concrete sqlx backend (`sgateway-data-sqlx`). The in-memory store
//! here is the real implementation used by `IS_LOCAL` and by tests; it is
//! not a mock standing in for the sqlx backend.

pub mod error;
pub mod idempotency;
pub mod memory;
pub mod middleware;

pub use error::DataError;
pub use idempotency::{IdempotencyStore, LockOutcome};
pub use memory::InMemoryIdempotencyStore;
pub use middleware::IdempotencyMiddleware;

pub mod prelude {
    pub use crate::{DataError, IdempotencyMiddleware, IdempotencyStore, InMemoryIdempotencyStore, LockOutcome};
}
