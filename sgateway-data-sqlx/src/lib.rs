//! Postgres backend for the gateway's idempotency lock.
//!
//! Depends on [`sgateway_data`] for the abstract `IdempotencyStore` trait
//! and `DataError`, and adds the `Tx`/`HasPool` transaction idiom plus the
//! concrete `SELECT ... FOR UPDATE` implementation.

pub mod error;
pub mod idempotency;
pub mod tx;

pub use error::{SqlxErrorExt, SqlxResult};
pub use idempotency::PgIdempotencyStore;
pub use tx::{HasPool, Tx};

pub mod prelude {
    pub use crate::{HasPool, PgIdempotencyStore, SqlxErrorExt, Tx};
    pub use sgateway_data::prelude::*;
}
