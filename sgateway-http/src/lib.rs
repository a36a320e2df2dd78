//! Axum HTTP adapter: path routing, request-to-envelope construction,
//! response rendering, and the dispatch table tying a registered service
//! to its concrete implementation.

pub mod dispatch;
pub mod request;
pub mod response;
pub mod route;
pub mod routes;

pub use dispatch::{Dispatcher, ServiceInstance};
pub use routes::{router, AppState};
