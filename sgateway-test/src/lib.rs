mod app;
mod jwt;
mod path;

pub use app::{TestApp, TestRequest, TestResponse};
pub use jwt::{TestJwt, TokenBuilder};
pub use path::{resolve_path, tokenize_path, PathToken};
