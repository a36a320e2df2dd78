pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, JwtValidator, ParsedClaims};
pub use middleware::AuthMiddleware;
