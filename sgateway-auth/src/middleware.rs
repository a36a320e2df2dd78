//! `AuthMiddleware`: reads `Authorization`, validates the bearer token,
//! publishes `entity_id`/`user_id` for downstream middlewares and services.

use sgateway_core::envelope::{Envelope, GatewayResponse, LazyProperty};
use sgateway_core::error::GatewayError;
use sgateway_core::pipeline::Middleware;

use crate::jwt::{JwtError, JwtValidator};

/// `IS_LOCAL` lets development environments skip authentication entirely
/// and run as a fixed default identity — never enabled in production
/// configuration.
pub struct AuthMiddleware {
    validator: JwtValidator,
    is_local: bool,
}

impl AuthMiddleware {
    pub fn new(secret: impl AsRef<[u8]>, is_local: bool) -> Self {
        Self { validator: JwtValidator::new(secret), is_local }
    }

    fn accepted_token(header: &str) -> Option<&str> {
        for prefix in ["Bearer ", "Token "] {
            if let Some(rest) = header.strip_prefix(prefix) {
                return Some(rest.trim());
            }
        }
        None
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "AuthMiddleware"
    }

    fn process_request<'a>(
        &'a self,
        envelope: &'a mut Envelope,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<GatewayResponse>, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let header = envelope.transport.header("Authorization").map(str::to_owned);

            let Some(header) = header else {
                if self.is_local {
                    envelope.add_lazy_property("entity_id", LazyProperty::from_value(serde_json::Value::from(1)));
                    envelope.add_loggable_property("entity_id", serde_json::Value::from(1));
                    return Ok(None);
                }
                return Err(GatewayError::Unauthorized { message: "no Authorization header was presented".into() });
            };

            let Some(token) = Self::accepted_token(&header) else {
                return Err(GatewayError::TokenMalformed { message: "Authorization header is neither Bearer nor Token".into() });
            };

            let claims = self.validator.validate(token).map_err(|err| match err {
                JwtError::MissingEntityId => GatewayError::TokenMalformed { message: err.to_string() },
                JwtError::Malformed(_) => GatewayError::TokenMalformed { message: err.to_string() },
            })?;

            envelope.add_lazy_property("entity_id", LazyProperty::from_value(serde_json::Value::from(claims.entity_id)));
            envelope.add_loggable_property("entity_id", serde_json::Value::from(claims.entity_id));
            if let Some(user_id) = claims.user_id {
                envelope.add_lazy_property("user_id", LazyProperty::from_value(serde_json::Value::from(user_id)));
            }
            Ok(None)
        })
    }
}
