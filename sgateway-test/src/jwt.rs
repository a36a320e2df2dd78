//! Mints HS256 tokens matching `sgateway_auth::JwtValidator`'s claim shape,
//! so tests can drive authenticated requests without a real auth provider.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

#[derive(Serialize)]
struct Claims {
    entity_id: Option<i64>,
    user_id: Option<i64>,
    exp: usize,
}

/// Bound to a single signing secret; `token()` covers the common case,
/// `builder()` the edge cases (missing claim, expired, wrong key).
pub struct TestJwt {
    secret: String,
}

impl TestJwt {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn token(&self, entity_id: i64) -> String {
        self.builder().entity_id(entity_id).build()
    }

    pub fn builder(&self) -> TokenBuilder {
        TokenBuilder::new(self.secret.clone())
    }
}

pub struct TokenBuilder {
    secret: String,
    entity_id: Option<i64>,
    user_id: Option<i64>,
    expires_in_secs: i64,
}

impl TokenBuilder {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into(), entity_id: None, user_id: None, expires_in_secs: 3600 }
    }

    pub fn entity_id(mut self, entity_id: i64) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// A negative value mints a token that is already expired.
    pub fn expires_in(mut self, secs: i64) -> Self {
        self.expires_in_secs = secs;
        self
    }

    pub fn build(self) -> String {
        let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs() as i64;
        let exp = (now + self.expires_in_secs).max(0) as usize;
        let claims = Claims { entity_id: self.entity_id, user_id: self.user_id, exp };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret.as_bytes())).unwrap()
    }
}
