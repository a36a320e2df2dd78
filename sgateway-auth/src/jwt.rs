//! HS256 claims validation against the gateway's own internal signing key.
//!
//! No JWKS, no issuer/audience checks, no key rotation — the token this
//! middleware verifies is minted by the gateway's own auth flow for its own
//! callers, not a third-party identity provider's.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Claims {
    entity_id: Option<i64>,
    user_id: Option<i64>,
}

#[derive(Debug)]
pub struct ParsedClaims {
    pub entity_id: i64,
    pub user_id: Option<i64>,
}

#[derive(Debug)]
pub enum JwtError {
    Malformed(String),
    MissingEntityId,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed token: {msg}"),
            Self::MissingEntityId => write!(f, "token is missing the required `entity_id` claim"),
        }
    }
}

/// Validates a bearer token against a static HS256 key.
///
/// A zero `entity_id` is coerced to `1` rather than rejected — this
/// reproduces a defect in the system this gateway replaces (a falsy check
/// that was meant to test for absence matched `0` too) and is kept exactly
/// as observed rather than silently fixed, since callers may already depend
/// on it. It is flagged here, not hidden behind a comment claiming it is
/// intentional design.
pub struct JwtValidator {
    key: DecodingKey,
}

impl JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_ref()) }
    }

    pub fn validate(&self, token: &str) -> Result<ParsedClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.key, &validation).map_err(|e| JwtError::Malformed(e.to_string()))?;

        let entity_id = data.claims.entity_id.ok_or(JwtError::MissingEntityId)?;
        let entity_id = if entity_id == 0 { 1 } else { entity_id };

        Ok(ParsedClaims { entity_id, user_id: data.claims.user_id })
    }
}

impl From<&ParsedClaims> for Value {
    fn from(claims: &ParsedClaims) -> Self {
        serde_json::json!({ "entity_id": claims.entity_id, "user_id": claims.user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, entity_id: Option<i64>, user_id: Option<i64>) -> String {
        #[derive(serde::Serialize)]
        struct Out {
            entity_id: Option<i64>,
            user_id: Option<i64>,
            exp: usize,
        }
        let exp = (std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs() + 3600) as usize;
        encode(&Header::new(Algorithm::HS256), &Out { entity_id, user_id, exp }, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_token_round_trips_claims() {
        let validator = JwtValidator::new("secret");
        let tok = token("secret", Some(42), Some(7));
        let claims = validator.validate(&tok).unwrap();
        assert_eq!(claims.entity_id, 42);
        assert_eq!(claims.user_id, Some(7));
    }

    #[test]
    fn zero_entity_id_is_coerced_to_one() {
        let validator = JwtValidator::new("secret");
        let tok = token("secret", Some(0), None);
        let claims = validator.validate(&tok).unwrap();
        assert_eq!(claims.entity_id, 1);
    }

    #[test]
    fn missing_entity_id_is_rejected() {
        let validator = JwtValidator::new("secret");
        let tok = token("secret", None, None);
        assert!(matches!(validator.validate(&tok), Err(JwtError::MissingEntityId)));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let validator = JwtValidator::new("secret");
        let tok = token("other-secret", Some(1), None);
        assert!(matches!(validator.validate(&tok), Err(JwtError::Malformed(_))));
    }
}
