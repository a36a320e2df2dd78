//! The gateway's error taxonomy.
//!
//! One enum carries every domain error the core and its middlewares can
//! raise. Each variant knows its HTTP status, its stable three-digit error
//! code, its name (used in the JSON body and in tests), and whether a
//! retry is worth suggesting to the caller. Non-domain errors (a database
//! driver error, a serialization bug) are folded into `Internal` at the
//! boundary via `From` impls — nothing downstream of this module should
//! need to pattern-match on `sqlx::Error` or `serde_json::Error` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Whether the outermost handler should mask error details (production) or
/// let them through verbatim (debug). Carried by the caller, not global
/// state, so tests can exercise both branches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorMode {
    Debug,
    Production,
}

#[derive(Debug)]
pub enum GatewayError {
    /// 400 — malformed input; `error_path`/`error_message` describe the bad field.
    BadRequest { message: String, error_path: Option<String> },
    /// 400 — an idempotency key collided with a row still inside its TTL window.
    RequestIdempotencyError { message: String, remaining_seconds: i64 },
    /// 401 — no credentials were presented where they were required.
    Unauthorized { message: String },
    /// 401 — credentials were presented but do not identify a known caller.
    Unauthenticated { message: String },
    /// 403 — the bearer token could not be decoded as a valid JWT.
    TokenMalformed { message: String },
    /// 403 — the caller is authenticated but not entitled to this action.
    ServiceRestricted { message: String },
    /// 404 — no such `(service, version)` is registered.
    ServiceNotFound { message: String },
    /// 429 — generic quota exceeded (not split by total/service).
    QuotaExceeded { message: String },
    /// 429 — the tenant's total request quota is exhausted.
    TotalQuotaExceeded { message: String },
    /// 429 — the tenant's per-service quota is exhausted.
    ServiceQuotaExceeded { message: String },
    /// 500 — unexpected internal fault. `details` is only ever shown in debug mode.
    Internal { message: String, details: Option<serde_json::Value> },
    /// 500 — a service method failed for a reason specific to its own logic.
    ServiceInternal { message: String },
    /// 500 — a provider method raised something that wasn't already a domain error.
    ProviderError { message: String },
    /// 500 — no eligible provider could be acquired for this call.
    ProviderUnavailable { message: String },
    /// 500 — a required configuration value is missing or invalid.
    ConfigurationError { message: String },
    /// 500 (client_retry=true) — every provider in the failover set failed.
    FailoverFail { message: String },
}

impl GatewayError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), error_path: None }
    }

    pub fn bad_request_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into(), error_path: Some(field.into()) }
    }

    /// The three-digit code exposed via `X-Error-Code` and the JSON body. Stable
    /// across releases — do not renumber an existing variant.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Internal { .. } => "000",
            Self::Unauthorized { .. } => "001",
            Self::Unauthenticated { .. } => "002",
            Self::TokenMalformed { .. } => "003",
            Self::ServiceNotFound { .. } => "004",
            Self::ProviderUnavailable { .. } => "005",
            Self::ServiceRestricted { .. } => "006",
            Self::BadRequest { .. } | Self::RequestIdempotencyError { .. } => "007",
            Self::ProviderError { .. } => "008",
            Self::ConfigurationError { .. } => "009",
            Self::ServiceInternal { .. } => "000",
            Self::FailoverFail { .. } => "010",
            Self::QuotaExceeded { .. } => "020",
            Self::TotalQuotaExceeded { .. } => "021",
            Self::ServiceQuotaExceeded { .. } => "022",
        }
    }

    /// The PascalCase name used in the `error_name` JSON field and in tests,
    /// matching the original taxonomy's exception class names.
    pub fn error_name(&self) -> &'static str {
        match self {
            Self::Internal { .. } => "InternalError",
            Self::Unauthorized { .. } => "UnauthorizedApiException",
            Self::Unauthenticated { .. } => "UnauthenticatedApiException",
            Self::TokenMalformed { .. } => "TokenMalformed",
            Self::ServiceNotFound { .. } => "ServiceNotFound",
            Self::ProviderUnavailable { .. } => "ProviderUnavailable",
            Self::ServiceRestricted { .. } => "ServiceRestricted",
            Self::BadRequest { .. } => "ServiceBadRequestError",
            Self::RequestIdempotencyError { .. } => "RequestIdempotencyError",
            Self::ProviderError { .. } => "ProviderError",
            Self::ConfigurationError { .. } => "ConfigurationError",
            Self::ServiceInternal { .. } => "ServiceInternalError",
            Self::FailoverFail { .. } => "FailoverFailError",
            Self::QuotaExceeded { .. } => "QuotaExceeded",
            Self::TotalQuotaExceeded { .. } => "TotalQuotaExceeded",
            Self::ServiceQuotaExceeded { .. } => "ServiceQuotaExceeded",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::RequestIdempotencyError { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } | Self::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Self::TokenMalformed { .. } | Self::ServiceRestricted { .. } => StatusCode::FORBIDDEN,
            Self::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::QuotaExceeded { .. }
            | Self::TotalQuotaExceeded { .. }
            | Self::ServiceQuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. }
            | Self::ServiceInternal { .. }
            | Self::ProviderError { .. }
            | Self::ProviderUnavailable { .. }
            | Self::ConfigurationError { .. }
            | Self::FailoverFail { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the MQ adapter should requeue (`true`) or abandon (`false`)
    /// the message that produced this error, and whether the HTTP body
    /// should suggest the client retry.
    pub fn client_retry(&self) -> bool {
        matches!(self, Self::FailoverFail { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::RequestIdempotencyError { message, .. }
            | Self::Unauthorized { message }
            | Self::Unauthenticated { message }
            | Self::TokenMalformed { message }
            | Self::ServiceRestricted { message }
            | Self::ServiceNotFound { message }
            | Self::QuotaExceeded { message }
            | Self::TotalQuotaExceeded { message }
            | Self::ServiceQuotaExceeded { message }
            | Self::Internal { message, .. }
            | Self::ServiceInternal { message }
            | Self::ProviderError { message }
            | Self::ProviderUnavailable { message }
            | Self::ConfigurationError { message }
            | Self::FailoverFail { message } => message,
        }
    }

    /// Render the JSON body the way the outermost handler does: domain errors
    /// pass through with their own status/code; in `Production` mode a
    /// non-`Internal` wrapping is never applied here (that wrapping happens
    /// one level up, for genuinely non-domain failures — see `render`).
    pub fn to_json(&self, mode: ErrorMode) -> serde_json::Value {
        let mut body = json!({
            "message": self.message(),
            "description": self.message(),
            "error_code": self.error_code(),
            "error_name": self.error_name(),
            "retry_suggested": self.client_retry(),
        });
        match self {
            Self::BadRequest { error_path, .. } => {
                if let Some(path) = error_path {
                    body["error_path"] = json!(path);
                }
            }
            Self::RequestIdempotencyError { remaining_seconds, .. } => {
                body["retry_after_seconds"] = json!(remaining_seconds);
            }
            Self::Internal { details, .. } if mode == ErrorMode::Debug => {
                if let Some(details) = details {
                    body["error_details"] = details.clone();
                }
            }
            _ => {}
        }
        body
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_name(), self.message())
    }
}

impl std::error::Error for GatewayError {}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal { message: "serialization failure".into(), details: Some(json!(err.to_string())) }
    }
}

/// The default `IntoResponse` impl always renders in `Production` mode —
/// adapters that want debug-mode detail should call `render` explicitly
/// with the configured `ErrorMode` instead of relying on this blanket impl.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        render(&self, ErrorMode::Production)
    }
}

/// Render any error — domain or not — into the gateway's JSON error shape.
/// Non-domain errors are masked as `Internal` in `Production` mode and
/// surfaced with their original message in `Debug` mode, per the taxonomy's
/// propagation rule.
pub fn render(error: &GatewayError, mode: ErrorMode) -> Response {
    let body = error.to_json(mode);
    let mut response = (error.status(), axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert("X-Error-Code", error.error_code().parse().expect("error codes are ASCII digits"));
    response
}

/// Wrap a non-domain failure (anything that isn't already a `GatewayError`)
/// the way the outermost error handler does.
pub fn mask_non_domain(source: impl std::fmt::Display, mode: ErrorMode) -> GatewayError {
    match mode {
        ErrorMode::Debug => GatewayError::Internal { message: source.to_string(), details: None },
        ErrorMode::Production => {
            GatewayError::Internal { message: "Internal server error".into(), details: Some(json!({ "error_details": source.to_string() })) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<GatewayError> {
        vec![
            GatewayError::bad_request("bad"),
            GatewayError::RequestIdempotencyError { message: "dup".into(), remaining_seconds: 10 },
            GatewayError::Unauthorized { message: "no token".into() },
            GatewayError::Unauthenticated { message: "unknown caller".into() },
            GatewayError::TokenMalformed { message: "bad jwt".into() },
            GatewayError::ServiceRestricted { message: "nope".into() },
            GatewayError::ServiceNotFound { message: "no such service".into() },
            GatewayError::QuotaExceeded { message: "quota".into() },
            GatewayError::TotalQuotaExceeded { message: "total quota".into() },
            GatewayError::ServiceQuotaExceeded { message: "service quota".into() },
            GatewayError::Internal { message: "boom".into(), details: None },
            GatewayError::ServiceInternal { message: "service boom".into() },
            GatewayError::ProviderError { message: "provider boom".into() },
            GatewayError::ProviderUnavailable { message: "no provider".into() },
            GatewayError::ConfigurationError { message: "missing key".into() },
            GatewayError::FailoverFail { message: "all providers failed".into() },
        ]
    }

    #[test]
    fn error_codes_are_stable_three_digit_strings() {
        for err in all_variants() {
            let code = err.error_code();
            assert_eq!(code.len(), 3, "{} has a non-three-digit code", err.error_name());
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(GatewayError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::Unauthorized { message: "x".into() }.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::TokenMalformed { message: "x".into() }.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::ServiceNotFound { message: "x".into() }.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::ServiceQuotaExceeded { message: "x".into() }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::FailoverFail { message: "x".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_failover_fail_suggests_retry() {
        for err in all_variants() {
            let expected = matches!(err, GatewayError::FailoverFail { .. });
            assert_eq!(err.client_retry(), expected, "{}", err.error_name());
        }
    }

    #[test]
    fn production_mode_masks_internal_details() {
        let err = GatewayError::Internal { message: "leaky".into(), details: Some(json!({"k": "v"})) };
        let body = err.to_json(ErrorMode::Production);
        assert!(body.get("error_details").is_none());
        let body = err.to_json(ErrorMode::Debug);
        assert_eq!(body["error_details"], json!({"k": "v"}));
    }

    #[test]
    fn bad_request_carries_error_path_when_set() {
        let err = GatewayError::bad_request_field("invalid date", "date");
        let body = err.to_json(ErrorMode::Production);
        assert_eq!(body["error_path"], json!("date"));
    }

    #[test]
    fn response_carries_x_error_code_header() {
        let response = render(&GatewayError::bad_request("x"), ErrorMode::Production);
        assert_eq!(response.headers().get("X-Error-Code").unwrap(), "007");
    }

    #[test]
    fn mask_non_domain_hides_message_in_production() {
        let err = mask_non_domain("division by zero", ErrorMode::Production);
        assert_eq!(err.message(), "Internal server error");
        let err = mask_non_domain("division by zero", ErrorMode::Debug);
        assert_eq!(err.message(), "division by zero");
    }

    #[test]
    fn display_includes_name_and_message() {
        let err = GatewayError::ServiceRestricted { message: "not yours".into() };
        assert_eq!(format!("{err}"), "ServiceRestricted: not yours");
    }
}
