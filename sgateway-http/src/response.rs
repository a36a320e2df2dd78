//! Renders a `GatewayResponse` into an axum response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use sgateway_core::envelope::GatewayResponse;

pub fn render(response: GatewayResponse) -> Response {
    let status = response.status_code.and_then(|code| StatusCode::from_u16(code).ok()).unwrap_or(StatusCode::OK);
    let mut http_response = (status, Json(response.response_data)).into_response();
    for (key, value) in &response.extra_headers {
        if let (Ok(name), Ok(value)) = (axum::http::HeaderName::try_from(key.as_str()), axum::http::HeaderValue::try_from(value.as_str())) {
            http_response.headers_mut().insert(name, value);
        }
    }
    http_response
}
