//! Parses the gateway's own path grammar by hand rather than through
//! axum's router, since `v{version}` mixes a literal prefix with a dynamic
//! segment that matchit-style routers can't express directly. A single
//! catch-all route in `routes.rs` hands every request here.

use sgateway_core::error::GatewayError;

#[derive(Debug, PartialEq)]
pub enum Route {
    Catalog,
    ServiceSchema { name: String, version: u32 },
    Call { service: String, version: u32, method: String, is_webhook: bool },
}

fn parse_version(segment: &str) -> Option<u32> {
    segment.strip_prefix('v').and_then(|n| n.parse::<u32>().ok())
}

/// `path` is expected to start with `/` as axum hands it over. Strict
/// trailing-slash matching: `/email/v1/send/` does not match `/email/v1/send`.
pub fn parse(path: &str) -> Result<Route, GatewayError> {
    let not_found = || GatewayError::ServiceNotFound { message: format!("no route matches `{path}`") };

    if path.is_empty() || !path.starts_with('/') {
        return Err(not_found());
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(not_found());
    }

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match segments.as_slice() {
        ["services", "_schema"] => Ok(Route::Catalog),
        ["services", name, version] => {
            let version = parse_version(version).ok_or_else(not_found)?;
            Ok(Route::ServiceSchema { name: name.to_string(), version })
        }
        ["_webhooks", service, version, method] => {
            let version = parse_version(version).ok_or_else(not_found)?;
            Ok(Route::Call { service: service.to_string(), version, method: method.to_string(), is_webhook: true })
        }
        [service, version, method] => {
            let version = parse_version(version).ok_or_else(not_found)?;
            Ok(Route::Call { service: service.to_string(), version, method: method.to_string(), is_webhook: false })
        }
        _ => Err(not_found()),
    }
}
