//! Access checks for terminal and operator endpoints

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::info;

use crate::error::Error;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Requires `x-api-key` to match the configured terminal key. Passes every
/// request through when no key is configured.
pub async fn terminal_auth(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    if let Some(expected) = app_state.config.terminal_api_key.as_deref() {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::Unauthorized)?;
        if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            info!("Rejected terminal request to {}: bad API key", request.uri().path());
            return Err(Error::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

/// Check the bearer token when one is configured
pub fn authorize_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Error> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let token = extract_bearer_token(headers)?;
    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, Error> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Unauthorized)
}

/// Comparison whose duration does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert!(extract_bearer_token(&headers("Basic abc")).is_err());
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_authorize_bearer() {
        assert!(authorize_bearer(&HeaderMap::new(), None).is_ok());
        assert!(authorize_bearer(&headers("Bearer t0k"), Some("t0k")).is_ok());
        assert!(authorize_bearer(&headers("Bearer nope"), Some("t0k")).is_err());
        assert!(authorize_bearer(&HeaderMap::new(), Some("t0k")).is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
    }
}
