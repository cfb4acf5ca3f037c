//! Shared-secret guard for admin routes.
//!
//! Requests must carry `X-Atlas-Admin-Token` matching `ATLAS_ADMIN_TOKEN`.
//! With no token configured the guard lets everything through.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::api::SharedState;
use crate::error::{AppError, Result};

pub static ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-atlas-admin-token");

/// Admin-only middleware
pub async fn admin_middleware(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    check_admin_token(state.config.admin_token.as_deref(), request.headers())?;
    Ok(next.run(request).await)
}

/// Validate the admin header against the configured secret.
pub fn check_admin_token(expected: Option<&str>, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(&ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match provided {
        None => Err(AppError::Authentication(
            "Admin token required (X-Atlas-Admin-Token).".into(),
        )),
        Some(token) if tokens_match(token, expected) => Ok(()),
        Some(_) => {
            tracing::warn!("Rejected request with invalid admin token");
            Err(AppError::Authentication("Invalid admin token.".into()))
        }
    }
}

/// Compare digests so the comparison time does not depend on the token prefix.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(&ADMIN_TOKEN_HEADER, HeaderValue::from_str(token).unwrap());
        headers
    }

    #[test]
    fn test_open_when_unconfigured() {
        assert!(check_admin_token(None, &HeaderMap::new()).is_ok());
        assert!(check_admin_token(None, &headers_with("anything")).is_ok());
    }

    #[test]
    fn test_missing_header() {
        let err = check_admin_token(Some("s3cret"), &HeaderMap::new()).unwrap_err();
        match err {
            AppError::Authentication(msg) => assert!(msg.starts_with("Admin token required")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_token() {
        let err = check_admin_token(Some("s3cret"), &headers_with("nope")).unwrap_err();
        match err {
            AppError::Authentication(msg) => assert_eq!(msg, "Invalid admin token."),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_matching_token_with_whitespace() {
        assert!(check_admin_token(Some("s3cret"), &headers_with(" s3cret ")).is_ok());
    }
}
