//! Authentication errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Authentication errors.
///
/// "No credential" is deliberately not a variant: a request without a bearer
/// token passes through the middleware untouched.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Trust material for the tenant could not be resolved or built.
    #[error("key store unavailable: {0}")]
    KeyStoreUnavailable(String),

    /// The token could not be parsed as a JWT.
    #[error("malformed token")]
    MalformedToken,

    /// No key in the resolved store matched the token signature.
    #[error("token signature did not match any known key")]
    InvalidSignature,

    /// Token expired.
    #[error("token expired")]
    TokenExpired,

    /// Token not yet valid (`nbf` in the future).
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// An external IdP token could not be resolved. Never surfaced as a
    /// response; the augmenter degrades by omission instead.
    #[error("external idp resolution failed: {0}")]
    ExternalIdpResolution(String),

    /// A handler required an identity but none was attached to the request.
    #[error("no authenticated identity on request")]
    MissingIdentity,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            AuthError::KeyStoreUnavailable(_) => (StatusCode::UNAUTHORIZED, "key_store_unavailable"),
            AuthError::MalformedToken => (StatusCode::UNAUTHORIZED, "malformed_token"),
            AuthError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "token_expired"),
            AuthError::TokenNotYetValid => (StatusCode::UNAUTHORIZED, "token_not_yet_valid"),
            AuthError::ExternalIdpResolution(_) => {
                (StatusCode::UNAUTHORIZED, "external_idp_resolution_failed")
            }
            AuthError::MissingIdentity => (StatusCode::UNAUTHORIZED, "missing_identity"),
        };

        let body = Json(AuthErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::TokenExpired;
        assert_eq!(err.to_string(), "token expired");

        let err = AuthError::KeyStoreUnavailable("upstream offline".to_string());
        assert_eq!(err.to_string(), "key store unavailable: upstream offline");
    }

    #[test]
    fn test_verification_failures_map_to_unauthorized() {
        let errors = [
            AuthError::KeyStoreUnavailable("x".to_string()),
            AuthError::MalformedToken,
            AuthError::InvalidSignature,
            AuthError::TokenExpired,
            AuthError::TokenNotYetValid,
            AuthError::MissingIdentity,
        ];

        for err in errors {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }
}
