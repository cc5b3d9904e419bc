//! Bearer token verification against a resolved key store.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AuthError;
use crate::keystore::KeyStore;

/// Decoded identity claims produced by a successful verification.
///
/// Claims are kept as an open map: different issuers attach different profile
/// claims and downstream handlers pick the ones they need.
#[derive(Debug, Clone, Serialize)]
pub struct DecodedIdentity {
    #[serde(flatten)]
    pub claims: Map<String, Value>,

    /// Channel parsed from the request path, when one was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl DecodedIdentity {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self {
            claims,
            channel: None,
        }
    }

    /// Subject (`sub`) claim.
    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    /// Display username, falling back through common profile claims.
    pub fn username(&self) -> Option<&str> {
        self.claim_str("preferred_username")
            .or_else(|| self.claim_str("username"))
            .or_else(|| self.claim_str("name"))
            .or_else(|| self.claim_str("email"))
            .or_else(|| self.subject())
    }

    /// Look up an arbitrary claim.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

/// Verify a bearer token against the keys in `store`.
///
/// Tries the `kid`-matched keys first when the token names one, otherwise
/// every key in turn. Temporal claims (`exp`, `nbf`) are validated when the
/// token carries them. Pure function: no shared state is touched.
pub fn verify(token: &str, store: &KeyStore) -> Result<DecodedIdentity, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    for key in store.candidates(header.kid.as_deref()) {
        let mut validation = Validation::new(key.alg());
        validation.validate_aud = false;
        validation.validate_nbf = true;
        // Temporal claims are checked only when present.
        validation.required_spec_claims.clear();

        match decode::<Map<String, Value>>(token, key.decoding_key(), &validation) {
            Ok(data) => return Ok(DecodedIdentity::new(data.claims)),
            Err(err) => match err.kind() {
                // This key did not match; the next one may.
                ErrorKind::InvalidSignature => continue,
                // Key algorithm does not apply to this token.
                ErrorKind::InvalidAlgorithm => continue,
                ErrorKind::ExpiredSignature => return Err(AuthError::TokenExpired),
                ErrorKind::ImmatureSignature => return Err(AuthError::TokenNotYetValid),
                ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::InvalidToken => return Err(AuthError::MalformedToken),
                _ => continue,
            },
        }
    }

    Err(AuthError::InvalidSignature)
}
