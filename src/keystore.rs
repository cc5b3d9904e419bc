//! Verification key stores and the shared tenant registry.

use std::sync::Arc;

use dashmap::DashMap;
use jsonwebtoken::jwk::{JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use tracing::{debug, warn};

use crate::tenant::TenantKey;

/// A single verification key extracted from a JWKS entry.
pub struct VerificationKey {
    kid: Option<String>,
    alg: Algorithm,
    key: DecodingKey,
}

impl VerificationKey {
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn alg(&self) -> Algorithm {
        self.alg
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

/// Immutable set of verification keys for one tenant/channel.
///
/// Built once from a JWKS and never mutated afterwards; an empty store is
/// valid and simply fails every verification attempt.
pub struct KeyStore {
    keys: Vec<VerificationKey>,
}

impl KeyStore {
    /// Build a key store from a JWKS, skipping entries that cannot be used
    /// for signature verification.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = Vec::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            let Some(alg) = jwk.common.key_algorithm.and_then(verification_algorithm) else {
                debug!(kid = ?jwk.common.key_id, "skipping JWK without a signature algorithm");
                continue;
            };
            match DecodingKey::from_jwk(jwk) {
                Ok(key) => keys.push(VerificationKey {
                    kid: jwk.common.key_id.clone(),
                    alg,
                    key,
                }),
                Err(err) => warn!(kid = ?jwk.common.key_id, error = %err, "skipping unusable JWK"),
            }
        }
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys to try for a token: the `kid` matches when the header names a key
    /// we hold, otherwise every key in the store.
    pub fn candidates(&self, kid: Option<&str>) -> Vec<&VerificationKey> {
        if let Some(kid) = kid {
            let matched: Vec<_> = self
                .keys
                .iter()
                .filter(|key| key.kid() == Some(kid))
                .collect();
            if !matched.is_empty() {
                return matched;
            }
        }
        self.keys.iter().collect()
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").field("keys", &self.keys.len()).finish()
    }
}

/// Shared registry mapping canonical tenant keys to built key stores.
///
/// Entries are added once and never evicted; trust configuration is assumed
/// stable for the process lifetime. Absence means "not built yet", which is
/// an expected state, not a failure.
#[derive(Debug, Default)]
pub struct KeyStoreRegistry {
    stores: DashMap<String, Arc<KeyStore>>,
}

impl KeyStoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TenantKey) -> Option<Arc<KeyStore>> {
        self.stores.get(&key.canonical()).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: &TenantKey, store: Arc<KeyStore>) {
        self.stores.insert(key.canonical(), store);
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

/// Map a JWKS `alg` to a verification algorithm. Encryption algorithms have
/// no verification counterpart.
fn verification_algorithm(alg: KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::HS256 => Some(Algorithm::HS256),
        KeyAlgorithm::HS384 => Some(Algorithm::HS384),
        KeyAlgorithm::HS512 => Some(Algorithm::HS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        KeyAlgorithm::RSA1_5 | KeyAlgorithm::RSA_OAEP | KeyAlgorithm::RSA_OAEP_256 => None,
    }
}
