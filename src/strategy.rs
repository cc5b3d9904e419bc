//! Lazy key-store construction with single-flight semantics.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::jwk::JwkSet;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::TrustConfig;
use crate::error::AuthError;
use crate::keystore::{KeyStore, KeyStoreRegistry};
use crate::tenant::TenantKey;

/// Source of JWKS material for a tenant key.
///
/// The default implementation fetches over HTTP; tests substitute fixtures.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the JWKS for `key`. Failures map to
    /// [`AuthError::KeyStoreUnavailable`].
    async fn fetch(&self, key: &TenantKey, config: &TrustConfig) -> Result<JwkSet, AuthError>;
}

/// Builds and registers key stores on first use.
pub struct StrategyBuilder {
    registry: KeyStoreRegistry,
    source: Arc<dyn KeySource>,
    // Per-key construction guards. A guard outlives its build; stores are
    // never evicted, so this map stays as small as the registry itself.
    building: DashMap<String, Arc<Mutex<()>>>,
}

impl StrategyBuilder {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            registry: KeyStoreRegistry::new(),
            source,
            building: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &KeyStoreRegistry {
        &self.registry
    }

    /// Return the key store for `key`, building and registering it on first
    /// use.
    ///
    /// Concurrent first-time callers for the same key perform exactly one
    /// fetch and observe the same store. On failure the registry is left
    /// unchanged, so a later call retries the build.
    pub async fn ensure(
        &self,
        key: &TenantKey,
        config: &TrustConfig,
    ) -> Result<Arc<KeyStore>, AuthError> {
        if let Some(store) = self.registry.get(key) {
            return Ok(store);
        }

        let guard = self.building.entry(key.canonical()).or_default().clone();
        let _locked = guard.lock().await;

        // Another caller may have finished the build while we waited.
        if let Some(store) = self.registry.get(key) {
            return Ok(store);
        }

        let jwks = self.source.fetch(key, config).await?;
        let store = Arc::new(KeyStore::from_jwks(&jwks));
        self.registry.put(key, store.clone());
        debug!(key = %key.canonical(), keys = store.len(), "registered key store");
        Ok(store)
    }
}

/// Discovery document subset needed to locate the JWKS endpoint.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// Key source that resolves JWKS through per-tenant OIDC discovery.
pub struct HttpKeySource {
    client: reqwest::Client,
}

impl HttpKeySource {
    /// The client is expected to carry the trust configuration's timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch(&self, key: &TenantKey, config: &TrustConfig) -> Result<JwkSet, AuthError> {
        let discovery_url = config.discovery_url(key);
        let document: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AuthError::KeyStoreUnavailable(format!("discovery fetch failed: {err}")))?
            .json()
            .await
            .map_err(|err| {
                AuthError::KeyStoreUnavailable(format!("invalid discovery document: {err}"))
            })?;

        self.client
            .get(&document.jwks_uri)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AuthError::KeyStoreUnavailable(format!("JWKS fetch failed: {err}")))?
            .json()
            .await
            .map_err(|err| AuthError::KeyStoreUnavailable(format!("invalid JWKS: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fixture_jwks() -> JwkSet {
        serde_json::from_value(json!({
            "keys": [{
                "kty": "oct",
                "kid": "k1",
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(b"strategy-test-secret"),
            }]
        }))
        .expect("valid JWKS fixture")
    }

    struct CountingSource {
        jwks: JwkSet,
        fetches: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                jwks: fixture_jwks(),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySource for CountingSource {
        async fn fetch(&self, _key: &TenantKey, _config: &TrustConfig) -> Result<JwkSet, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            // Widen the race window so concurrent callers pile up on the guard.
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(self.jwks.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl KeySource for FailingSource {
        async fn fetch(&self, _key: &TenantKey, _config: &TrustConfig) -> Result<JwkSet, AuthError> {
            Err(AuthError::KeyStoreUnavailable("upstream offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_ensure_registers_once_and_reuses() {
        let source = Arc::new(CountingSource::new());
        let builder = StrategyBuilder::new(source.clone());
        let config = TrustConfig::default();
        let key = TenantKey::from_hint("acme/b2c").unwrap();

        let first = builder.ensure(&key, &config).await.unwrap();
        let second = builder.ensure(&key, &config).await.unwrap();

        assert_eq!(source.fetches(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builder.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_is_single_flight() {
        let source = Arc::new(CountingSource::new());
        let builder = Arc::new(StrategyBuilder::new(source.clone()));
        let config = TrustConfig::default();
        let key = TenantKey::from_hint("acme/b2c").unwrap();

        let (a, b, c) = tokio::join!(
            builder.ensure(&key, &config),
            builder.ensure(&key, &config),
            builder.ensure(&key, &config),
        );

        let a = a.unwrap();
        let b = b.unwrap();
        let c = c.unwrap();

        assert_eq!(source.fetches(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_distinct_keys_build_distinct_stores() {
        let source = Arc::new(CountingSource::new());
        let builder = StrategyBuilder::new(source.clone());
        let config = TrustConfig::default();

        let b2c = TenantKey::from_hint("acme/b2c").unwrap();
        let b2e = TenantKey::from_hint("acme/b2e").unwrap();

        let first = builder.ensure(&b2c, &config).await.unwrap();
        let second = builder.ensure(&b2e, &config).await.unwrap();

        assert_eq!(source.fetches(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(builder.registry().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_build_leaves_registry_unchanged() {
        let builder = StrategyBuilder::new(Arc::new(FailingSource));
        let config = TrustConfig::default();
        let key = TenantKey::from_hint("acme/b2c").unwrap();

        let result = builder.ensure(&key, &config).await;
        assert!(matches!(result, Err(AuthError::KeyStoreUnavailable(_))));
        assert!(builder.registry().is_empty());

        // The next call retries instead of observing a partial entry.
        let result = builder.ensure(&key, &config).await;
        assert!(matches!(result, Err(AuthError::KeyStoreUnavailable(_))));
        assert!(builder.registry().is_empty());
    }
}
