//! External identity provider token augmentation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AuthError;

/// Tokens resolved for external IdPs, keyed by provider name.
pub type AuthTokens = HashMap<String, String>;

/// Descriptor for an external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalIdp {
    /// Provider name, used as the key in [`AuthTokens`].
    pub name: String,
    /// Token endpoint for the client-credentials grant.
    pub token_endpoint: String,
    /// Client id registered with the provider.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Optional scope requested with the grant.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Resolves a token for one external IdP descriptor.
#[async_trait]
pub trait IdpTokenResolver: Send + Sync {
    async fn resolve(&self, idp: &ExternalIdp) -> Result<String, AuthError>;
}

/// Resolve one token per configured provider.
///
/// Runs all resolutions concurrently. A failed provider is omitted from the
/// result; augmentation never fails the request it runs for.
pub async fn authenticate_external_idps(
    idps: &[ExternalIdp],
    resolver: &dyn IdpTokenResolver,
) -> AuthTokens {
    let results = futures::future::join_all(idps.iter().map(|idp| async move {
        (idp.name.clone(), resolver.resolve(idp).await)
    }))
    .await;

    let mut tokens = AuthTokens::new();
    for (name, result) in results {
        match result {
            Ok(token) => {
                tokens.insert(name, token);
            }
            Err(err) => warn!(idp = %name, error = %err, "external idp token resolution failed"),
        }
    }
    tokens
}

/// Token response subset returned by a client-credentials grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Resolver that performs a client-credentials token request.
pub struct HttpIdpResolver {
    client: reqwest::Client,
}

impl HttpIdpResolver {
    /// The client is expected to carry the trust configuration's timeout.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdpTokenResolver for HttpIdpResolver {
    async fn resolve(&self, idp: &ExternalIdp) -> Result<String, AuthError> {
        let mut form = vec![("grant_type", "client_credentials")];
        if let Some(scope) = &idp.scope {
            form.push(("scope", scope));
        }

        let response = self
            .client
            .post(&idp.token_endpoint)
            .basic_auth(&idp.client_id, Some(&idp.client_secret))
            .form(&form)
            .send()
            .await
            .map_err(|err| AuthError::ExternalIdpResolution(format!("token request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AuthError::ExternalIdpResolution(format!(
                "token endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|err| {
            AuthError::ExternalIdpResolution(format!("invalid token response: {err}"))
        })?;

        Ok(body.access_token)
    }
}
