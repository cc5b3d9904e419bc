//! Request identity middleware orchestrating the verification pipeline.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::warn;

use crate::config::{ConfigError, TrustConfig};
use crate::error::AuthError;
use crate::idp::{AuthTokens, HttpIdpResolver, IdpTokenResolver, authenticate_external_idps};
use crate::strategy::{HttpKeySource, KeySource, StrategyBuilder};
use crate::tenant::TenantKey;
use crate::verify::{DecodedIdentity, verify};

/// Extract a bearer token from an Authorization header value.
///
/// Anything that is not a well-formed `Bearer <token>` value counts as "no
/// credential" and leaves the request untouched.
fn bearer_token(header_value: &str) -> Option<&str> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    Some(token)
}

/// Identity context attached to a verified request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestIdentity {
    /// Decoded claims, with `channel` set when the path hint carried one.
    pub userinfo: DecodedIdentity,

    /// Tokens resolved for configured external IdPs. `None` when no external
    /// IdP is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_tokens: Option<AuthTokens>,
}

/// Extract the identity attached by the middleware.
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or(AuthError::MissingIdentity)
    }
}

/// Shared middleware state: the trust configuration plus the collaborators
/// that resolve key material and external IdP tokens.
#[derive(Clone)]
pub struct OidcState {
    config: Arc<TrustConfig>,
    builder: Arc<StrategyBuilder>,
    idp_resolver: Arc<dyn IdpTokenResolver>,
}

impl OidcState {
    /// Build state with the HTTP collaborators.
    ///
    /// Validates the configuration; the host should treat an error as fatal.
    pub fn new(config: TrustConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Self::with_collaborators(
            config,
            Arc::new(HttpKeySource::new(client.clone())),
            Arc::new(HttpIdpResolver::new(client)),
        )
    }

    /// Build state with explicit collaborators.
    pub fn with_collaborators(
        config: TrustConfig,
        key_source: Arc<dyn KeySource>,
        idp_resolver: Arc<dyn IdpTokenResolver>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            builder: Arc::new(StrategyBuilder::new(key_source)),
            idp_resolver,
        })
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn builder(&self) -> &StrategyBuilder {
        &self.builder
    }

    fn tenant_key(&self, params: &RawPathParams) -> TenantKey {
        params
            .iter()
            .find(|(name, _)| *name == self.config.tenant_path_param)
            .and_then(|(_, hint)| TenantKey::from_hint(hint))
            .unwrap_or_else(TenantKey::base)
    }
}

/// Token verification middleware.
///
/// Requests without a bearer token pass through untouched; what anonymous
/// requests may do is the downstream handlers' decision. Requests with one
/// are verified against the tenant's key store (built on first use) and gain
/// a [`RequestIdentity`] extension; any failure short-circuits with 401,
/// never a silent pass-through.
pub async fn oidc_middleware(
    State(state): State<OidcState>,
    params: RawPathParams,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return Ok(next.run(req).await);
    };

    let key = state.tenant_key(&params);
    let store = state.builder.ensure(&key, &state.config).await?;

    let mut userinfo = verify(&token, &store).inspect_err(|err| {
        warn!(key = %key.canonical(), error = %err, "token verification failed");
    })?;
    userinfo.channel = key.channel().map(str::to_owned);

    let auth_tokens = if state.config.external_idps.is_empty() {
        None
    } else {
        Some(authenticate_external_idps(&state.config.external_idps, state.idp_resolver.as_ref()).await)
    };

    req.extensions_mut().insert(RequestIdentity {
        userinfo,
        auth_tokens,
    });

    Ok(next.run(req).await)
}
