//! Multi-tenant OIDC bearer token verification middleware.
//!
//! Resolves per-tenant verification keys lazily from a trusted issuer
//! configuration, verifies inbound bearer tokens, optionally resolves
//! additional tokens from external identity providers, and attaches the
//! resulting identity context to the request for downstream handlers.

pub mod config;
pub mod error;
pub mod idp;
pub mod keystore;
pub mod middleware;
pub mod strategy;
pub mod tenant;
pub mod verify;

pub use config::{ConfigError, HttpOptions, TrustConfig};
pub use error::AuthError;
pub use idp::{AuthTokens, ExternalIdp, HttpIdpResolver, IdpTokenResolver, authenticate_external_idps};
pub use keystore::{KeyStore, KeyStoreRegistry};
pub use middleware::{OidcState, RequestIdentity, oidc_middleware};
pub use strategy::{HttpKeySource, KeySource, StrategyBuilder};
pub use tenant::TenantKey;
pub use verify::{DecodedIdentity, verify};
