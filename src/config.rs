//! Trust configuration supplied by the host at startup.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::idp::ExternalIdp;
use crate::tenant::TenantKey;

/// HTTP options applied to outbound collaborator calls (discovery, JWKS,
/// external IdP token endpoints).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Process-wide trust configuration, read-only after startup.
///
/// Issuer discovery and config-file loading are the host's concern; this
/// struct is the resulting input. Construction failure at startup is fatal:
/// serving requests without valid trust configuration is unsafe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Base issuer URL. Tenant and channel segments are appended for
    /// per-tenant discovery.
    pub issuer: String,

    /// OIDC client id registered with the issuer.
    pub client_id: Option<String>,

    /// OIDC client secret.
    pub client_secret: Option<String>,

    /// Outbound HTTP options.
    pub http: HttpOptions,

    /// External identity providers to resolve additional tokens for.
    pub external_idps: Vec<ExternalIdp>,

    /// Name of the route parameter carrying the `tenant` or `tenant/channel`
    /// hint.
    pub tenant_path_param: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: None,
            client_secret: None,
            http: HttpOptions::default(),
            external_idps: Vec::new(),
            tenant_path_param: "scope".to_string(),
        }
    }
}

impl TrustConfig {
    /// Validate the configuration.
    ///
    /// The host should treat an error as fatal and terminate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::MissingIssuer);
        }
        if !self.issuer.starts_with("https://") && !self.issuer.starts_with("http://") {
            return Err(ConfigError::InvalidIssuer(self.issuer.clone()));
        }
        if self.http.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.tenant_path_param.is_empty() {
            return Err(ConfigError::MissingTenantPathParam);
        }

        let mut seen = HashSet::new();
        for idp in &self.external_idps {
            if idp.name.is_empty() || idp.token_endpoint.is_empty() || idp.client_id.is_empty() {
                return Err(ConfigError::IncompleteExternalIdp(idp.name.clone()));
            }
            if !seen.insert(idp.name.as_str()) {
                return Err(ConfigError::DuplicateExternalIdp(idp.name.clone()));
            }
        }

        Ok(())
    }

    /// Timeout applied to outbound collaborator requests.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.http.timeout_ms)
    }

    /// Discovery URL for a tenant key. The base key resolves against the
    /// issuer root; tenant keys append `tenant[/channel]`.
    pub fn discovery_url(&self, key: &TenantKey) -> String {
        let issuer = self.issuer.trim_end_matches('/');
        if key.is_base() {
            return format!("{issuer}/.well-known/openid-configuration");
        }
        match key.channel() {
            Some(channel) => format!(
                "{issuer}/{}/{channel}/.well-known/openid-configuration",
                key.tenant()
            ),
            None => format!("{issuer}/{}/.well-known/openid-configuration", key.tenant()),
        }
    }
}

/// Configuration validation errors. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("issuer is required")]
    MissingIssuer,

    #[error("issuer must be an http(s) URL, got '{0}'")]
    InvalidIssuer(String),

    #[error("http timeout must be greater than zero")]
    ZeroTimeout,

    #[error("tenant path parameter name must not be empty")]
    MissingTenantPathParam,

    #[error("external idp '{0}' is missing a name, token endpoint, or client id")]
    IncompleteExternalIdp(String),

    #[error("external idp '{0}' is configured more than once")]
    DuplicateExternalIdp(String),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idp(name: &str) -> ExternalIdp {
        ExternalIdp {
            name: name.to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            client_id: "authgate".to_string(),
            client_secret: "s3cret".to_string(),
            scope: None,
        }
    }

    fn valid_config() -> TrustConfig {
        TrustConfig {
            issuer: "https://issuer.example.com".to_string(),
            ..TrustConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_incomplete() {
        assert!(matches!(
            TrustConfig::default().validate(),
            Err(ConfigError::MissingIssuer)
        ));
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_issuer() {
        let mut config = valid_config();
        config.issuer = "ldap://issuer.example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidIssuer(_))
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = valid_config();
        config.http.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_rejects_incomplete_external_idp() {
        let mut config = valid_config();
        let mut bad = idp("graph");
        bad.token_endpoint = String::new();
        config.external_idps = vec![bad];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncompleteExternalIdp(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_external_idp() {
        let mut config = valid_config();
        config.external_idps = vec![idp("graph"), idp("graph")];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateExternalIdp(_))
        ));
    }

    #[test]
    fn test_discovery_url_shapes() {
        let config = valid_config();

        let key = TenantKey::from_hint("acme/b2c").unwrap();
        assert_eq!(
            config.discovery_url(&key),
            "https://issuer.example.com/acme/b2c/.well-known/openid-configuration"
        );

        let key = TenantKey::from_hint("acme").unwrap();
        assert_eq!(
            config.discovery_url(&key),
            "https://issuer.example.com/acme/.well-known/openid-configuration"
        );

        assert_eq!(
            config.discovery_url(&TenantKey::base()),
            "https://issuer.example.com/.well-known/openid-configuration"
        );
    }

    #[test]
    fn test_discovery_url_trims_trailing_slash() {
        let mut config = valid_config();
        config.issuer = "https://issuer.example.com/".to_string();
        assert_eq!(
            config.discovery_url(&TenantKey::base()),
            "https://issuer.example.com/.well-known/openid-configuration"
        );
    }
}
