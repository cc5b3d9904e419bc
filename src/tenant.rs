//! Tenant/channel keys parsed from request paths.

/// Composite tenant/channel identifier resolved from a request path hint.
///
/// A hint is formatted `tenant` or `tenant/channel`; segments past the
/// channel belong to the downstream route and are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    tenant: String,
    channel: Option<String>,
}

impl TenantKey {
    /// Reserved tenant name for requests that carry no path hint.
    pub const BASE_TENANT: &'static str = "default";

    pub fn new(tenant: impl Into<String>, channel: Option<String>) -> Self {
        Self {
            tenant: tenant.into(),
            channel,
        }
    }

    /// Parse a path hint. Returns `None` when the hint has no tenant segment.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let mut segments = hint.split('/').filter(|segment| !segment.is_empty());
        let tenant = segments.next()?.to_string();
        let channel = segments.next().map(str::to_string);
        Some(Self { tenant, channel })
    }

    /// Key used when the request path carries no tenant hint.
    pub fn base() -> Self {
        Self {
            tenant: Self::BASE_TENANT.to_string(),
            channel: None,
        }
    }

    pub fn is_base(&self) -> bool {
        self.tenant == Self::BASE_TENANT && self.channel.is_none()
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Canonical registry key: `tenant.channel`, or bare `tenant` when no
    /// channel is present.
    pub fn canonical(&self) -> String {
        match &self.channel {
            Some(channel) => format!("{}.{}", self.tenant, channel),
            None => self.tenant.clone(),
        }
    }
}
