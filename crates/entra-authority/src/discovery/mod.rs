//! # Instance Discovery
//!
//! Network-backed discovery of alias-equivalence metadata for cloud
//! authority hosts, cached for the lifetime of the process.
//!
//! The discovery service answers "which hostnames are interchangeable with
//! this one, and which of them should I prefer for network calls vs. token
//! cache keys". The wire format is:
//!
//! ```json
//! {
//!   "tenant_discovery_endpoint": "https://.../.well-known/openid-configuration",
//!   "metadata": [
//!     {
//!       "preferred_network": "login.microsoftonline.com",
//!       "preferred_cache": "login.windows.net",
//!       "aliases": ["login.microsoftonline.com", "login.windows.net"]
//!     }
//!   ]
//! }
//! ```

mod cache;

pub use cache::{DiscoveryConfig, InstanceDiscoveryCache};

use serde::{Deserialize, Serialize};

/// Hosts of the known Azure clouds. A discovery request for one of these is
/// sent to the host itself; anything else is asked about via the worldwide
/// discovery host.
pub(crate) const TRUSTED_CLOUD_HOSTS: &[&str] = &[
    "login.microsoftonline.com",
    "login.windows.net",
    "login.microsoft.com",
    "sts.windows.net",
    "login.partner.microsoftonline.cn",
    "login.chinacloudapi.cn",
    "login.microsoftonline.de",
    "login.microsoftonline.us",
    "login.usgovcloudapi.net",
    "login-us.microsoftonline.com",
];

pub(crate) fn is_trusted_cloud_host(host: &str) -> bool {
    TRUSTED_CLOUD_HOSTS
        .iter()
        .any(|trusted| trusted.eq_ignore_ascii_case(host))
}

/// One equivalence class of interchangeable cloud hostnames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDiscoveryMetadataEntry {
    /// Host to prefer for network calls
    pub preferred_network: String,

    /// Host to prefer as the token cache key, stable across aliases
    pub preferred_cache: String,

    /// Every hostname resolving to this deployment
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl InstanceDiscoveryMetadataEntry {
    /// Degraded entry pointing a host at itself, used when discovery was
    /// skipped or absorbed a failure.
    pub fn self_referencing(host: &str) -> Self {
        Self {
            preferred_network: host.to_string(),
            preferred_cache: host.to_string(),
            aliases: Vec::new(),
        }
    }
}

/// Body of a successful instance discovery response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDiscoveryResponse {
    /// OpenID configuration endpoint for the validated authority. Absent
    /// when the service does not recognize the authority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_discovery_endpoint: Option<String>,

    /// Alias equivalence classes for the known cloud hosts.
    #[serde(default)]
    pub metadata: Vec<InstanceDiscoveryMetadataEntry>,
}
