//! # Legacy Trusted-Host Validation
//!
//! The earlier-generation precursor to the instance discovery cache: a
//! static allow-list of known AAD hosts plus a one-shot verification call.
//!
//! A host on the list is trusted outright. Anything else triggers exactly
//! one verification request against the *first* trusted host asking whether
//! the requested host is a legitimate alias. The richer
//! [`discovery`](crate::discovery) cache generalizes this single hardcoded
//! trust anchor into arbitrary discovered alias sets; this module is kept
//! for callers still on the v1 validation path.

use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::discovery::{InstanceDiscoveryResponse, TRUSTED_CLOUD_HOSTS};
use crate::error::AuthorityError;

/// Operator override: when set, the trusted list is just this one host.
pub const TRUSTED_HOST_ENV_VAR: &str = "AAD_INSTANCE_DISCOVERY_TRUSTED_HOST";

/// Configuration for the legacy validator.
#[derive(Debug, Clone)]
pub struct LegacyConfig {
    /// Full replacement for the verification endpoint URL, before the query
    /// string. For tests.
    pub endpoint_override: Option<String>,

    /// Request timeout (default: 10 seconds)
    pub request_timeout: Duration,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            endpoint_override: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Static-allow-list authority validator (v1 protocol).
#[derive(Debug)]
pub struct LegacyHostValidator {
    client: reqwest::Client,
    config: LegacyConfig,
    trusted_hosts: Vec<String>,
}

impl LegacyHostValidator {
    /// Create a validator, honoring the [`TRUSTED_HOST_ENV_VAR`] override.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: LegacyConfig) -> Result<Self, AuthorityError> {
        let trusted_hosts = match std::env::var(TRUSTED_HOST_ENV_VAR) {
            Ok(host) if !host.trim().is_empty() => {
                info!(%host, "trusted discovery host overridden from environment");
                vec![host.trim().to_ascii_lowercase()]
            }
            _ => TRUSTED_CLOUD_HOSTS.iter().map(|h| (*h).to_string()).collect(),
        };
        Self::with_trusted_hosts(config, trusted_hosts)
    }

    /// Create a validator with an explicit trusted list. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_trusted_hosts(
        config: LegacyConfig,
        trusted_hosts: Vec<String>,
    ) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthorityError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            trusted_hosts,
        })
    }

    /// The trusted hosts, in order; the first is the verification anchor.
    pub fn trusted_hosts(&self) -> &[String] {
        &self.trusted_hosts
    }

    /// Validate an authority host: an exact (case-insensitive) match against
    /// the trusted list short-circuits; otherwise one verification call is
    /// made against the first trusted host.
    ///
    /// # Errors
    ///
    /// [`AuthorityError::NotInValidList`] when the verification call fails
    /// or does not return a `tenant_discovery_endpoint`.
    pub async fn validate_authority(&self, authority: &Url) -> Result<(), AuthorityError> {
        let host = authority
            .host_str()
            .ok_or_else(|| AuthorityError::InvalidUriFormat(authority.to_string()))?
            .to_ascii_lowercase();

        if self
            .trusted_hosts
            .iter()
            .any(|trusted| trusted.eq_ignore_ascii_case(&host))
        {
            debug!(%host, "authority host is in the trusted list");
            return Ok(());
        }

        let tenant = authority
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .unwrap_or("common")
            .to_string();

        let anchor = self
            .trusted_hosts
            .first()
            .ok_or_else(|| AuthorityError::Discovery("trusted host list is empty".to_string()))?;
        let base = match &self.config.endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{anchor}/common/discovery/instance"),
        };
        let url = format!(
            "{base}?api-version=1.0&authorization_endpoint=https://{host}/{tenant}/oauth2/authorize"
        );
        debug!(%url, "verifying untrusted authority host");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthorityError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthorityError::NotInValidList(host));
        }

        let body: InstanceDiscoveryResponse = response
            .json()
            .await
            .map_err(|e| AuthorityError::InvalidJson(e.to_string()))?;

        if body.tenant_discovery_endpoint.is_some() {
            Ok(())
        } else {
            Err(AuthorityError::NotInValidList(host))
        }
    }
}
