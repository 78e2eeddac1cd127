//! Process-lifetime instance discovery cache with single-flight network
//! population.
//!
//! Reads of an already-populated host are lock-free and fully parallel. All
//! discovery network calls, for every host, serialize behind one global
//! async mutex: a per-host gate would buy little (discovery is rare, once
//! per host family per process) and the single gate makes duplicate
//! concurrent calls impossible by construction. Entries never expire; a
//! long-lived process talking to many distinct hosts will grow this map
//! without bound, which is accepted rather than changing observable
//! behavior with eviction.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{InstanceDiscoveryMetadataEntry, InstanceDiscoveryResponse, is_trusted_cloud_host};
use crate::error::AuthorityError;

/// Worldwide discovery host used for hosts outside the trusted clouds.
pub(crate) const DEFAULT_DISCOVERY_HOST: &str = "login.microsoftonline.com";

const DISCOVERY_API_VERSION: &str = "1.1";

/// Configuration for the instance discovery cache.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Discovery host for untrusted authority hosts (default:
    /// `login.microsoftonline.com`)
    pub discovery_host: String,

    /// Full replacement for the discovery endpoint URL, before the query
    /// string. For tests and sovereign-cloud operators.
    pub endpoint_override: Option<String>,

    /// Request timeout (default: 10 seconds)
    pub request_timeout: Duration,

    /// User agent for HTTP requests
    pub user_agent: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_host: DEFAULT_DISCOVERY_HOST.to_string(),
            endpoint_override: None,
            request_timeout: Duration::from_secs(10),
            user_agent: format!("entra-authority/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Concurrent map from authority host to its alias-equivalence metadata.
///
/// Invariant: once a host is a key, every alias listed in that host's entry
/// is also a key, all sharing the same `Arc`'d entry. Entries are never
/// removed.
///
/// Construct once per process and share; the cache is the process-wide
/// memory of which cloud hosts are interchangeable.
#[derive(Debug)]
pub struct InstanceDiscoveryCache {
    client: reqwest::Client,
    config: DiscoveryConfig,
    cache: DashMap<String, Arc<InstanceDiscoveryMetadataEntry>>,
    // Single global gate for all discovery network calls.
    discovery_gate: Mutex<()>,
}

impl InstanceDiscoveryCache {
    /// Create a cache with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, AuthorityError> {
        Self::with_config(DiscoveryConfig::default())
    }

    /// Create a cache with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_config(config: DiscoveryConfig) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthorityError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            cache: DashMap::new(),
            discovery_gate: Mutex::new(()),
        })
    }

    /// Alias-equivalence metadata for a host, fetching it over the network
    /// on first use.
    ///
    /// Fast path: a cached host returns with no I/O and no lock. Slow path:
    /// callers serialize behind the global gate, re-check the cache (another
    /// caller may have populated it while they waited), then issue one
    /// discovery request.
    ///
    /// With `validate_authority = true`, a response without a
    /// `tenant_discovery_endpoint` fails with
    /// [`AuthorityError::NotInValidList`] and any other discovery failure is
    /// propagated. With `validate_authority = false`, failures are absorbed:
    /// the host is cached as a self-referencing entry and returned, making
    /// discovery best-effort.
    ///
    /// # Errors
    ///
    /// Only when `validate_authority` is true; see above.
    pub async fn get_metadata_entry(
        &self,
        host: &str,
        validate_authority: bool,
    ) -> Result<Arc<InstanceDiscoveryMetadataEntry>, AuthorityError> {
        let host = host.to_ascii_lowercase();

        if let Some(entry) = self.cache.get(&host) {
            debug!(%host, "instance discovery cache hit");
            return Ok(Arc::clone(entry.value()));
        }

        let _gate = self.discovery_gate.lock().await;

        // Double-check: the host may have been populated while waiting.
        if let Some(entry) = self.cache.get(&host) {
            debug!(%host, "instance discovery cache populated while waiting");
            return Ok(Arc::clone(entry.value()));
        }

        match self.fetch(&host).await {
            Ok(response) => {
                if validate_authority && response.tenant_discovery_endpoint.is_none() {
                    return Err(AuthorityError::NotInValidList(host));
                }
                Ok(self.register(&host, response))
            }
            Err(err) if validate_authority => Err(err),
            Err(err) => {
                warn!(%host, error = %err, "instance discovery failed, caching host as self-referencing");
                let entry = Arc::new(InstanceDiscoveryMetadataEntry::self_referencing(&host));
                self.cache.insert(host, Arc::clone(&entry));
                Ok(entry)
            }
        }
    }

    /// Register every alias of every returned equivalence class, plus the
    /// requested host itself if the response did not mention it.
    fn register(
        &self,
        requested_host: &str,
        response: InstanceDiscoveryResponse,
    ) -> Arc<InstanceDiscoveryMetadataEntry> {
        for entry in response.metadata {
            let entry = Arc::new(entry);
            for alias in &entry.aliases {
                self.cache
                    .insert(alias.to_ascii_lowercase(), Arc::clone(&entry));
            }
        }

        let entry = self
            .cache
            .entry(requested_host.to_string())
            .or_insert_with(|| {
                Arc::new(InstanceDiscoveryMetadataEntry::self_referencing(
                    requested_host,
                ))
            });
        debug!(
            host = %requested_host,
            preferred_network = %entry.preferred_network,
            "instance discovery registered"
        );
        Arc::clone(entry.value())
    }

    async fn fetch(&self, host: &str) -> Result<InstanceDiscoveryResponse, AuthorityError> {
        let url = self.discovery_request_url(host);
        debug!(%url, "issuing instance discovery request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AuthorityError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthorityError::Http(e.to_string()))?;

        if status == StatusCode::BAD_REQUEST {
            // The service reports an unknown authority as invalid_instance.
            let text = String::from_utf8_lossy(&body);
            if text.contains("invalid_instance") {
                return Err(AuthorityError::NotInValidList(host.to_string()));
            }
            return Err(AuthorityError::Discovery(format!(
                "HTTP 400 from discovery: {text}"
            )));
        }
        if !status.is_success() {
            return Err(AuthorityError::Discovery(format!(
                "HTTP {} from discovery endpoint",
                status.as_u16()
            )));
        }

        serde_json::from_slice(&body).map_err(|e| AuthorityError::InvalidJson(e.to_string()))
    }

    /// Discovery request URL: the trusted discovery host (or the requested
    /// host itself when it belongs to a known cloud) is asked about a
    /// tentative authorize endpoint built from the unvalidated host.
    fn discovery_request_url(&self, host: &str) -> String {
        let tentative_authorize = format!("https://{host}/common/oauth2/v2.0/authorize");
        let base = match &self.config.endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => {
                let discovery_host = if is_trusted_cloud_host(host) {
                    host
                } else {
                    self.config.discovery_host.as_str()
                };
                format!("https://{discovery_host}/common/discovery/instance")
            }
        };
        format!("{base}?api-version={DISCOVERY_API_VERSION}&authorization_endpoint={tentative_authorize}")
    }

    /// Number of cached hosts.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no host has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached entry. Test hook; production code never evicts.
    pub fn reset(&self) {
        self.cache.clear();
    }
}
