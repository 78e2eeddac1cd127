//! # Region Autodetection
//!
//! Resolves the Azure region the current process runs in, so token requests
//! can target a regional ESTS endpoint instead of the global one.
//!
//! Source precedence, first success wins:
//! 1. `REGION_NAME` environment variable (no I/O)
//! 2. Process-wide sticky cache of a prior successful discovery (no I/O)
//! 3. A live call to IMDS, the link-local instance metadata service
//!
//! A failed IMDS discovery is memoized for the rest of the process: IMDS is
//! only reachable inside Azure compute, and off-fabric every call would eat
//! the full timeout. The trade-off is that a transient failure is never
//! retried mid-process; [`RegionManager::reset`] exists for tests.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AuthorityError;

/// Sentinel a caller configures as its region to request autodetection.
pub const ATTEMPT_REGION_DISCOVERY: &str = "TryAutoDetect";

/// Environment variable consulted before any network discovery.
pub const REGION_ENV_VAR: &str = "REGION_NAME";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/instance/compute/location";
const IMDS_API_VERSION: &str = "2020-06-01";

/// Where a region value (or the lack of one) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Discovery was not attempted
    None,
    /// Autodetection failed earlier in this process, or just now
    FailedAutoDiscovery,
    /// Sticky cache of a prior successful discovery
    Cache,
    /// The `REGION_NAME` environment variable
    EnvVariable,
    /// A live IMDS call
    Imds,
}

/// Outcome of reconciling a configured region with the discovered one.
/// Recorded for telemetry on every request that uses regional endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOutcome {
    /// Autodetection was requested and succeeded
    AutodetectSuccess,
    /// Autodetection was requested, failed, caller uses the global endpoint
    FallbackToGlobal,
    /// Caller-provided region matches the detected one
    UserProvidedValid,
    /// Caller-provided region differs from the detected one
    UserProvidedInvalid,
    /// Caller provided a region but autodetection failed, so no comparison
    UserProvidedAutodetectionFailed,
}

/// A discovered region together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    /// The region, absent when discovery failed
    pub region: Option<String>,
    /// Where the value came from
    pub source: RegionSource,
}

/// Sticky process-wide discovery state. Three-state by construction so
/// "failed but also has a region" is unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum RegionState {
    #[default]
    Unknown,
    Succeeded(String),
    FailedPermanently,
}

/// Configuration for region discovery.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// IMDS location endpoint (default: the link-local production URL)
    pub imds_endpoint: String,

    /// Pinned IMDS api-version (default: `2020-06-01`)
    pub imds_api_version: String,

    /// Per-call IMDS deadline (default: 2 seconds). IMDS is link-local;
    /// an unreachable endpoint must not hang the caller.
    pub imds_timeout: Duration,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            imds_endpoint: IMDS_ENDPOINT.to_string(),
            imds_api_version: IMDS_API_VERSION.to_string(),
            imds_timeout: Duration::from_secs(2),
        }
    }
}

/// Multi-source resolver of the local Azure region.
///
/// Construct once per process and share: the sticky success and failure
/// memoization live on this object.
#[derive(Debug)]
pub struct RegionManager {
    client: reqwest::Client,
    config: RegionConfig,
    state: Mutex<RegionState>,
    env_region: Option<String>,
}

impl RegionManager {
    /// Create a manager, capturing `REGION_NAME` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: RegionConfig) -> Result<Self, AuthorityError> {
        let env_region = std::env::var(REGION_ENV_VAR)
            .ok()
            .map(|value| sanitize_region(&value))
            .filter(|region| validate_region(region, "environment variable"));
        Self::with_environment(config, env_region)
    }

    /// Create a manager with an explicit environment value instead of
    /// reading the process environment. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_environment(
        config: RegionConfig,
        env_region: Option<String>,
    ) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(config.imds_timeout)
            .build()
            .map_err(|e| AuthorityError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            state: Mutex::new(RegionState::Unknown),
            env_region,
        })
    }

    /// Region to use for this request, or `None` for the global endpoint.
    ///
    /// `configured_region` is the caller's configuration: a concrete region
    /// string, or [`ATTEMPT_REGION_DISCOVERY`] to request autodetection, or
    /// empty when regional endpoints were not requested at all.
    ///
    /// Autodetection always runs so the outcome can be recorded, but a
    /// discovered value never overrides an explicitly configured region.
    pub async fn get_azure_region(&self, configured_region: &str) -> Option<String> {
        if configured_region.is_empty() {
            let skipped = RegionInfo {
                region: None,
                source: RegionSource::None,
            };
            debug!(source = ?skipped.source, "regional endpoint not configured, discovery skipped");
            return skipped.region;
        }

        let discovered = self.discover().await;
        let autodetect_requested = configured_region == ATTEMPT_REGION_DISCOVERY;
        let outcome = reconcile(autodetect_requested, configured_region, &discovered);
        info!(
            source = ?discovered.source,
            outcome = ?outcome,
            discovered = discovered.region.as_deref().unwrap_or(""),
            "region discovery outcome"
        );

        if autodetect_requested {
            discovered.region
        } else {
            Some(configured_region.to_string())
        }
    }

    /// Run the source-precedence chain and return the region with its
    /// source. Never fails: a discovery error becomes a sticky
    /// `FailedAutoDiscovery` result.
    pub async fn discover(&self) -> RegionInfo {
        if let Some(region) = &self.env_region {
            info!(%region, "region found in environment variable");
            return RegionInfo {
                region: Some(region.clone()),
                source: RegionSource::EnvVariable,
            };
        }

        let mut state = self.state.lock().await;
        match &*state {
            RegionState::Succeeded(region) => {
                debug!(%region, "region auto-discovery already ran");
                return RegionInfo {
                    region: Some(region.clone()),
                    source: RegionSource::Cache,
                };
            }
            RegionState::FailedPermanently => {
                debug!("region auto-discovery failed earlier in this process, not retrying");
                return RegionInfo {
                    region: None,
                    source: RegionSource::FailedAutoDiscovery,
                };
            }
            RegionState::Unknown => {}
        }

        match self.fetch_imds_region().await {
            Ok(region) => {
                info!(%region, "IMDS region discovery succeeded");
                *state = RegionState::Succeeded(region.clone());
                RegionInfo {
                    region: Some(region),
                    source: RegionSource::Imds,
                }
            }
            Err(err) => {
                warn!(error = %err, "IMDS region discovery failed, not retrying for process lifetime");
                *state = RegionState::FailedPermanently;
                RegionInfo {
                    region: None,
                    source: RegionSource::FailedAutoDiscovery,
                }
            }
        }
    }

    /// Clear the sticky discovery state. Test hook.
    pub async fn reset(&self) {
        *self.state.lock().await = RegionState::Unknown;
    }

    /// Call IMDS, renegotiating the api-version once on `400 Bad Request`.
    async fn fetch_imds_region(&self) -> Result<String, AuthorityError> {
        let mut response = self.imds_get(Some(&self.config.imds_api_version)).await?;

        if response.status() == StatusCode::BAD_REQUEST {
            // The pinned api-version is no longer supported; ask the
            // endpoint which versions it speaks and retry once.
            let api_version = self.negotiate_api_version().await?;
            response = self.imds_get(Some(&api_version)).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::RegionDiscovery(format!(
                "IMDS returned HTTP {}",
                status.as_u16()
            )));
        }

        let region = response
            .text()
            .await
            .map_err(|e| AuthorityError::Http(e.to_string()))?;
        let region = sanitize_region(&region);
        if !validate_region(&region, "IMDS") {
            return Err(AuthorityError::RegionDiscovery(
                "IMDS returned an empty or invalid region".to_string(),
            ));
        }
        Ok(region)
    }

    /// A bare GET (no api-version) answers `400` with the list of supported
    /// versions; `newest-versions[0]` is the one to retry with.
    async fn negotiate_api_version(&self) -> Result<String, AuthorityError> {
        let response = self.imds_get(None).await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response
                .text()
                .await
                .map_err(|e| AuthorityError::Http(e.to_string()))?;
            let error: ImdsErrorResponse = serde_json::from_str(&body)
                .map_err(|e| AuthorityError::InvalidJson(e.to_string()))?;
            if let Some(version) = error.newest_versions.first() {
                info!(%version, "IMDS api-version renegotiated");
                return Ok(version.clone());
            }
        }

        // No usable version advertised: unexpected environment, hard error.
        Err(AuthorityError::RegionDiscovery(
            "IMDS did not advertise a usable api-version".to_string(),
        ))
    }

    async fn imds_get(
        &self,
        api_version: Option<&str>,
    ) -> Result<reqwest::Response, AuthorityError> {
        let url = match api_version {
            Some(version) => format!(
                "{}?api-version={version}&format=text",
                self.config.imds_endpoint
            ),
            None => self.config.imds_endpoint.clone(),
        };

        let request = self.client.get(&url).header("Metadata", "true").send();
        match tokio::time::timeout(self.config.imds_timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AuthorityError::Http(e.to_string())),
            Err(_) => Err(AuthorityError::RegionDiscovery(format!(
                "IMDS call timed out after {:?}",
                self.config.imds_timeout
            ))),
        }
    }
}

/// IMDS version-negotiation error body.
#[derive(Debug, Deserialize)]
struct ImdsErrorResponse {
    #[serde(default)]
    #[allow(dead_code)]
    error: String,

    #[serde(rename = "newest-versions", default)]
    newest_versions: Vec<String>,
}

fn sanitize_region(raw: &str) -> String {
    raw.replace(' ', "").to_ascii_lowercase()
}

/// A region is plausible when it can form a regional ESTS hostname.
fn validate_region(region: &str, source: &str) -> bool {
    if region.is_empty() {
        debug!(%source, "no region detected");
        return false;
    }
    // Parsing alone is not enough: a region containing '/' still parses,
    // it just truncates the host. The parsed host must round-trip.
    let expected_host = format!("{region}.login.microsoft.com");
    match Url::parse(&format!("https://{expected_host}")) {
        Ok(url) if url.host_str() == Some(expected_host.as_str()) => true,
        _ => {
            warn!(%region, %source, "detected region is not a valid hostname label");
            false
        }
    }
}

fn reconcile(
    autodetect_requested: bool,
    configured_region: &str,
    discovered: &RegionInfo,
) -> RegionOutcome {
    if autodetect_requested {
        if discovered.source == RegionSource::FailedAutoDiscovery {
            RegionOutcome::FallbackToGlobal
        } else {
            RegionOutcome::AutodetectSuccess
        }
    } else {
        match &discovered.region {
            Some(region) if region.eq_ignore_ascii_case(configured_region) => {
                RegionOutcome::UserProvidedValid
            }
            Some(_) => RegionOutcome::UserProvidedInvalid,
            None => RegionOutcome::UserProvidedAutodetectionFailed,
        }
    }
}
