//! # Endpoint Template Resolver
//!
//! Expands per-type URL templates into concrete protocol endpoints by
//! substituting `{host}` and `{tenant}`.
//!
//! Two hosts are deliberately kept apart: the **network host** (possibly the
//! discovery-resolved `preferred_network` alias, used to build the URIs that
//! are actually called) and the **cache host** (`preferred_cache`, the
//! stable identity under which tokens are cached). Collapsing them would
//! fragment cached tokens across equivalent cloud aliases.

use std::sync::Arc;

use crate::authority::{AuthorityInfo, AuthorityType};
use crate::discovery::InstanceDiscoveryCache;
use crate::error::AuthorityError;

/// Per-type URL templates with `{host}` and `{tenant}` markers.
#[derive(Debug, Clone, Copy)]
pub struct EndpointTemplates {
    authorize: &'static str,
    token: &'static str,
    device_code: &'static str,
    jwt_audience: &'static str,
}

impl EndpointTemplates {
    /// Templates for an authority type.
    pub fn for_type(authority_type: AuthorityType) -> Self {
        match authority_type {
            // ADFS exposes the OAuth2 endpoints under /adfs without the
            // v2.0 path component.
            AuthorityType::Adfs => Self {
                authorize: "https://{host}/adfs/oauth2/authorize",
                token: "https://{host}/adfs/oauth2/token",
                device_code: "https://{host}/adfs/oauth2/devicecode",
                jwt_audience: "https://{host}/adfs",
            },
            _ => Self {
                authorize: "https://{host}/{tenant}/oauth2/v2.0/authorize",
                token: "https://{host}/{tenant}/oauth2/v2.0/token",
                device_code: "https://{host}/{tenant}/oauth2/v2.0/devicecode",
                jwt_audience: "https://{host}/{tenant}/v2.0",
            },
        }
    }
}

/// Concrete endpoints for one (host, tenant) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    /// OAuth2 authorization endpoint
    pub authorization_endpoint: String,
    /// OAuth2 token endpoint
    pub token_endpoint: String,
    /// Device code endpoint
    pub device_code_endpoint: String,
    /// User realm lookup endpoint prefix
    pub user_realm_endpoint: String,
    /// Audience for self-signed client assertions
    pub self_signed_jwt_audience: String,
    /// Host the endpoints were built from (discovery-preferred alias)
    pub network_host: String,
    /// Stable host family for token cache keys
    pub cache_host: String,
}

/// Expand templates for an authority against an explicit host pair.
///
/// `network_host` goes into the URIs; `cache_host` is carried through
/// untouched as the token-cache identity.
pub fn resolve_with_hosts(
    info: &AuthorityInfo,
    network_host: &str,
    cache_host: &str,
) -> ResolvedEndpoints {
    let templates = EndpointTemplates::for_type(info.authority_type());
    let tenant_path = tenant_path(info);

    ResolvedEndpoints {
        authorization_endpoint: expand(templates.authorize, network_host, &tenant_path),
        token_endpoint: expand(templates.token, network_host, &tenant_path),
        device_code_endpoint: expand(templates.device_code, network_host, &tenant_path),
        user_realm_endpoint: format!("https://{network_host}/common/userrealm/"),
        self_signed_jwt_audience: expand(templates.jwt_audience, network_host, &tenant_path),
        network_host: network_host.to_string(),
        cache_host: cache_host.to_string(),
    }
}

/// The canonical path portion: the tenant segment, or tenant plus policy
/// segments for B2C.
fn tenant_path(info: &AuthorityInfo) -> String {
    info.canonical_authority()
        .trim_start_matches("https://")
        .split_once('/')
        .map(|(_, path)| path.trim_end_matches('/').to_string())
        .unwrap_or_else(|| info.tenant().to_string())
}

fn expand(template: &str, host: &str, tenant_path: &str) -> String {
    template
        .replace("{host}", host)
        .replace("{tenant}", tenant_path)
}

/// Resolves an authority into concrete endpoints, consulting instance
/// discovery for AAD authorities.
///
/// This is the seam the token-acquisition flows call: AAD authorities are
/// routed through the [`InstanceDiscoveryCache`] so the network URIs use the
/// cloud's preferred alias, while every other type resolves purely from
/// templates with no I/O.
#[derive(Debug, Clone)]
pub struct AuthorityResolver {
    discovery: Arc<InstanceDiscoveryCache>,
}

impl AuthorityResolver {
    /// Create a resolver backed by a shared discovery cache.
    pub fn new(discovery: Arc<InstanceDiscoveryCache>) -> Self {
        Self { discovery }
    }

    /// The discovery cache backing AAD resolution.
    pub fn discovery(&self) -> &InstanceDiscoveryCache {
        &self.discovery
    }

    /// Resolve endpoints for a normalized authority.
    ///
    /// # Errors
    ///
    /// Propagates discovery failures only when the authority requested
    /// validation; see [`InstanceDiscoveryCache::get_metadata_entry`].
    pub async fn resolve(
        &self,
        info: &AuthorityInfo,
    ) -> Result<ResolvedEndpoints, AuthorityError> {
        match info.authority_type() {
            AuthorityType::Aad => {
                let entry = self
                    .discovery
                    .get_metadata_entry(info.host(), info.validate_authority())
                    .await?;
                Ok(resolve_with_hosts(
                    info,
                    &entry.preferred_network,
                    &entry.preferred_cache,
                ))
            }
            _ => Ok(resolve_with_hosts(
                info,
                info.authority_host(),
                info.authority_host(),
            )),
        }
    }
}
