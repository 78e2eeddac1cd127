//! # Authorities
//!
//! Normalization and classification of developer-supplied authority strings.
//!
//! An authority string such as `https://login.microsoftonline.com/common` is
//! canonicalized into an immutable [`AuthorityInfo`] (https scheme enforced,
//! lowercased, trailing slash, tenant segment extracted) and classified into
//! exactly one [`AuthorityType`] by the ordered predicate registry in
//! [`registry`]. [`Authority`] wraps the current descriptor together with a
//! resolve-once endpoint slot; substituting a concrete tenant for the
//! tenantless marker produces a new canonical string and invalidates the
//! cached endpoints.

pub mod endpoints;
pub mod registry;

use std::fmt;

use tokio::sync::RwLock;
use url::Url;

use crate::error::AuthorityError;
use endpoints::{AuthorityResolver, ResolvedEndpoints};

/// Tenant values that stand in for "any tenant" until a user signs in.
const TENANTLESS_TENANT_NAMES: [&str; 3] = ["common", "organizations", "consumers"];

/// The closed set of authority variants the registry can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityType {
    /// Azure AD (work and school accounts, plus MSA through `common`)
    Aad,
    /// Active Directory Federation Services, on-premises
    Adfs,
    /// Azure AD B2C (consumer identity with sign-in policies)
    B2C,
    /// Customer identity (CIAM) on `*.ciamlogin.com`
    Ciam,
    /// dSTS, an internal security token service
    Dsts,
    /// Catch-all for OIDC-compatible authorities not otherwise classified
    Generic,
}

impl AuthorityType {
    /// Whether network-backed authority validation is available for this
    /// type. Only AAD and ADFS support it; everything else must be used
    /// with `validate_authority = false`.
    pub fn supports_validation(self) -> bool {
        matches!(self, AuthorityType::Aad | AuthorityType::Adfs)
    }
}

impl fmt::Display for AuthorityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthorityType::Aad => "AAD",
            AuthorityType::Adfs => "ADFS",
            AuthorityType::B2C => "B2C",
            AuthorityType::Ciam => "CIAM",
            AuthorityType::Dsts => "dSTS",
            AuthorityType::Generic => "Generic",
        };
        f.write_str(name)
    }
}

/// Immutable, canonical descriptor of an authority.
///
/// Invariants: the canonical authority is an absolute https URI, lowercased,
/// with a trailing slash and at least one path segment (B2C keeps three).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityInfo {
    authority_type: AuthorityType,
    canonical_authority: String,
    host: String,
    tenant: String,
    validate_authority: bool,
}

impl AuthorityInfo {
    /// Normalize a raw authority string into a canonical descriptor.
    ///
    /// # Errors
    ///
    /// - [`AuthorityError::InvalidUriFormat`] for relative or malformed URIs
    /// - [`AuthorityError::UriInsecure`] for non-https schemes
    /// - [`AuthorityError::UriInvalidPath`] when no path segment is present
    /// - [`AuthorityError::B2cUriInvalidPath`] when a B2C authority has
    ///   fewer than three path segments
    /// - [`AuthorityError::UnsupportedAuthorityValidation`] when validation
    ///   is requested for a type that cannot validate
    pub fn from_authority_uri(
        raw_authority: &str,
        validate_authority: bool,
    ) -> Result<Self, AuthorityError> {
        let lowered = canonicalize_authority_uri(raw_authority);
        if lowered.is_empty() {
            return Err(AuthorityError::InvalidUriFormat(raw_authority.to_string()));
        }

        let uri = Url::parse(&lowered)
            .map_err(|_| AuthorityError::InvalidUriFormat(raw_authority.to_string()))?;
        let host = uri
            .host_str()
            .ok_or_else(|| AuthorityError::InvalidUriFormat(raw_authority.to_string()))?
            .to_string();
        if uri.scheme() != "https" {
            return Err(AuthorityError::UriInsecure);
        }

        let segments: Vec<&str> = uri
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if segments.is_empty() {
            return Err(AuthorityError::UriInvalidPath);
        }

        let authority_type = registry::default_registry().classify(&uri);
        if validate_authority && !authority_type.supports_validation() {
            return Err(AuthorityError::UnsupportedAuthorityValidation(
                authority_type,
            ));
        }

        let authority = host_and_port(&uri, &host);
        let canonical_authority = if authority_type == AuthorityType::B2C {
            // B2C keeps tenant and policy: e.g. tfp/{tenant}/{policy}
            if segments.len() < 3 {
                return Err(AuthorityError::B2cUriInvalidPath);
            }
            format!(
                "https://{authority}/{}/{}/{}/",
                segments[0], segments[1], segments[2]
            )
        } else {
            format!("https://{authority}/{}/", segments[0])
        };

        Ok(Self {
            authority_type,
            canonical_authority,
            host,
            tenant: segments[0].to_string(),
            validate_authority,
        })
    }

    /// The classified authority type.
    pub fn authority_type(&self) -> AuthorityType {
        self.authority_type
    }

    /// The canonical authority URI (absolute https, trailing slash).
    pub fn canonical_authority(&self) -> &str {
        &self.canonical_authority
    }

    /// The authority hostname, without port. This is the cache-identity
    /// host family used to key instance discovery.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The first path segment: tenant id, domain, or a tenantless marker.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Whether network-backed validation was requested.
    pub fn validate_authority(&self) -> bool {
        self.validate_authority
    }

    /// Whether the tenant segment is a placeholder (`common`,
    /// `organizations`, `consumers`) resolved only after sign-in.
    pub fn is_tenantless(&self) -> bool {
        TENANTLESS_TENANT_NAMES
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&self.tenant))
    }

    /// Host and port portion of the canonical authority, e.g.
    /// `login.microsoftonline.com` or `fs.contoso.com:444`.
    pub fn authority_host(&self) -> &str {
        self.canonical_authority
            .trim_start_matches("https://")
            .split('/')
            .next()
            .unwrap_or(&self.host)
    }

    /// Prefix for user realm lookups against this authority's host.
    pub fn user_realm_uri_prefix(&self) -> String {
        format!("https://{}/common/userrealm/", self.authority_host())
    }

    /// Replace a tenantless marker with a concrete tenant id, yielding a new
    /// immutable descriptor with an updated canonical authority.
    ///
    /// The replacement is a single first-occurrence substitution of the
    /// marker segment; a non-tenantless authority is returned unchanged.
    pub fn with_tenant_id(&self, tenant_id: &str) -> Self {
        if !self.is_tenantless() || tenant_id.trim().is_empty() {
            return self.clone();
        }
        let tenant = tenant_id.trim().to_ascii_lowercase();
        let marker = format!("/{}/", self.tenant);
        let replacement = format!("/{tenant}/");
        let canonical_authority = self
            .canonical_authority
            .replacen(&marker, &replacement, 1);
        Self {
            canonical_authority,
            tenant,
            ..self.clone()
        }
    }
}

/// Append a trailing slash if absent and lowercase the whole string.
fn canonicalize_authority_uri(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut uri = trimmed.to_ascii_lowercase();
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

fn host_and_port(uri: &Url, host: &str) -> String {
    match uri.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// An authority plus its resolve-once endpoint state.
///
/// Endpoint templates are computed at most once per canonical authority;
/// [`update_tenant_id`](Authority::update_tenant_id) swaps in a new
/// descriptor and clears the computed endpoints under the same lock that
/// guards resolution, so concurrent readers either see the old resolved
/// state or recompute from the new canonical authority.
#[derive(Debug)]
pub struct Authority {
    state: RwLock<AuthorityState>,
}

#[derive(Debug)]
struct AuthorityState {
    info: AuthorityInfo,
    resolved: Option<ResolvedEndpoints>,
}

impl Authority {
    /// Wrap a normalized authority descriptor.
    pub fn new(info: AuthorityInfo) -> Self {
        Self {
            state: RwLock::new(AuthorityState {
                info,
                resolved: None,
            }),
        }
    }

    /// Snapshot of the current descriptor.
    pub async fn info(&self) -> AuthorityInfo {
        self.state.read().await.info.clone()
    }

    /// Resolved endpoints for this authority, computed on first use.
    ///
    /// The fast path takes only a read lock. On a miss, resolution runs
    /// under the write lock with a second cache check, so concurrent callers
    /// share one resolution.
    pub async fn endpoints(
        &self,
        resolver: &AuthorityResolver,
    ) -> Result<ResolvedEndpoints, AuthorityError> {
        {
            let state = self.state.read().await;
            if let Some(resolved) = &state.resolved {
                return Ok(resolved.clone());
            }
        }

        let mut state = self.state.write().await;
        if let Some(resolved) = &state.resolved {
            return Ok(resolved.clone());
        }
        let resolved = resolver.resolve(&state.info).await?;
        state.resolved = Some(resolved.clone());
        Ok(resolved)
    }

    /// Substitute a concrete tenant for the tenantless marker once it is
    /// known post-authentication. Invalidates any resolved endpoints.
    pub async fn update_tenant_id(&self, tenant_id: &str) {
        let mut state = self.state.write().await;
        let updated = state.info.with_tenant_id(tenant_id);
        if updated.canonical_authority() != state.info.canonical_authority() {
            tracing::debug!(
                from = %state.info.canonical_authority(),
                to = %updated.canonical_authority(),
                "tenant updated, endpoint resolution invalidated"
            );
            state.info = updated;
            state.resolved = None;
        }
    }
}
