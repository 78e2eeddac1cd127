//! # Entra Authority - Authority Resolution and Discovery
//!
//! Turns a developer-supplied authority string into a validated, canonical
//! set of protocol endpoints for Microsoft Entra ID (Azure AD) and related
//! authority types, learns which cloud hostnames are interchangeable via
//! network-backed instance discovery, and autodetects the Azure region
//! nearest the running process.
//!
//! Every downstream token-acquisition flow sits on top of this subsystem:
//! a wrong endpoint is a silent security or availability failure, so the
//! pieces here are deliberately conservative about caching and validation.
//!
//! ## Architecture
//!
//! - [`authority`] - normalization, the ordered type registry, and the
//!   resolve-once [`Authority`] wrapper
//!   - [`authority::registry`] - predicate-chain classification
//!     (Ciam → Adfs → B2C → Dsts → Aad → Generic)
//!   - [`authority::endpoints`] - `{host}`/`{tenant}` template expansion
//! - [`discovery`] - the process-lifetime instance discovery cache with
//!   single-flight network population
//! - [`region`] - multi-source Azure region autodetection (env var, sticky
//!   cache, IMDS with version negotiation)
//! - [`legacy`] - the v1 static trusted-host list and one-shot verification
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use entra_authority::{Authority, AuthorityInfo, AuthorityResolver, InstanceDiscoveryCache};
//!
//! # async fn run() -> Result<(), entra_authority::AuthorityError> {
//! // Once at application startup:
//! let discovery = Arc::new(InstanceDiscoveryCache::new()?);
//! let resolver = AuthorityResolver::new(discovery);
//!
//! // Per configured authority:
//! let info = AuthorityInfo::from_authority_uri(
//!     "https://login.microsoftonline.com/common",
//!     true,
//! )?;
//! let authority = Authority::new(info);
//!
//! let endpoints = authority.endpoints(&resolver).await?;
//! println!("token endpoint: {}", endpoints.token_endpoint);
//!
//! // After sign-in, pin the tenant; endpoints recompute on next use.
//! authority.update_tenant_id("contoso-tenant-id").await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! All network paths are async; nothing blocks a runtime thread. The
//! discovery cache's read path is lock-free; population serializes behind
//! one global async mutex. Region discovery memoizes both success and
//! failure for the process lifetime.

pub mod authority;
pub mod discovery;
pub mod error;
pub mod legacy;
pub mod region;

#[doc(inline)]
pub use authority::endpoints::{AuthorityResolver, EndpointTemplates, ResolvedEndpoints};
#[doc(inline)]
pub use authority::registry::{
    AuthorityRegistration, AuthorityRegistry, RegistryBuilder, default_registry,
};
#[doc(inline)]
pub use authority::{Authority, AuthorityInfo, AuthorityType};
#[doc(inline)]
pub use discovery::{
    DiscoveryConfig, InstanceDiscoveryCache, InstanceDiscoveryMetadataEntry,
    InstanceDiscoveryResponse,
};
#[doc(inline)]
pub use error::AuthorityError;
#[doc(inline)]
pub use legacy::{LegacyConfig, LegacyHostValidator, TRUSTED_HOST_ENV_VAR};
#[doc(inline)]
pub use region::{
    ATTEMPT_REGION_DISCOVERY, REGION_ENV_VAR, RegionConfig, RegionInfo, RegionManager,
    RegionOutcome, RegionSource,
};
