//! Error types for authority resolution, instance discovery and region
//! autodetection.

use thiserror::Error;

use crate::authority::AuthorityType;

/// Errors surfaced by authority resolution and discovery.
///
/// Configuration errors (malformed authority, incompatible validation
/// request) are synchronous and non-retryable. Discovery errors are only
/// propagated when the caller asked for authority validation; otherwise they
/// are absorbed and a degraded self-referencing cache entry is used instead.
#[derive(Debug, Error)]
pub enum AuthorityError {
    /// The authority string is not a well-formed absolute URI
    #[error("authority is not a well-formed absolute URI: {0}")]
    InvalidUriFormat(String),

    /// The authority URI does not use the https scheme
    #[error("authority must use the https scheme")]
    UriInsecure,

    /// The authority URI has no path segment (tenant or realm)
    #[error("authority must contain at least one path segment, such as the tenant")]
    UriInvalidPath,

    /// A B2C authority needs tenant and policy path segments
    #[error("B2C authority must contain at least three path segments, e.g. tfp/tenant/policy")]
    B2cUriInvalidPath,

    /// Authority validation was requested for a type that cannot validate
    #[error("authority validation is not supported for {0} authorities")]
    UnsupportedAuthorityValidation(AuthorityType),

    /// The discovery service does not recognize the authority host
    #[error("authority host {0} is not in the list of valid authorities known to the discovery service")]
    NotInValidList(String),

    /// Instance discovery returned a service-level failure
    #[error("instance discovery failed: {0}")]
    Discovery(String),

    /// A service response contained invalid JSON
    #[error("invalid JSON in service response: {0}")]
    InvalidJson(String),

    /// Region autodetection failed
    #[error("region discovery failed: {0}")]
    RegionDiscovery(String),

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(String),
}
