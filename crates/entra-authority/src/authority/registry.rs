//! # Authority Type Registry
//!
//! Ordered predicate-chain dispatch over authority variants. A URI is
//! classified by the first registration whose predicate matches; the Generic
//! catch-all is appended structurally by [`RegistryBuilder::build`] so it is
//! always present and always last.
//!
//! Evaluation order is fixed and load-bearing:
//! Ciam → Adfs → B2C → Dsts → Aad → Generic.

use std::sync::LazyLock;

use url::Url;

use super::AuthorityType;

/// One entry in the registry: an authority type and its detection predicate.
#[derive(Clone, Copy)]
pub struct AuthorityRegistration {
    kind: AuthorityType,
    matches: fn(&Url) -> bool,
}

impl AuthorityRegistration {
    /// The authority type this registration produces.
    pub fn kind(&self) -> AuthorityType {
        self.kind
    }
}

impl std::fmt::Debug for AuthorityRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityRegistration")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Ordered list of authority registrations.
///
/// [`classify`](AuthorityRegistry::classify) is a total, pure function over
/// well-formed absolute https URIs: the Generic entry matches
/// unconditionally, so every URI maps to exactly one type.
#[derive(Debug)]
pub struct AuthorityRegistry {
    entries: Vec<AuthorityRegistration>,
}

impl AuthorityRegistry {
    /// Start building a registry. The Generic catch-all does not need to be
    /// (and cannot be) registered manually.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            entries: Vec::new(),
        }
    }

    /// Classify a URI into exactly one authority type.
    ///
    /// Returns the type of the first matching registration. Deterministic
    /// under repeated calls; no side effects.
    pub fn classify(&self, uri: &Url) -> AuthorityType {
        self.entries
            .iter()
            .find(|entry| (entry.matches)(uri))
            .map_or(AuthorityType::Generic, AuthorityRegistration::kind)
    }

    /// The registrations, in evaluation order.
    pub fn entries(&self) -> &[AuthorityRegistration] {
        &self.entries
    }
}

/// Builder enforcing the "Generic always last, always matches" invariant.
#[derive(Debug)]
pub struct RegistryBuilder {
    entries: Vec<AuthorityRegistration>,
}

impl RegistryBuilder {
    /// Append a registration. Order of registration is evaluation order.
    pub fn register(mut self, kind: AuthorityType, matches: fn(&Url) -> bool) -> Self {
        self.entries.push(AuthorityRegistration { kind, matches });
        self
    }

    /// Finish the registry, appending the unconditional Generic entry.
    pub fn build(mut self) -> AuthorityRegistry {
        self.entries.push(AuthorityRegistration {
            kind: AuthorityType::Generic,
            matches: |_| true,
        });
        AuthorityRegistry {
            entries: self.entries,
        }
    }
}

static DEFAULT_REGISTRY: LazyLock<AuthorityRegistry> = LazyLock::new(|| {
    AuthorityRegistry::builder()
        .register(AuthorityType::Ciam, is_ciam)
        .register(AuthorityType::Adfs, is_adfs)
        .register(AuthorityType::B2C, is_b2c)
        .register(AuthorityType::Dsts, is_dsts)
        .register(AuthorityType::Aad, is_aad)
        .build()
});

/// The process-wide registry with the standard detection order.
pub fn default_registry() -> &'static AuthorityRegistry {
    &DEFAULT_REGISTRY
}

fn host_of(uri: &Url) -> String {
    uri.host_str().unwrap_or_default().to_ascii_lowercase()
}

fn first_path_segment(uri: &Url) -> Option<String> {
    uri.path_segments()
        .and_then(|mut segments| segments.find(|segment| !segment.is_empty()))
        .map(str::to_ascii_lowercase)
}

fn is_ciam(uri: &Url) -> bool {
    host_of(uri).ends_with(".ciamlogin.com")
}

fn is_adfs(uri: &Url) -> bool {
    first_path_segment(uri).as_deref() == Some("adfs")
}

fn is_b2c(uri: &Url) -> bool {
    host_of(uri).contains(".b2clogin.com")
        || uri.path().to_ascii_lowercase().contains("b2c_1_")
        || first_path_segment(uri).as_deref() == Some("tfp")
}

fn is_dsts(uri: &Url) -> bool {
    let host = host_of(uri);
    host.contains("dstsv2") || host.ends_with(".dsts.core.windows.net")
}

// The exclusions are defensive: given the fixed evaluation order, Aad is
// only consulted after the more specific predicates failed. They must be
// kept if the registry order ever changes.
fn is_aad(uri: &Url) -> bool {
    !is_ciam(uri) && !is_adfs(uri) && !is_b2c(uri) && !is_dsts(uri)
}
