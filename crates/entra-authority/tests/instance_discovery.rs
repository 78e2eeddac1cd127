//! Instance discovery cache behavior against a mock discovery service.
//!
//! Covers the single-flight guarantee, alias fan-out, validation semantics,
//! and the interplay between discovery and endpoint resolution.

use std::sync::Arc;

use entra_authority::{
    Authority, AuthorityInfo, AuthorityResolver, DiscoveryConfig, InstanceDiscoveryCache,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cache_against(server: &MockServer) -> Arc<InstanceDiscoveryCache> {
    Arc::new(
        InstanceDiscoveryCache::with_config(DiscoveryConfig {
            endpoint_override: Some(format!("{}/common/discovery/instance", server.uri())),
            ..DiscoveryConfig::default()
        })
        .expect("cache creation"),
    )
}

fn aliased_response(network: &str, cache: &str, aliases: &[&str]) -> serde_json::Value {
    json!({
        "tenant_discovery_endpoint":
            format!("https://{network}/tenant/.well-known/openid-configuration"),
        "metadata": [{
            "preferred_network": network,
            "preferred_cache": cache,
            "aliases": aliases,
        }]
    })
}

#[tokio::test]
async fn concurrent_callers_share_one_discovery_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aliased_response(
            "sts.contoso.example",
            "sts.contoso.example",
            &["sts.contoso.example"],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_against(&server);
    let callers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_metadata_entry("sts.contoso.example", true)
                    .await
                    .expect("discovery")
            })
        })
        .collect();

    for caller in callers {
        let entry = caller.await.expect("join");
        assert_eq!(entry.preferred_network, "sts.contoso.example");
    }
    // expect(1) verifies on drop that exactly one request was made.
}

#[tokio::test]
async fn aliases_resolve_with_no_further_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aliased_response(
            "login.microsoftonline.com",
            "login.windows.net",
            &[
                "login.microsoftonline.com",
                "login.windows.net",
                "sts.windows.net",
            ],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_against(&server);
    let first = cache
        .get_metadata_entry("login.microsoftonline.com", true)
        .await
        .expect("discovery");

    for alias in ["login.windows.net", "sts.windows.net"] {
        let entry = cache
            .get_metadata_entry(alias, true)
            .await
            .expect("cached alias");
        assert_eq!(entry.preferred_network, first.preferred_network);
        assert_eq!(entry.preferred_cache, first.preferred_cache);
    }
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn unknown_host_fails_hard_when_validation_is_required() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_instance"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_against(&server);
    let err = cache
        .get_metadata_entry("invalid.example.com", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        entra_authority::AuthorityError::NotInValidList(host) if host == "invalid.example.com"
    ));
    // A hard validation failure is not cached.
    assert!(cache.is_empty());
}

#[tokio::test]
async fn unknown_host_is_absorbed_when_validation_is_optional() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_instance"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_against(&server);
    let entry = cache
        .get_metadata_entry("invalid.example.com", false)
        .await
        .expect("absorbed failure");
    assert_eq!(entry.preferred_network, "invalid.example.com");
    assert_eq!(entry.preferred_cache, "invalid.example.com");
    assert!(entry.aliases.is_empty());

    // The degraded entry is cached: the second call makes no request
    // (expect(1) would trip otherwise).
    let again = cache
        .get_metadata_entry("invalid.example.com", false)
        .await
        .expect("cache hit");
    assert_eq!(again.preferred_network, "invalid.example.com");
}

#[tokio::test]
async fn validation_requires_tenant_discovery_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "metadata": [] })))
        .mount(&server)
        .await;

    let cache = cache_against(&server);
    let err = cache
        .get_metadata_entry("login.windows.net", true)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        entra_authority::AuthorityError::NotInValidList(_)
    ));

    // Without validation the same response is accepted and self-registered.
    let entry = cache
        .get_metadata_entry("login.windows.net", false)
        .await
        .expect("best-effort discovery");
    assert_eq!(entry.preferred_network, "login.windows.net");
}

#[tokio::test]
async fn resolver_uses_preferred_network_and_keeps_cache_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aliased_response(
            "login.windows.net",
            "login.microsoftonline.com",
            &["login.microsoftonline.com", "login.windows.net"],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AuthorityResolver::new(cache_against(&server));
    let info =
        AuthorityInfo::from_authority_uri("https://login.microsoftonline.com/common", true)
            .expect("normalize");
    let resolved = resolver.resolve(&info).await.expect("resolve");

    assert_eq!(
        resolved.token_endpoint,
        "https://login.windows.net/common/oauth2/v2.0/token"
    );
    assert_eq!(resolved.network_host, "login.windows.net");
    assert_eq!(resolved.cache_host, "login.microsoftonline.com");
}

#[tokio::test]
async fn tenant_update_invalidates_resolved_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aliased_response(
            "login.microsoftonline.com",
            "login.microsoftonline.com",
            &["login.microsoftonline.com"],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = AuthorityResolver::new(cache_against(&server));
    let info =
        AuthorityInfo::from_authority_uri("https://login.microsoftonline.com/common/", false)
            .expect("normalize");
    let authority = Authority::new(info);

    let before = authority.endpoints(&resolver).await.expect("resolve");
    assert!(before.authorization_endpoint.contains("/common/"));

    authority.update_tenant_id("contoso-tenant-id").await;
    assert_eq!(
        authority.info().await.canonical_authority(),
        "https://login.microsoftonline.com/contoso-tenant-id/"
    );

    // Recomputed from the new canonical authority; the discovery entry is
    // already cached so no second network call happens.
    let after = authority.endpoints(&resolver).await.expect("re-resolve");
    assert_eq!(
        after.authorization_endpoint,
        "https://login.microsoftonline.com/contoso-tenant-id/oauth2/v2.0/authorize"
    );
}

#[tokio::test]
async fn non_aad_authorities_resolve_without_network() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would 404 and fail the test below.
    let resolver = AuthorityResolver::new(cache_against(&server));

    let info = AuthorityInfo::from_authority_uri(
        "https://contoso.b2clogin.com/tfp/contoso/b2c_1_susi",
        false,
    )
    .expect("normalize");
    let resolved = resolver.resolve(&info).await.expect("template-only resolve");
    assert_eq!(
        resolved.authorization_endpoint,
        "https://contoso.b2clogin.com/tfp/contoso/b2c_1_susi/oauth2/v2.0/authorize"
    );
}
