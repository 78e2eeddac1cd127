//! Legacy trusted-host validation against a mock verification service.
//!
//! Covers the short-circuit for listed hosts, the single v1 verification
//! call for everything else, and the mapping of verification failures to
//! `NotInValidList`.

use entra_authority::{AuthorityError, LegacyConfig, LegacyHostValidator};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn validator_against(server: &MockServer, trusted_hosts: &[&str]) -> LegacyHostValidator {
    LegacyHostValidator::with_trusted_hosts(
        LegacyConfig {
            endpoint_override: Some(format!("{}/common/discovery/instance", server.uri())),
            ..LegacyConfig::default()
        },
        trusted_hosts.iter().map(|h| (*h).to_string()).collect(),
    )
    .expect("validator creation")
}

#[tokio::test]
async fn untrusted_host_is_verified_with_one_v1_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .and(query_param("api-version", "1.0"))
        .and(query_param(
            "authorization_endpoint",
            "https://sts.contoso.example/tenant7/oauth2/authorize",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tenant_discovery_endpoint":
                "https://sts.contoso.example/tenant7/.well-known/openid-configuration"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let validator = validator_against(&server, &["login.microsoftonline.com"]);
    let authority = Url::parse("https://sts.contoso.example/tenant7/").unwrap();
    validator
        .validate_authority(&authority)
        .await
        .expect("verified via anchor host");
    // expect(1) verifies on drop that exactly one request was made.
}

#[tokio::test]
async fn missing_tenant_discovery_endpoint_maps_to_not_in_valid_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let validator = validator_against(&server, &["login.microsoftonline.com"]);
    let authority = Url::parse("https://sts.contoso.example/tenant/").unwrap();
    let err = validator.validate_authority(&authority).await.unwrap_err();
    assert!(matches!(
        err,
        AuthorityError::NotInValidList(host) if host == "sts.contoso.example"
    ));
}

#[tokio::test]
async fn verification_error_status_maps_to_not_in_valid_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_instance"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let validator = validator_against(&server, &["login.microsoftonline.com"]);
    let authority = Url::parse("https://evil.example.com/common/").unwrap();
    let err = validator.validate_authority(&authority).await.unwrap_err();
    assert!(matches!(err, AuthorityError::NotInValidList(_)));
}

#[tokio::test]
async fn singleton_trusted_list_short_circuits_its_own_host_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/common/discovery/instance"))
        .and(query_param("api-version", "1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tenant_discovery_endpoint":
                "https://login.microsoftonline.com/common/.well-known/openid-configuration"
        })))
        .expect(1)
        .mount(&server)
        .await;

    // The environment override collapses the trusted list to one host.
    let validator = validator_against(&server, &["sovereign.contoso.example"]);

    // The overridden host itself needs no network call.
    let own = Url::parse("https://Sovereign.Contoso.Example/tenant/").unwrap();
    validator
        .validate_authority(&own)
        .await
        .expect("short-circuit");

    // A worldwide host is no longer listed and must be verified.
    let other = Url::parse("https://login.microsoftonline.com/common/").unwrap();
    validator
        .validate_authority(&other)
        .await
        .expect("verified via the singleton anchor");
}
