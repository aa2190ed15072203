//! End-to-end Init→Evaluate→Shutdown exercise against a minimal in-process
//! WASM resolver fixture compiled from WAT, with the CDN mocked via
//! `wiremock`. The fixture ignores request content and always answers
//! `resolve_with_sticky` with a `Success` resolution for `bool-flag`, so
//! this exercises the real engine host/pool/swap/sticky/evaluate wiring
//! without shipping a real resolver `.wasm` binary.

use open_feature::provider::FeatureProvider;
use open_feature::{EvaluationContext, EvaluationReason};
use open_feature_confidence::{ConfidenceOptions, ConfidenceProvider};
use sha2::{Digest, Sha256};
use std::time::Duration;
use test_log::test;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

const CLIENT_SECRET: &str = "e2e-test-secret";

#[test(tokio::test)]
async fn resolves_bool_flag_through_the_sandboxed_engine() {
    let server = MockServer::start().await;
    let expected_path = format!(
        "/{}",
        hex::encode(Sha256::digest(CLIENT_SECRET.as_bytes()))
    );
    Mock::given(method("GET"))
        .and(path(expected_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(serde_json::json!({"state": [], "accountId": "acct-e2e"})),
        )
        .mount(&server)
        .await;

    let mut options = ConfidenceOptions::new(CLIENT_SECRET, common::fixture_module());
    options.cdn_host = Some(server.uri());
    options.ingestion_url = Some(format!("{}/v1/flags:logExposures", server.uri()));
    options.poll_interval = Some(Duration::from_secs(3600));

    let provider = ConfidenceProvider::new(options).await.unwrap();

    let context = EvaluationContext::default().with_targeting_key("user-1");
    let result = provider
        .resolve_bool_value("bool-flag", &context)
        .await
        .unwrap();

    assert_eq!(result.value, true);
    assert_eq!(result.variant.as_deref(), Some("on"));
    assert_eq!(result.reason, Some(EvaluationReason::TargetingMatch));

    provider.shutdown().await;
}

#[test(tokio::test)]
async fn dotted_path_into_the_resolved_value_returns_default_when_missing() {
    let server = MockServer::start().await;
    let expected_path = format!(
        "/{}",
        hex::encode(Sha256::digest(CLIENT_SECRET.as_bytes()))
    );
    Mock::given(method("GET"))
        .and(path(expected_path))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(serde_json::json!({"state": [], "accountId": "acct-e2e"})),
        )
        .mount(&server)
        .await;

    let mut options = ConfidenceOptions::new(CLIENT_SECRET, common::fixture_module());
    options.cdn_host = Some(server.uri());
    options.ingestion_url = Some(format!("{}/v1/flags:logExposures", server.uri()));
    options.poll_interval = Some(Duration::from_secs(3600));

    let provider = ConfidenceProvider::new(options).await.unwrap();

    let context = EvaluationContext::default().with_targeting_key("user-1");
    // "bool-flag" resolves to a bare JSON `true`; asking for a nested path
    // into it must report FlagNotFound (path not found in a scalar).
    let result = provider
        .resolve_bool_value("bool-flag.nested", &context)
        .await;
    assert!(result.is_err());

    provider.shutdown().await;
}
