//! C7 — State Fetcher: CDN polling with ETag revalidation.

use crate::error::ResolverError;
use crate::types::{ClientSecret, SetResolverStateEnvelope};
use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument};

struct CachedState {
    state: Vec<u8>,
    account_id: String,
    etag: Option<String>,
}

/// Polls a CDN-hosted, ETag-revalidated resolver state blob.
/// Cached values survive a failed revalidation: a transport error or
/// non-2xx/304 status only fails that call, the previous state keeps
/// serving.
pub struct StateFetcher {
    client: reqwest::Client,
    url: String,
    cached: ArcSwap<CachedState>,
}

impl StateFetcher {
    /// `cdn_base_url` carries its own scheme (`https://resolver.confidence.dev`
    /// in production; a `wiremock::MockServer` URI in tests, mirroring the
    /// OFREP crate's test harness of swapping the base URL for a mock
    /// server instead of faking DNS).
    pub fn new(client: reqwest::Client, cdn_base_url: &str, client_secret: &ClientSecret) -> Self {
        let digest = Sha256::digest(client_secret.as_str().as_bytes());
        let url = format!("{cdn_base_url}/{}", hex::encode(digest));
        Self {
            client,
            url,
            cached: ArcSwap::from_pointee(CachedState {
                state: Vec::new(),
                account_id: String::new(),
                etag: None,
            }),
        }
    }

    pub fn state(&self) -> Vec<u8> {
        self.cached.load().state.clone()
    }

    pub fn account_id(&self) -> String {
        self.cached.load().account_id.clone()
    }

    pub fn as_envelope(&self) -> SetResolverStateEnvelope {
        let cached = self.cached.load();
        SetResolverStateEnvelope {
            state: cached.state.clone(),
            account_id: cached.account_id.clone(),
        }
    }

    /// Revalidates against the CDN, publishing the new state/accountId/etag
    /// on a `200`, leaving the cache untouched on `304`, and returning
    /// `Err` without touching the cache on any other outcome.
    #[instrument(skip(self))]
    pub async fn provide(&self) -> Result<(Vec<u8>, String), ResolverError> {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = self.cached.load().etag.clone() {
            request = request.header("If-None-Match", etag);
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            let cached = self.cached.load();
            return Ok((cached.state.clone(), cached.account_id.clone()));
        }

        if !response.status().is_success() {
            return Err(ResolverError::StateFetch(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let envelope: SetResolverStateEnvelope = response.json().await?;
        info!(account_id = %envelope.account_id, "published new resolver state");

        let state = envelope.state.clone();
        let account_id = envelope.account_id.clone();
        self.cached.store(Arc::new(CachedState {
            state: envelope.state,
            account_id: envelope.account_id,
            etag,
        }));
        Ok((state, account_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn secret() -> ClientSecret {
        ClientSecret::new("test-secret")
    }

    #[test_log::test(tokio::test)]
    #[serial]
    async fn fetches_and_caches_initial_state() {
        let server = MockServer::start().await;
        let expected_path = format!(
            "/{}",
            hex::encode(Sha256::digest(secret().as_str().as_bytes()))
        );
        Mock::given(method("GET"))
            .and(path(expected_path))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_json(serde_json::json!({"state": [1,2,3], "accountId": "acct-1"})),
            )
            .mount(&server)
            .await;

        let fetcher = StateFetcher::new(reqwest::Client::new(), &server.uri(), &secret());
        let (state, account_id) = fetcher.provide().await.unwrap();
        assert_eq!(state, vec![1, 2, 3]);
        assert_eq!(account_id, "acct-1");
    }

    #[test_log::test(tokio::test)]
    #[serial]
    async fn not_modified_keeps_cached_state() {
        let server = MockServer::start().await;
        let expected_path = format!(
            "/{}",
            hex::encode(Sha256::digest(secret().as_str().as_bytes()))
        );
        Mock::given(method("GET"))
            .and(path(expected_path.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_json(serde_json::json!({"state": [9], "accountId": "acct-1"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(expected_path))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let fetcher = StateFetcher::new(reqwest::Client::new(), &server.uri(), &secret());
        fetcher.provide().await.unwrap();
        let (state, account_id) = fetcher.provide().await.unwrap();
        assert_eq!(state, vec![9]);
        assert_eq!(account_id, "acct-1");
    }

    #[test_log::test(tokio::test)]
    #[serial]
    async fn server_error_leaves_cache_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = StateFetcher::new(reqwest::Client::new(), &server.uri(), &secret());
        let result = fetcher.provide().await;
        assert!(result.is_err());
        assert_eq!(fetcher.account_id(), "");
    }
}
