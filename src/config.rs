//! C11 — Configuration: `ConfidenceOptions` with constructor-field >
//! env-var > hard-default precedence, mirroring `FlagdOptions::default()`.

use crate::sticky::MaterializationStore;
use crate::transport::TransportHooks;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_CDN_HOST: &str = "resolver.confidence.dev";
const DEFAULT_INGESTION_URL: &str = "https://events.confidence.dev/v1/flags:logExposures";

/// Options accepted by [`crate::ConfidenceProvider::new`]. Every field has
/// a fallback: constructor value, then the matching env var, then a hard
/// default.
pub struct ConfidenceOptions {
    pub client_secret: String,
    /// Compiled resolver engine bytes.
    pub resolver_module: Vec<u8>,
    /// A bare host (`resolver.confidence.dev`) or, for pointing at a local
    /// mock server in tests, a full `http(s)://` base URL.
    pub cdn_host: Option<String>,
    pub ingestion_url: Option<String>,
    pub transport_hooks: Option<Arc<dyn TransportHooks>>,
    pub materialization_store: Option<Arc<dyn MaterializationStore>>,
    pub poll_interval: Option<Duration>,
}

impl ConfidenceOptions {
    pub fn new(client_secret: impl Into<String>, resolver_module: Vec<u8>) -> Self {
        Self {
            client_secret: client_secret.into(),
            resolver_module,
            cdn_host: None,
            ingestion_url: None,
            transport_hooks: None,
            materialization_store: None,
            poll_interval: None,
        }
    }

    pub fn cdn_host(&self) -> String {
        self.cdn_host
            .clone()
            .or_else(|| std::env::var("CONFIDENCE_CDN_HOST").ok())
            .unwrap_or_else(|| DEFAULT_CDN_HOST.to_string())
    }

    pub fn ingestion_url(&self) -> String {
        self.ingestion_url
            .clone()
            .or_else(|| std::env::var("CONFIDENCE_INGESTION_URL").ok())
            .unwrap_or_else(|| DEFAULT_INGESTION_URL.to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or_else(|| {
            let secs = std::env::var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
            Duration::from_secs(secs)
        })
    }

    pub fn client_secret(&self) -> Option<String> {
        if !self.client_secret.is_empty() {
            return Some(self.client_secret.clone());
        }
        std::env::var("CONFIDENCE_CLIENT_SECRET").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn poll_interval_falls_back_to_default() {
        std::env::remove_var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS");
        let options = ConfidenceOptions::new("secret", Vec::new());
        assert_eq!(options.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn constructor_value_wins_over_env() {
        std::env::set_var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS", "5");
        let mut options = ConfidenceOptions::new("secret", Vec::new());
        options.poll_interval = Some(Duration::from_secs(99));
        assert_eq!(options.poll_interval(), Duration::from_secs(99));
        std::env::remove_var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS");
    }

    #[test]
    #[serial]
    fn env_wins_over_hard_default() {
        std::env::set_var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS", "7");
        let options = ConfidenceOptions::new("secret", Vec::new());
        assert_eq!(options.poll_interval(), Duration::from_secs(7));
        std::env::remove_var("CONFIDENCE_RESOLVER_POLL_INTERVAL_SECONDS");
    }
}
