//! C9 — Transport Hooks: a seam for customizing the outbound HTTP client.

/// Lets callers customize the `reqwest::Client` used for CDN polling and
/// log ingestion — proxies, TLS overrides, or (in tests) pointing requests
/// at a `wiremock::MockServer`, mirroring the OFREP crate's test harness.
pub trait TransportHooks: Send + Sync {
    fn modify_http(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        builder
    }
}

pub struct DefaultTransportHooks;

impl TransportHooks for DefaultTransportHooks {
    fn modify_http(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        builder
    }
}
