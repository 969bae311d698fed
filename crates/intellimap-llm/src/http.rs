//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

/// Create an HTTP client with the standard configuration.
///
/// Config: 30s connect timeout, 120s request timeout, rustls TLS,
/// `intellimap/{version}` user-agent, redirect limit 10. Falls back to the
/// library default client if the builder rejects the configuration.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("intellimap/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Read a non-success response into a vendor error.
pub(crate) async fn provider_error(
    provider: &'static str,
    response: reqwest::Response,
) -> crate::LlmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::error!(provider, status, body = %body, "API request rejected");
    crate::LlmError::Provider {
        provider,
        status,
        body,
    }
}
