//! HTTP execution layer.
//!
//! Every outbound call goes through [`HttpClient::execute`], which claims a
//! slot from the shared [`HostRateLimiter`], classifies the outcome into a
//! [`SyncError`] and retries retryable failures on the policy's backoff
//! schedule. A 429 records a reset window for the host, so unrelated calls to
//! the same host wait it out before dispatching.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use relaypost_common::{resilience::clamp_retry_after, HostRateLimiter};
use relaypost_core::{RawResponse, SyncError};
use relaypost_domain::RelayPostError;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::{debug, warn};
use url::Url;

use super::policy::{parse_retry_after, RequestPolicy};
use crate::errors::InfraError;

/// Longest error excerpt taken from a response body.
const MAX_BODY_EXCERPT: usize = 200;

/// HTTP client with pacing, rate-limit cooperation and retries.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    limiter: Arc<HostRateLimiter>,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, RelayPostError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    pub fn limiter(&self) -> &Arc<HostRateLimiter> {
        &self.limiter
    }

    /// Execute the request under `policy`.
    ///
    /// Only 2xx responses are returned as `Ok`; everything else is classified
    /// and, once attempts are exhausted or the error is terminal, returned as
    /// the last error.
    pub async fn execute(
        &self,
        builder: RequestBuilder,
        policy: &RequestPolicy,
    ) -> Result<RawResponse, SyncError> {
        let attempts = policy.max_attempts.max(1);

        for attempt in 0..attempts {
            let request = builder
                .try_clone()
                .ok_or_else(|| {
                    SyncError::Internal(
                        "request body cannot be cloned; buffer the body to enable retries".into(),
                    )
                })?
                .timeout(policy.timeout)
                .build()
                .map_err(|err| SyncError::Validation {
                    status: None,
                    message: format!("invalid request: {err}"),
                })?;

            let method = request.method().clone();
            let host = host_key(request.url());
            let waited = self.limiter.acquire(&host).await;
            if !waited.is_zero() {
                debug!(%host, waited_ms = waited.as_millis() as u64, "host slot acquired");
            }

            let error = match self.client.execute(request).await {
                Ok(response) => match read_response(response).await {
                    Ok(raw) if raw.is_success() => {
                        debug!(%method, %host, attempt = attempt + 1, status = raw.status, "request succeeded");
                        return Ok(raw);
                    }
                    Ok(raw) => classify_status(&raw),
                    Err(err) => classify_transport(&err),
                },
                Err(err) => classify_transport(&err),
            };

            let delay = self.retry_delay(&host, &error, attempt, policy);
            let retry = attempt + 1 < attempts && error.is_retryable();
            warn!(
                %method,
                %host,
                attempt = attempt + 1,
                max_attempts = attempts,
                error = %error,
                delay_ms = delay.as_millis() as u64,
                retry,
                "request failed"
            );
            if !retry {
                return Err(error);
            }
            // A 429 window is already recorded; `acquire` waits it out.
            if !matches!(error, SyncError::RateLimited { .. }) && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Err(SyncError::Internal("http client exhausted retries without producing a result".into()))
    }

    /// Wait before the next attempt. On 429 the window is recorded for the
    /// host as a side effect.
    fn retry_delay(
        &self,
        host: &str,
        error: &SyncError,
        attempt: u32,
        policy: &RequestPolicy,
    ) -> Duration {
        match error {
            SyncError::RateLimited { retry_after, .. } => {
                let wait = match retry_after {
                    Some(hint) if policy.honor_retry_after => clamp_retry_after(*hint),
                    _ => policy.backoff.delay(attempt, false),
                };
                self.limiter.record_rate_limit(host, wait);
                wait
            }
            SyncError::Server { .. } => policy.backoff.delay(attempt, true),
            _ => policy.backoff.delay(attempt, false),
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
    limiter: Option<Arc<HostRateLimiter>>,
    accept_invalid_certs: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            user_agent: Some(concat!("relaypost/", env!("CARGO_PKG_VERSION")).to_string()),
            default_headers: None,
            limiter: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpClientBuilder {
    /// Client-wide ceiling; each call also carries its policy timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Share a limiter with other clients in the process.
    pub fn limiter(mut self, limiter: Arc<HostRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<HttpClient, RelayPostError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            RelayPostError::from(infra)
        })?;

        Ok(HttpClient {
            client,
            limiter: self.limiter.unwrap_or_else(|| Arc::new(HostRateLimiter::default())),
        })
    }
}

/// Limiter key: host plus effective port.
pub fn host_key(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => url.as_str().to_string(),
    }
}

async fn read_response(response: Response) -> Result<RawResponse, reqwest::Error> {
    let status = response.status().as_u16();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();
    let body = response.text().await?;
    Ok(RawResponse { status, headers, body })
}

/// Map a non-2xx response onto the error taxonomy.
pub fn classify_status(response: &RawResponse) -> SyncError {
    let status = response.status;
    let message = format!("HTTP {status}: {}", error_message(response));
    match status {
        401 | 403 => SyncError::Authentication(message),
        429 => SyncError::RateLimited {
            message,
            retry_after: response
                .header("retry-after")
                .and_then(|value| parse_retry_after(value, chrono::Utc::now())),
        },
        500..=599 => SyncError::server(status, message),
        _ => SyncError::validation(status, message),
    }
}

/// Map a transport failure onto the error taxonomy.
pub fn classify_transport(err: &reqwest::Error) -> SyncError {
    if err.is_builder() {
        return SyncError::Validation { status: None, message: format!("invalid request: {err}") };
    }
    if err.is_timeout() {
        return SyncError::Connectivity(format!("request timed out: {err}"));
    }
    SyncError::Connectivity(err.to_string())
}

/// The API's `message` field when present, else a body excerpt.
fn error_message(response: &RawResponse) -> String {
    if let Some(message) = response
        .json()
        .as_ref()
        .and_then(|value| value.get("message"))
        .and_then(|message| message.as_str())
    {
        return message.to_string();
    }
    let body = response.body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    body.chars().take(MAX_BODY_EXCERPT).collect()
}
