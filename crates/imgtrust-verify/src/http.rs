//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. The log and registry
//! clients never interpret status codes.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::{TransportError, TransportResult};

pub(crate) const USER_AGENT_VALUE: &str = concat!("imgtrust/", env!("CARGO_PKG_VERSION"));

const MAX_BACKOFF: Duration = Duration::from_secs(5);
const BASE_BACKOFF_MS: u64 = 200;

/// HTTP backend shared by the log and registry clients.
///
/// Holds no per-call state, so one instance serves concurrent calls.
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    client: reqwest::Client,
    token_provider: TokenProvider,
    max_retries: u32,
}

impl HttpBackend {
    pub(crate) fn new(
        token_provider: TokenProvider,
        max_retries: u32,
        request_timeout: Duration,
    ) -> TransportResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| TransportError::Network {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            token_provider,
            max_retries,
        })
    }

    /// GET and decode a JSON body.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        accept: Option<&str>,
    ) -> TransportResult<T> {
        let response = self.request(reqwest::Method::GET, url, accept, None).await?;
        decode_json(response).await
    }

    /// POST a JSON body and decode the JSON response.
    pub(crate) async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> TransportResult<T> {
        let body = serde_json::to_vec(body)
            .map_err(|e| TransportError::invalid_response(format!("request body: {}", e)))?;
        let response = self
            .request(reqwest::Method::POST, url, Some("application/json"), Some(body))
            .await?;
        decode_json(response).await
    }

    /// GET raw bytes.
    pub(crate) async fn get_bytes(&self, url: &str) -> TransportResult<Vec<u8>> {
        let response = self.request(reqwest::Method::GET, url, None, None).await?;
        let bytes = response.bytes().await.map_err(|e| TransportError::Network {
            message: format!("failed to read response body: {}", e),
        })?;
        Ok(bytes.to_vec())
    }

    /// HEAD, returning the response headers.
    pub(crate) async fn head(&self, url: &str, accept: Option<&str>) -> TransportResult<HeaderMap> {
        let response = self.request(reqwest::Method::HEAD, url, accept, None).await?;
        Ok(response.headers().clone())
    }

    /// Make a request, retrying transient failures.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        accept: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> TransportResult<reqwest::Response> {
        let mut retries = 0;

        loop {
            let result = self
                .request_once(method.clone(), url, accept, body.clone())
                .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let backoff = backoff_for(&e, retries);

                    warn!(
                        error = %e,
                        url = %url,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
        accept: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> TransportResult<reqwest::Response> {
        debug!(method = %method, url = %url, "sending request");
        let mut request = self.client.request(method, url);

        if let Some(token) = self.token_provider.get_token().await? {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => Err(TransportError::Unauthorized {
                message: format!("HTTP {} from {}", status.as_u16(), url),
            }),

            404 => Err(TransportError::NotFound {
                resource: url.to_string(),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(TransportError::RateLimited { retry_after })
            }

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(TransportError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), message.trim()),
                })
            }
        }
    }
}

async fn decode_json<T: DeserializeOwned>(response: reqwest::Response) -> TransportResult<T> {
    let bytes = response.bytes().await.map_err(|e| TransportError::Network {
        message: format!("failed to read response body: {}", e),
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TransportError::invalid_response(format!("failed to parse response: {}", e)))
}

/// Jittered delay before retry number `retry` (1-based).
fn backoff_for(error: &TransportError, retry: u32) -> Duration {
    use rand::Rng;

    match error {
        TransportError::RateLimited {
            retry_after: Some(retry_after),
        } => {
            let capped = (*retry_after).min(MAX_BACKOFF);
            let base_ms = capped.as_millis() as u64;
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
            Duration::from_millis(jittered_ms.max(100))
        }
        _ => {
            let base_ms = BASE_BACKOFF_MS
                .saturating_mul(1u64 << retry.min(16))
                .min(MAX_BACKOFF.as_millis() as u64);
            let jittered_ms = rand::thread_rng().gen_range(0..=base_ms);
            Duration::from_millis(jittered_ms.max(10))
        }
    }
}
