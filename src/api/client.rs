//! ApiClient - talks to the recognition service for sync and online search.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::{is_transient_network_error, is_transient_status, parse_retry_after, RetryPolicy};
use crate::engine::Catalog;
use crate::error::ScannerError;

/// The environment variable name for the service API key.
pub const API_KEY_ENV: &str = "SCAN_RELAY_API_KEY";

/// Default base URL of the recognition service.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8700";

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Body of an online search request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub fingerprint: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Outcome of a single request attempt.
enum RequestError {
    /// Worth retrying after a backoff
    Transient(String),
    /// 429 from the service
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    /// Not retried
    Fatal(ScannerError),
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if is_transient_network_error(&e) {
            RequestError::Transient(e.to_string())
        } else {
            RequestError::Fatal(e.into())
        }
    }
}

/// Client for the recognition service.
#[derive(Clone)]
pub struct ApiClient {
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// Create a client for `base_url`, reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ScannerError::MissingApiKey` if `SCAN_RELAY_API_KEY` is not set.
    pub fn from_env(base_url: &str) -> Result<Self, ScannerError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| ScannerError::MissingApiKey)?;
        Self::new(api_key, base_url)
    }

    /// Create a client with an explicit API key.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ScannerError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ScannerError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Download the catalog changed since `revision`.
    ///
    /// Transient failures are retried according to the retry policy.
    pub async fn fetch_catalog(&self, revision: u64) -> Result<Catalog, ScannerError> {
        self.send_with_retry("sync", || self.try_fetch_catalog(revision))
            .await
    }

    /// Ask the service which record `request` shows. `None` means no match.
    pub async fn search(&self, request: &SearchRequest) -> Result<Option<String>, ScannerError> {
        self.send_with_retry("search", || self.try_search(request))
            .await
    }

    async fn try_fetch_catalog(&self, revision: u64) -> Result<Catalog, RequestError> {
        let url = format!("{}/sync", self.base_url);
        log::debug!("GET {} (since revision {})", url, revision);

        let response = self
            .http_client
            .get(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .query(&[("since", revision)])
            .send()
            .await?;

        let response = check_status(response).await?;
        let catalog: Catalog = response.json().await?;
        Ok(catalog)
    }

    async fn try_search(&self, request: &SearchRequest) -> Result<Option<String>, RequestError> {
        let url = format!("{}/search", self.base_url);
        log::debug!("POST {} ({}x{})", url, request.width, request.height);

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Key {}", self.api_key))
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: SearchResponse = response.json().await?;
        Ok(body.id.filter(|id| !id.is_empty()))
    }

    async fn send_with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ScannerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let max_attempts = self.retry.max_retries + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let (delay, exhausted) = match op().await {
                Ok(value) => return Ok(value),
                Err(RequestError::Fatal(e)) => return Err(e),
                Err(RequestError::Transient(message)) => {
                    if attempt >= max_attempts {
                        log::error!(
                            "{} failed after {} attempts. Giving up. Error: {}",
                            what,
                            attempt,
                            message
                        );
                        return Err(ScannerError::Network {
                            message,
                            attempts: attempt,
                        });
                    }
                    log::warn!(
                        "{} network error (attempt {}/{}): {}",
                        what,
                        attempt,
                        max_attempts,
                        message
                    );
                    (self.retry.backoff(attempt - 1), None)
                }
                Err(RequestError::RateLimited {
                    message,
                    retry_after_secs,
                }) => {
                    let delay = self.retry.rate_limit_delay(attempt - 1, retry_after_secs);
                    let exhausted = (attempt >= max_attempts).then_some(ScannerError::RateLimit {
                        message,
                        retry_after_secs,
                    });
                    (delay, exhausted)
                }
            };

            if let Some(e) = exhausted {
                log::error!("{} rate limited after {} attempts. Giving up.", what, attempt);
                return Err(e);
            }

            log::info!("Retrying {} in {:?}...", what, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Map a non-success response to the matching request error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
        let retry_after_secs = parse_retry_after(&response);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Rate limit exceeded".to_string());
        log::warn!(
            "Rate limited by recognition service. Retry-After: {:?} seconds",
            retry_after_secs
        );
        return Err(RequestError::RateLimited {
            message,
            retry_after_secs,
        });
    }

    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if is_transient_status(status.as_u16()) {
        return Err(RequestError::Transient(format!(
            "service unavailable ({}): {}",
            status, error_text
        )));
    }

    Err(RequestError::Fatal(ScannerError::Api(format!(
        "request failed with status {}: {}",
        status, error_text
    ))))
}
