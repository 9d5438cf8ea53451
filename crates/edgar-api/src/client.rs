//! HTTP client for the SEC EDGAR data API.

use async_trait::async_trait;
use edgar_core::{EdgarApi, IngestError, Result};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// SEC EDGAR API base URL
pub const EDGAR_BASE_URL: &str = "https://data.sec.gov";

/// Default rate limit: 10 requests per second (SEC requirement)
const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Rate limiter to ensure we don't exceed SEC's rate limits
#[derive(Debug)]
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            last_request: now.checked_sub(min_interval).unwrap_or(now),
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// Exponential backoff for retryable responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one.
    pub base_delay: Duration,
    /// Upper bound for any single delay, including `Retry-After`.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Settings for [`EdgarClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API base URL, without a trailing slash.
    pub base_url: String,
    /// Client identification sent as `User-Agent`.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Minimum spacing between requests.
    pub rate_limit: Duration,
    /// Retry policy for 429, 5xx and connection failures.
    pub backoff: BackoffPolicy,
}

impl ClientOptions {
    /// Default options with the given user agent.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            base_url: EDGAR_BASE_URL.to_string(),
            user_agent: user_agent.into(),
            timeout: DEFAULT_TIMEOUT,
            rate_limit: DEFAULT_RATE_LIMIT,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusDisposition {
    Success,
    Retryable,
    Absent,
}

fn classify_status(status: StatusCode) -> StatusDisposition {
    if status.is_success() {
        StatusDisposition::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusDisposition::Retryable
    } else {
        StatusDisposition::Absent
    }
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

/// SEC EDGAR API client.
///
/// Sends the configured `User-Agent` on every request, spaces requests per
/// SEC requirements (max 10 requests/second by default) and retries rate
/// limited or failed requests with exponential backoff.
///
/// Clones share the rate limiter.
#[derive(Debug, Clone)]
pub struct EdgarClient {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    backoff: BackoffPolicy,
}

impl EdgarClient {
    /// Create a new EDGAR client with the specified user agent.
    ///
    /// The SEC requires identifying user agent headers. Format should be:
    /// "AppName/Version (contact@email.com)"
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the user agent is empty or the
    /// HTTP client cannot be built.
    ///
    /// # Example
    /// ```
    /// use edgar_api::EdgarClient;
    ///
    /// let client = EdgarClient::new("MyApp/1.0 (contact@example.com)").unwrap();
    /// assert_eq!(client.base_url(), "https://data.sec.gov");
    /// ```
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_options(ClientOptions::new(user_agent))
    }

    /// Create a client from explicit options.
    ///
    /// # Errors
    /// Returns [`IngestError::FatalConfig`] if the user agent is empty or the
    /// HTTP client cannot be built.
    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let user_agent = options.user_agent.trim();
        if user_agent.is_empty() {
            return Err(IngestError::FatalConfig(
                "a client identification (User-Agent) is required by the EDGAR API".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(options.timeout)
            .build()
            .map_err(|e| IngestError::FatalConfig(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(options.rate_limit))),
            backoff: options.backoff,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn retry_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or_else(|| self.backoff.delay_for_attempt(attempt))
            .min(self.backoff.max_delay)
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl EdgarApi for EdgarClient {
    async fn fetch_json(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url(path);
        let mut attempt = 0u32;

        loop {
            self.rate_limiter.lock().await.wait().await;

            debug!(url = %url, attempt, "Fetching EDGAR resource");
            let outcome = self.client.get(&url).send().await;

            let (reason, delay_hint) = match outcome {
                Ok(response) => {
                    let status = response.status();
                    match classify_status(status) {
                        StatusDisposition::Success => match response.bytes().await {
                            Ok(body) => {
                                let value = serde_json::from_slice::<Value>(&body).map_err(|e| {
                                    IngestError::MalformedSource(format!(
                                        "Failed to parse {url}: {e}"
                                    ))
                                })?;
                                return Ok(Some(value));
                            }
                            Err(e) => (format!("incomplete response body: {e}"), None),
                        },
                        StatusDisposition::Absent => {
                            warn!(
                                url = %url,
                                status = status.as_u16(),
                                "EDGAR resource unavailable"
                            );
                            return Ok(None);
                        }
                        StatusDisposition::Retryable => {
                            (format!("HTTP {status}"), retry_after(&response))
                        }
                    }
                }
                Err(e) if is_retryable_error(&e) => (e.to_string(), None),
                Err(e) => {
                    return Err(IngestError::TransientFetch {
                        url,
                        reason: e.to_string(),
                    });
                }
            };

            if attempt >= self.backoff.max_retries {
                return Err(IngestError::TransientFetch { url, reason });
            }

            let delay = self.retry_delay(attempt, delay_hint);
            warn!(
                url = %url,
                attempt,
                reason = %reason,
                delay_ms = delay.as_millis() as u64,
                "Retrying EDGAR request"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
