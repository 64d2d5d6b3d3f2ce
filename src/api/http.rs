//! # HTTP Transport
//!
//! A thin JSON-over-HTTP client bound to one base URL. It owns the connection
//! pool (`reqwest::Client`) and the retry policy, and never panics or throws
//! past its boundary: every outcome is either decoded JSON or a
//! [`TransportError`] describing what went wrong.
//!
//! Retry rules:
//! - only methods listed in [`RetryPolicy::allowed_methods`] are retried
//! - only statuses in [`RetryPolicy::status_forcelist`] and connection failures count
//! - `attempts` is the total number of requests sent, including the first

use std::fmt;
use std::time::Duration;

use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 0.3;
pub const DEFAULT_STATUS_FORCELIST: [u16; 3] = [500, 502, 504];
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call. `1` disables retries.
    pub attempts: u32,
    /// Seconds; the wait before attempt n (n >= 2) is `backoff_factor * 2^(n-2)`.
    pub backoff_factor: f64,
    pub status_forcelist: Vec<u16>,
    pub allowed_methods: Vec<Method>,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
            allowed_methods: vec![Method::GET, Method::POST],
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends exactly one request.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait before the given attempt (1-based). Zero for the first.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31) as i32;
        let secs = (self.backoff_factor * 2f64.powi(exponent))
            .max(0.0)
            .min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn retries_method(&self, method: &Method) -> bool {
        self.allowed_methods.contains(method)
    }

    fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }
}

#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Per-attempt timeout covering connect, send and body read.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Everything that can go wrong between us and the server.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Base URL could not be parsed or the client could not be built.
    InvalidUrl(String),
    /// Connection refused, DNS failure, broken body, etc.
    Network(String),
    /// The per-attempt timeout elapsed.
    Timeout(String),
    /// Server answered with a status that is not retried (4xx, or 5xx outside the forcelist).
    Status { status: u16, body: String },
    /// Every attempt got a retryable status.
    RetriesExhausted { attempts: u32, status: u16 },
    /// 2xx response whose body is not JSON.
    Decode(String),
}

impl TransportError {
    /// HTTP status behind the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::RetriesExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::InvalidUrl(msg) => write!(f, "invalid URL: {msg}"),
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
            TransportError::Timeout(msg) => write!(f, "request timed out: {msg}"),
            TransportError::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            TransportError::RetriesExhausted { attempts, status } => {
                write!(f, "gave up after {attempts} attempts (last status HTTP {status})")
            }
            TransportError::Decode(msg) => write!(f, "response is not valid JSON: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult = Result<Value, TransportError>;

// ============================================================================
// Client
// ============================================================================

/// Joins a base URL and an endpoint path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// What one attempt produced, before retry classification.
enum Attempt {
    Done(TransportResult),
    RetryStatus(StatusCode),
    RetryConnect(String),
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(base_url: &str, options: HttpOptions) -> Result<Self, TransportError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            retry: options.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: Option<&HeaderMap>,
    ) -> TransportResult {
        let url = join_url(&self.base_url, path);
        self.execute(Method::GET, &url, |client| {
            let builder = client.get(&url).query(query);
            with_headers(builder, headers)
        })
        .await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        headers: Option<&HeaderMap>,
    ) -> TransportResult {
        let url = join_url(&self.base_url, path);
        self.execute(Method::POST, &url, |client| {
            let builder = client.post(&url).json(body);
            with_headers(builder, headers)
        })
        .await
    }

    /// Sends the request built by `build` until it succeeds, fails for good,
    /// or the attempt budget runs out.
    async fn execute<F>(&self, method: Method, url: &str, build: F) -> TransportResult
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let max_attempts = if self.retry.retries_method(&method) {
            self.retry.attempts.max(1)
        } else {
            1
        };

        let mut attempt = 1;
        loop {
            let delay = self.retry.delay_before(attempt);
            if !delay.is_zero() {
                debug!("Waiting {:?} before attempt {} of {}", delay, attempt, max_attempts);
                tokio::time::sleep(delay).await;
            }

            debug!("{} {} (attempt {}/{})", method, url, attempt, max_attempts);
            let outcome = self.attempt(build(&self.client)).await;

            let exhausted = attempt >= max_attempts;
            match outcome {
                Attempt::Done(result) => return result,
                Attempt::RetryStatus(status) if exhausted => {
                    warn!("{} {} failed with HTTP {} after {} attempts", method, url, status, attempt);
                    return Err(TransportError::RetriesExhausted {
                        attempts: attempt,
                        status: status.as_u16(),
                    });
                }
                Attempt::RetryConnect(msg) if exhausted => {
                    warn!("{} {} unreachable after {} attempts: {}", method, url, attempt, msg);
                    return Err(TransportError::Network(msg));
                }
                Attempt::RetryStatus(status) => {
                    warn!("{} {} returned HTTP {}, retrying", method, url, status);
                }
                Attempt::RetryConnect(msg) => {
                    warn!("{} {} connection failed ({}), retrying", method, url, msg);
                }
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, request: reqwest::RequestBuilder) -> Attempt {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Attempt::Done(Err(TransportError::Timeout(e.to_string()))),
            Err(e) if e.is_connect() => return Attempt::RetryConnect(e.to_string()),
            Err(e) => return Attempt::Done(Err(TransportError::Network(e.to_string()))),
        };

        let status = response.status();
        debug!("Response status: {}", status);

        if self.retry.retries_status(status) {
            return Attempt::RetryStatus(status);
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Attempt::Done(Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }));
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) if e.is_timeout() => return Attempt::Done(Err(TransportError::Timeout(e.to_string()))),
            Err(e) => return Attempt::Done(Err(TransportError::Network(e.to_string()))),
        };

        Attempt::Done(serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string())))
    }
}

fn with_headers(builder: reqwest::RequestBuilder, headers: Option<&HeaderMap>) -> reqwest::RequestBuilder {
    match headers {
        Some(headers) => builder.headers(headers.clone()),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Table of (base, path) => joined URL cases.
    macro_rules! test_join_url {
        ( $($name:ident: ($base:expr, $path:expr) => $expected:expr,)+ ) => {
            $(
                #[test]
                fn $name() {
                    assert_eq!(join_url($base, $path), $expected);
                }
            )+
        };
    }

    test_join_url! {
        test_join_url_plain: ("http://h:1234", "api/v0/models") => "http://h:1234/api/v0/models",
        test_join_url_trailing_base: ("http://h:1234/", "api/v0/models") => "http://h:1234/api/v0/models",
        test_join_url_leading_path: ("http://h:1234", "/api/v0/models") => "http://h:1234/api/v0/models",
        test_join_url_both: ("http://h:1234/", "/api/v0/models") => "http://h:1234/api/v0/models",
        test_join_url_many_slashes: ("http://h:1234///", "///api/v0/models") => "http://h:1234/api/v0/models",
        test_join_url_base_with_prefix: ("http://h/lm/", "/api") => "http://h/lm/api",
    }

    #[test]
    fn test_join_url_never_doubles_or_drops_slash() {
        let bases = ["http://127.0.0.1:1234", "http://127.0.0.1:1234/", "http://127.0.0.1:1234//"];
        let paths = ["api/v0/models", "/api/v0/models", "//api/v0/models"];
        for base in bases {
            for path in paths {
                let url = join_url(base, path);
                let after_scheme = url.trim_start_matches("http://");
                assert!(!after_scheme.contains("//"), "double slash in {url}");
                assert_eq!(url, "http://127.0.0.1:1234/api/v0/models");
            }
        }
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs_f64(0.3));
        assert_eq!(policy.delay_before(3), Duration::from_secs_f64(0.6));

        let delays: Vec<Duration> = (1..=40).map(|n| policy.delay_before(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn test_zero_backoff_factor_never_sleeps() {
        let policy = RetryPolicy {
            backoff_factor: 0.0,
            ..RetryPolicy::default()
        };
        assert!((1..10).all(|n| policy.delay_before(n).is_zero()));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = HttpClient::new("not a url", HttpOptions::default()).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl(_)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpClient::new("http://127.0.0.1:1234/", HttpOptions::default()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:1234");
    }

    #[test]
    fn test_error_status_accessor() {
        let err = TransportError::RetriesExhausted { attempts: 3, status: 502 };
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "gave up after 3 attempts (last status HTTP 502)");
        assert_eq!(TransportError::Network("x".into()).status(), None);
    }
}
