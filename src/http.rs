//! HTTP GET with bounded retry and exponential backoff.
//!
//! Every outbound request of a run (feed, article pages, image downloads)
//! goes through this module so they share one timeout and one retry policy.
//!
//! # Architecture
//!
//! - [`HttpGet`]: core trait, a GET that yields the body of a 2xx response
//! - [`ReqwestGet`]: the `reqwest` implementation
//! - [`RetryGet`]: decorator that adds retry logic to any `HttpGet`
//!
//! # Retry Strategy
//!
//! - At most 3 attempts in total
//! - Retried only on 500/502/503/504, timeouts and connection failures
//! - Backoff of `backoff_factor * 2^(attempt-1)`, starting at 500ms
//! - Small random jitter on top to avoid lockstep retries

use crate::error::FetchError;
use bytes::Bytes;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// A successful (2xx) response with its body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Async HTTP GET.
///
/// Implementations return `Err(FetchError::Status(_))` for any non-2xx
/// response so callers never see an unsuccessful body.
pub trait HttpGet {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

impl<T: HttpGet> HttpGet for &T {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        (**self).get(url).await
    }
}

/// Retry parameters shared by every request of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub backoff_factor: Duration,
    /// Upper bound for a single backoff delay.
    pub max_backoff: Duration,
    /// Upper bound for the random jitter added to each delay.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_factor: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            max_jitter: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
impl RetryPolicy {
    /// Same attempt budget, no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_factor: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_factor.saturating_mul(factor).min(self.max_backoff)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rng().random_range(0..=max_ms))
    }
}

/// [`HttpGet`] backed by a shared `reqwest::Client`.
///
/// The client carries the per-request timeout; cloning is cheap.
#[derive(Debug, Clone)]
pub struct ReqwestGet {
    client: reqwest::Client,
}

impl ReqwestGet {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with the given request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::new(client))
    }
}

impl HttpGet for ReqwestGet {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(HttpResponse {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Wrapper that adds bounded retry to any [`HttpGet`] implementation.
#[derive(Clone)]
pub struct RetryGet<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: HttpGet> RetryGet<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryGet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryGet")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: HttpGet> HttpGet for RetryGet<T> {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.inner.get(url).await {
                Ok(resp) => {
                    if attempt > 1 {
                        debug!(%url, attempt, "GET succeeded after retry");
                    }
                    return Ok(resp);
                }
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    let elapsed_ms_total = total_t0.elapsed().as_millis();
                    if attempt >= max_attempts {
                        error!(
                            %url,
                            attempt,
                            max = max_attempts,
                            elapsed_ms_total,
                            error = %e,
                            "GET exhausted retries"
                        );
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }

                    let delay = self.policy.backoff(attempt) + self.policy.jitter();
                    warn!(
                        %url,
                        attempt,
                        max = max_attempts,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "GET attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{any, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Plays back a fixed sequence of outcomes, then keeps returning 200.
    struct Scripted {
        outcomes: Mutex<Vec<Result<(), FetchError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<(), FetchError>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HttpGet for Scripted {
        async fn get(&self, _url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.outcomes.lock().unwrap().pop().unwrap_or(Ok(()));
            next.map(|_| HttpResponse {
                status: 200,
                content_type: None,
                body: Bytes::from_static(b"ok"),
            })
        }
    }

    #[test]
    fn test_default_policy_matches_retry_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(30), policy.max_backoff);
        assert_eq!(policy.backoff(200), policy.max_backoff);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let inner = Scripted::new(vec![
            Err(FetchError::Status(503)),
            Err(FetchError::Timeout),
        ]);
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));

        let resp = http.get("http://img/x.png").await.unwrap();
        assert_eq!(&resp.body[..], b"ok");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Scripted::new(vec![
            Err(FetchError::Status(502)),
            Err(FetchError::Status(502)),
            Err(FetchError::Status(502)),
        ]);
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));

        let err = http.get("http://img/x.png").await.unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let inner = Scripted::new(vec![Err(FetchError::Status(404))]);
        let http = RetryGet::new(&inner, RetryPolicy::immediate(3));

        let err = http.get("http://img/x.png").await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let inner = Scripted::new(vec![
            Err(FetchError::Status(500)),
            Err(FetchError::Status(500)),
        ]);
        let policy = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        let http = RetryGet::new(&inner, policy);

        let t0 = tokio::time::Instant::now();
        http.get("http://img/x.png").await.unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_reqwest_get_503_then_success() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;
        Mock::given(any())
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"\x89PNG".to_vec())
                    .insert_header("Content-Type", "image/png"),
            )
            .mount(&mock_server)
            .await;

        let http = RetryGet::new(
            ReqwestGet::with_timeout(Duration::from_secs(5)).unwrap(),
            RetryPolicy::immediate(3),
        );
        let resp = http
            .get(&format!("{}/img/x.png", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("image/png"));
        assert_eq!(&resp.body[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_reqwest_get_404_fails_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let http = RetryGet::new(
            ReqwestGet::with_timeout(Duration::from_secs(5)).unwrap(),
            RetryPolicy::immediate(3),
        );
        let err = http
            .get(&format!("{}/missing.jpg", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_reqwest_get_timeout_is_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&mock_server)
            .await;

        let http = RetryGet::new(
            ReqwestGet::with_timeout(Duration::from_millis(50)).unwrap(),
            RetryPolicy::immediate(2),
        );
        let err = http.get(&mock_server.uri()).await.unwrap_err();
        match err {
            FetchError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*source, FetchError::Timeout));
            }
            e => panic!("Expected RetriesExhausted, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_reqwest_get_dropped_connection_is_retried() {
        // Accepts every connection and closes it before sending a response.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepts);
        let server = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        let http = RetryGet::new(
            ReqwestGet::with_timeout(Duration::from_secs(5)).unwrap(),
            RetryPolicy::immediate(3),
        );
        let err = http
            .get(&format!("http://{addr}/img/x.jpg"))
            .await
            .unwrap_err();
        server.abort();

        match err {
            FetchError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, FetchError::Connect(_)), "{source:?}");
            }
            e => panic!("Expected RetriesExhausted, got {:?}", e),
        }
        assert!(accepts.load(Ordering::SeqCst) >= 3);
    }
}
