//! Shared rate-limited HTTP client.
//!
//! One mutex-guarded gate enforces a maximum request count per rolling
//! time window plus a minimum inter-request delay. Workers block on the
//! gate but not on each other beyond it: the lock is held only to compute
//! the next wait (or to claim a slot), never across network I/O or the
//! sleep itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use fightsync_shared::{FetchConfig, FightSyncError, Result};
use tokio::sync::Mutex;
use tracing::trace;
use url::Url;

/// User-Agent string for fetch requests.
const USER_AGENT: &str = concat!("FightSync/", env!("CARGO_PKG_VERSION"));

/// Gate parameters for the shared client.
#[derive(Debug, Clone)]
pub struct RateLimits {
    /// Minimum delay between any two requests.
    pub min_delay: Duration,
    /// Maximum requests per rolling window.
    pub window_max_requests: u32,
    /// Rolling window length.
    pub window: Duration,
    /// Per-request timeout; an attempt exceeding it is abandoned and
    /// surfaces as a fetch error.
    pub timeout: Duration,
}

impl From<&FetchConfig> for RateLimits {
    fn from(config: &FetchConfig) -> Self {
        Self {
            min_delay: config.min_delay,
            window_max_requests: config.window_max_requests,
            window: config.window,
            timeout: config.timeout,
        }
    }
}

impl RateLimits {
    /// Limits that never wait — unit tests and local feeds.
    pub fn unlimited() -> Self {
        Self {
            min_delay: Duration::ZERO,
            window_max_requests: u32::MAX,
            window: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Mutable gate state. The only cross-worker shared mutation in the
/// fetch path, guarded by a single lock.
#[derive(Debug)]
struct GateState {
    window_started: Instant,
    requests_in_window: u32,
    last_request: Option<Instant>,
}

/// HTTP client value injected into each worker. Cloning shares the gate.
#[derive(Clone)]
pub struct RateLimitedClient {
    http: reqwest::Client,
    limits: Arc<RateLimits>,
    gate: Arc<Mutex<GateState>>,
}

impl RateLimitedClient {
    pub fn new(limits: RateLimits) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(limits.timeout)
            .build()
            .map_err(|e| FightSyncError::fetch(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            limits: Arc::new(limits),
            gate: Arc::new(Mutex::new(GateState {
                window_started: Instant::now(),
                requests_in_window: 0,
                last_request: None,
            })),
        })
    }

    pub fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Block until the gate grants a request slot.
    async fn wait_turn(&self) {
        loop {
            let wait = {
                let mut gate = self.gate.lock().await;
                let now = Instant::now();

                if now.duration_since(gate.window_started) >= self.limits.window {
                    gate.window_started = now;
                    gate.requests_in_window = 0;
                }

                if gate.requests_in_window >= self.limits.window_max_requests {
                    // Window exhausted: wait for it to roll over.
                    self.limits.window - now.duration_since(gate.window_started)
                } else if let Some(last) = gate.last_request {
                    let since = now.duration_since(last);
                    if since < self.limits.min_delay {
                        self.limits.min_delay - since
                    } else {
                        gate.last_request = Some(now);
                        gate.requests_in_window += 1;
                        return;
                    }
                } else {
                    gate.last_request = Some(now);
                    gate.requests_in_window += 1;
                    return;
                }
            };

            trace!(wait_ms = wait.as_millis() as u64, "rate gate wait");
            tokio::time::sleep(wait).await;
        }
    }

    /// Fetch a URL's body as text, honoring the gate and timeout.
    pub async fn get_text(&self, url: &Url) -> Result<String> {
        self.wait_turn().await;

        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| FightSyncError::fetch(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FightSyncError::fetch(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FightSyncError::fetch(format!("{url}: body read failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(delay_ms: u64, window_max: u32, window_ms: u64) -> RateLimits {
        RateLimits {
            min_delay: Duration::from_millis(delay_ms),
            window_max_requests: window_max,
            window: Duration::from_millis(window_ms),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn gate_enforces_min_delay() {
        let client = RateLimitedClient::new(limits(50, 100, 10_000)).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            client.wait_turn().await;
        }
        // Three turns need at least two 50 ms gaps.
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn gate_enforces_window_budget() {
        let client = RateLimitedClient::new(limits(0, 2, 200)).unwrap();

        let start = Instant::now();
        for _ in 0..3 {
            client.wait_turn().await;
        }
        // The third request must wait for the 200 ms window to roll over.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn gate_is_shared_across_clones() {
        let client = RateLimitedClient::new(limits(40, 100, 10_000)).unwrap();

        let start = Instant::now();
        let a = client.clone();
        let b = client.clone();
        tokio::join!(a.wait_turn(), b.wait_turn());
        // The two turns are serialized through one gate.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn get_text_fetches_from_mock_server() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.json"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let client = RateLimitedClient::new(RateLimits::unlimited()).unwrap();
        let url = Url::parse(&format!("{}/feed.json", server.uri())).unwrap();
        let body = client.get_text(&url).await.unwrap();
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = RateLimitedClient::new(RateLimits::unlimited()).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = client.get_text(&url).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn timeout_abandons_the_fetch() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_string("late"),
            )
            .mount(&server)
            .await;

        let mut limits = RateLimits::unlimited();
        limits.timeout = Duration::from_millis(50);
        let client = RateLimitedClient::new(limits).unwrap();
        let url = Url::parse(&server.uri()).unwrap();

        let err = client.get_text(&url).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
