use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::error::{ExtractError, Result};

const CORRELATION_HEADER: &str = "X-Correlation-ID";
const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Retry and timeout tuning for every call made to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Total attempts per call, the first one included
    pub max_attempts: u32,
    /// Budget for a single attempt
    pub timeout: Duration,
    /// First backoff step; doubled on every retry, plus up to one step of jitter
    pub backoff_base: Duration,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Outcome of one failed attempt.
enum Attempt {
    Retry(String),
    Fail(ExtractError),
}

impl From<ExtractError> for Attempt {
    fn from(err: ExtractError) -> Self {
        Self::Fail(err)
    }
}

/// HTTP transport with bounded retries, per-attempt timeouts and an
/// allowed-status contract.
///
/// Connection, DNS and timeout failures are retried with exponential backoff.
/// A response with a status outside the allowed set ends the call at once.
pub struct Transport {
    client: Client,
    settings: TransportSettings,
    correlation_id: String,
    sequence: AtomicU64,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Result<Self> {
        if settings.max_attempts == 0 {
            return Err(ExtractError::Config(
                "Transport needs at least one attempt per call".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("pipeline-mock-extractor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(settings.timeout)
            .build()
            .map_err(|e| ExtractError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            correlation_id: format!("{:016x}", rand::random::<u64>()),
            sequence: AtomicU64::new(0),
        })
    }

    /// Id shared by every request of this transport, sent as `X-Correlation-ID`.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Performs the request produced by `build` and returns the full response body.
    ///
    /// `build` is called once per attempt. An empty `allowed_status_codes`
    /// means "200 only".
    pub async fn request<B>(
        &self,
        url: &str,
        build: B,
        allowed_status_codes: &[StatusCode],
    ) -> Result<Vec<u8>>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        let request_id = self.next_request_id();
        let request_id = request_id.as_str();
        let build = &build;

        self.with_retry(url, move |attempt| async move {
            let request = self.buffered(build(&self.client), request_id);
            let response = self.send_once(request, request_id, attempt).await?;
            check_status(url, &response, allowed_status_codes)?;

            let bytes = response.bytes().await.map_err(|e| classify(&e))?;
            Ok::<_, Attempt>(bytes.to_vec())
        })
        .await
    }

    /// Opens a long-lived response (server-sent events) produced by `build`.
    ///
    /// The attempt timeout covers connecting and receiving the response head
    /// only; reading the body is left to the caller.
    pub async fn open_stream<B>(&self, url: &str, build: B) -> Result<Response>
    where
        B: Fn(&Client) -> RequestBuilder,
    {
        let request_id = self.next_request_id();
        let request_id = request_id.as_str();
        let build = &build;

        self.with_retry(url, move |attempt| async move {
            let request = self.streaming(build(&self.client), request_id);
            let response = self.send_once(request, request_id, attempt).await?;
            check_status(url, &response, &[])?;
            Ok::<_, Attempt>(response)
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, Attempt>>,
    {
        let max_attempts = self.settings.max_attempts;
        let mut current = 1;

        loop {
            match attempt(current).await {
                Ok(value) => return Ok(value),
                Err(Attempt::Fail(err)) => return Err(err),
                Err(Attempt::Retry(message)) if current < max_attempts => {
                    let delay = self.backoff(current);
                    warn!(
                        "Request to {url} failed ({message}), retrying in {}ms ({current}/{max_attempts})...",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    current += 1;
                }
                Err(Attempt::Retry(message)) => {
                    return Err(ExtractError::Transport {
                        url: url.to_string(),
                        message: format!("{message} (gave up after {current} attempts)"),
                    });
                }
            }
        }
    }

    /// Request whose whole body must arrive within the attempt timeout.
    fn buffered(&self, request: RequestBuilder, request_id: &str) -> RequestBuilder {
        self.streaming(request, request_id)
            .timeout(self.settings.timeout)
    }

    /// Request whose body may outlive the attempt timeout.
    fn streaming(&self, request: RequestBuilder, request_id: &str) -> RequestBuilder {
        request
            .header(CORRELATION_HEADER, &self.correlation_id)
            .header(REQUEST_ID_HEADER, request_id)
    }

    async fn send_once(
        &self,
        request: RequestBuilder,
        request_id: &str,
        attempt: u32,
    ) -> std::result::Result<Response, Attempt> {
        let request = request.build().map_err(|e| classify(&e))?;
        debug!(
            "{} {} (request {request_id}, attempt {attempt}/{})",
            request.method(),
            request.url(),
            self.settings.max_attempts
        );

        match tokio::time::timeout(self.settings.timeout, self.client.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => Err(Attempt::Retry(format!(
                "no response within {}ms",
                self.settings.timeout.as_millis()
            ))),
        }
    }

    fn next_request_id(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{sequence}", self.correlation_id)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.settings.backoff_base;
        if base.is_zero() {
            return Duration::ZERO;
        }

        let exponential = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        #[allow(clippy::cast_possible_truncation)]
        let jitter_ms = rand::thread_rng().gen_range(0..base.as_millis().max(1) as u64);

        exponential.saturating_add(Duration::from_millis(jitter_ms))
    }
}

fn check_status(
    url: &str,
    response: &Response,
    allowed_status_codes: &[StatusCode],
) -> Result<()> {
    let status = response.status();
    let allowed = if allowed_status_codes.is_empty() {
        status == StatusCode::OK
    } else {
        allowed_status_codes.contains(&status)
    };

    if allowed {
        Ok(())
    } else {
        Err(ExtractError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn classify(err: &reqwest::Error) -> Attempt {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        Attempt::Retry(err.to_string())
    } else {
        Attempt::Fail(ExtractError::Transport {
            url: err
                .url()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unknown>".to_string()),
            message: err.to_string(),
        })
    }
}
