//! HTTP GET with per-attempt timeout, cancellation and exponential backoff.

use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Triggers a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
  tx: watch::Sender<bool>,
}

/// Observes cancellation requested through a [`CancelHandle`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
  rx: watch::Receiver<bool>,
}

/// Create a connected cancellation handle and signal.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
  let (tx, rx) = watch::channel(false);
  (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }
}

impl CancelSignal {
  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once cancellation is requested. Never resolves if the
  /// handle is dropped without cancelling.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
      std::future::pending::<()>().await;
    }
  }
}

/// Per-call retry and timeout settings.
#[derive(Debug, Clone)]
pub struct FetchOptions {
  /// Upper bound for a single attempt, including reading the body
  pub timeout: Duration,
  /// Retries after the first attempt
  pub max_retries: u32,
  /// Delay before the first retry; doubled for each subsequent one
  pub base_delay: Duration,
  pub cancel: Option<CancelSignal>,
}

impl Default for FetchOptions {
  fn default() -> Self {
    Self {
      timeout: DEFAULT_TIMEOUT,
      max_retries: DEFAULT_MAX_RETRIES,
      base_delay: DEFAULT_BASE_DELAY,
      cancel: None,
    }
  }
}

/// Delay before the retry following attempt `attempt` (0-indexed):
/// `base * 2^attempt`.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
  base.saturating_mul(2u32.saturating_pow(attempt))
}

/// Wait for `future` unless `cancel` fires first.
async fn cancellable<T>(
  cancel: Option<&CancelSignal>,
  future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
  match cancel {
    Some(signal) => {
      tokio::select! {
        biased;
        _ = signal.cancelled() => Err(Error::cancelled()),
        result = future => result,
      }
    }
    None => future.await,
  }
}

fn classify_request_error(url: &str, timeout: Duration, err: reqwest::Error) -> Error {
  if err.is_timeout() {
    Error::network_with(
      format!("Request timeout after {}ms", timeout.as_millis()),
      err,
    )
  } else if err.is_connect() {
    Error::network_with(format!("Network error: failed to connect to {}", url), err)
  } else {
    Error::network_with(format!("Request failed: {}", url), err)
  }
}

/// One time-bounded GET returning the response body.
async fn attempt_fetch(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<String> {
  let request = async {
    let response = client
      .get(url)
      .send()
      .await
      .map_err(|e| classify_request_error(url, timeout, e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(Error::api(
        format!(
          "HTTP {}: {}",
          status.as_u16(),
          status.canonical_reason().unwrap_or("Unknown Status")
        ),
        Some(status.as_u16()),
      ));
    }

    response
      .text()
      .await
      .map_err(|e| classify_request_error(url, timeout, e))
  };

  match tokio::time::timeout(timeout, request).await {
    Ok(result) => result,
    Err(_) => Err(Error::network(format!(
      "Request timeout after {}ms",
      timeout.as_millis()
    ))),
  }
}

/// Fetch `url`, retrying transient failures with exponential backoff.
///
/// Makes at most `max_retries + 1` attempts. Client errors other than 429
/// and cancellation end the loop immediately. The last failure is returned
/// as-is.
pub async fn fetch_with_retry(
  client: &reqwest::Client,
  url: &str,
  options: &FetchOptions,
) -> Result<String> {
  let cancel = options.cancel.as_ref();
  let total = options.max_retries + 1;
  let mut attempt = 0;

  loop {
    if attempt > 0 {
      debug!(attempt = attempt + 1, total, url, "retrying fetch");
    }

    let err = match cancellable(cancel, attempt_fetch(client, url, options.timeout)).await {
      Ok(body) => return Ok(body),
      Err(err) => err,
    };

    if err.is_cancelled() {
      debug!(url, "fetch cancelled");
      return Err(err);
    }

    if attempt >= options.max_retries {
      debug!(total, url, error = %err, "max retries reached");
      return Err(err);
    }

    if !err.is_retryable() {
      debug!(url, error = %err, "non-retryable error, stopping retries");
      return Err(err);
    }

    let delay = backoff_delay(attempt, options.base_delay);
    debug!(
      attempt = attempt + 1,
      delay_ms = delay.as_millis() as u64,
      error = %err,
      "attempt failed, waiting before retry"
    );
    cancellable(cancel, async {
      tokio::time::sleep(delay).await;
      Ok(())
    })
    .await?;

    attempt += 1;
  }
}

/// HTTP client plus the retry settings used for every request.
#[derive(Debug, Clone)]
pub struct Transport {
  client: reqwest::Client,
  options: FetchOptions,
}

impl Transport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("yagi/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::network_with("Failed to build HTTP client", e))?;

    Ok(Self {
      client,
      options: FetchOptions::default(),
    })
  }

  pub fn with_options(mut self, options: FetchOptions) -> Self {
    self.options = options;
    self
  }

  pub fn options(&self) -> &FetchOptions {
    &self.options
  }

  /// GET `url` and return its body.
  pub async fn get_text(&self, url: &str) -> Result<String> {
    fetch_with_retry(&self.client, url, &self.options).await
  }
}
