//! Typed failures shared by the transport, cache and service layers.
//!
//! Every error carries a [`ErrorKind`] discriminant so callers can decide how
//! to react (offer a retry, report a bad endpoint, ...) without inspecting
//! message text.

use std::fmt;
use std::sync::Arc;

/// Boxed underlying cause. `Arc` keeps [`Error`] cheap to clone, which a
/// deduplicated fetch needs to hand the same failure to every waiter.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Network,
  Api,
  Validation,
  Storage,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Network => "network",
      ErrorKind::Api => "api",
      ErrorKind::Validation => "validation",
      ErrorKind::Storage => "storage",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
  /// Timeout, cancellation, connection failure or any other transport fault.
  #[error("{message}")]
  Network {
    message: String,
    cancelled: bool,
    #[source]
    cause: Option<Cause>,
  },

  /// Non-2xx response, or a response body that could not be used.
  #[error("{message}")]
  Api {
    message: String,
    status: Option<u16>,
    #[source]
    cause: Option<Cause>,
  },

  /// Invalid configuration or input.
  #[error("{message}")]
  Validation {
    message: String,
    #[source]
    cause: Option<Cause>,
  },

  /// The persistent state store failed.
  #[error("{message}")]
  Storage {
    message: String,
    #[source]
    cause: Option<Cause>,
  },
}

impl Error {
  pub fn network(message: impl Into<String>) -> Self {
    Error::Network {
      message: message.into(),
      cancelled: false,
      cause: None,
    }
  }

  pub fn network_with(
    message: impl Into<String>,
    cause: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Error::Network {
      message: message.into(),
      cancelled: false,
      cause: Some(Arc::new(cause)),
    }
  }

  /// The request was aborted by its caller.
  pub fn cancelled() -> Self {
    Error::Network {
      message: "Request was cancelled".to_string(),
      cancelled: true,
      cause: None,
    }
  }

  pub fn api(message: impl Into<String>, status: Option<u16>) -> Self {
    Error::Api {
      message: message.into(),
      status,
      cause: None,
    }
  }

  pub fn api_with(
    message: impl Into<String>,
    status: Option<u16>,
    cause: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Error::Api {
      message: message.into(),
      status,
      cause: Some(Arc::new(cause)),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Error::Validation {
      message: message.into(),
      cause: None,
    }
  }

  pub fn validation_with(
    message: impl Into<String>,
    cause: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Error::Validation {
      message: message.into(),
      cause: Some(Arc::new(cause)),
    }
  }

  pub fn storage(message: impl Into<String>) -> Self {
    Error::Storage {
      message: message.into(),
      cause: None,
    }
  }

  pub fn storage_with(
    message: impl Into<String>,
    cause: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    Error::Storage {
      message: message.into(),
      cause: Some(Arc::new(cause)),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Network { .. } => ErrorKind::Network,
      Error::Api { .. } => ErrorKind::Api,
      Error::Validation { .. } => ErrorKind::Validation,
      Error::Storage { .. } => ErrorKind::Storage,
    }
  }

  /// HTTP status code, for API errors that came from a response.
  pub fn status(&self) -> Option<u16> {
    match self {
      Error::Api { status, .. } => *status,
      _ => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Error::Network { cancelled: true, .. })
  }

  /// A client error (4xx other than 429) will fail the same way again.
  pub fn is_non_retryable_client_error(&self) -> bool {
    match self.status() {
      Some(429) | None => false,
      Some(code) => (400..500).contains(&code),
    }
  }

  /// Whether the transport should try again after this failure.
  ///
  /// Cancellation, validation and storage failures are never retried.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::Network { cancelled, .. } => !cancelled,
      Error::Api { .. } => !self.is_non_retryable_client_error(),
      Error::Validation { .. } | Error::Storage { .. } => false,
    }
  }
}
