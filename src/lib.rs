//! Cached fetching of gitignore templates.
//!
//! [`TemplateService`] answers two questions for a picker or CLI: which
//! templates exist, and what the combined `.gitignore` for a selection looks
//! like. Both answers are cached in a [`StateStore`] with a TTL, concurrent
//! identical requests share one fetch, and network requests are retried with
//! exponential backoff.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod service;
pub mod transport;

pub use cache::{MemoryStorage, NoopStorage, SqliteStorage, StateStore};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use service::TemplateService;
pub use transport::{cancel_pair, CancelHandle, CancelSignal, FetchOptions, Transport};
