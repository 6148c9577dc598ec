//! Collapses concurrent requests for the same resource into one fetch.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::Result;

type SharedRequest<T> = Shared<BoxFuture<'static, Result<T>>>;

type PendingMap<T> = Arc<Mutex<HashMap<String, (u64, SharedRequest<T>)>>>;

/// In-flight request map keyed by request key.
///
/// At most one request per key is pending at a time; every caller that
/// arrives while it runs awaits the same result, success or failure.
pub struct Deduplicator<T> {
  pending: PendingMap<T>,
  next_id: AtomicU64,
}

impl<T> Default for Deduplicator<T> {
  fn default() -> Self {
    Self {
      pending: Arc::new(Mutex::new(HashMap::new())),
      next_id: AtomicU64::new(0),
    }
  }
}

fn lock<T>(pending: &PendingMap<T>) -> MutexGuard<'_, HashMap<String, (u64, SharedRequest<T>)>> {
  pending.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Deduplicator<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `factory` unless a request for `key` is already in flight, in which
  /// case wait for that one instead.
  ///
  /// The entry is removed as soon as the request settles, so the next call
  /// after completion starts a new request.
  pub async fn run<F, Fut>(&self, key: &str, factory: F) -> Result<T>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    // Lookup and registration happen under one lock with no await between.
    let request = {
      let mut pending = lock(&self.pending);

      match pending.get(key) {
        Some((_, existing)) => {
          debug!(key, "joining in-flight request");
          existing.clone()
        }
        None => {
          let id = self.next_id.fetch_add(1, Ordering::Relaxed);
          let map = Arc::clone(&self.pending);
          let owned_key = key.to_string();
          let inner = factory();

          let request = async move {
            let result = inner.await;
            // A cleared map may already hold a newer request for this key.
            let mut pending = lock(&map);
            if pending.get(&owned_key).is_some_and(|(current, _)| *current == id) {
              pending.remove(&owned_key);
            }
            result
          }
          .boxed()
          .shared();

          pending.insert(key.to_string(), (id, request.clone()));
          request
        }
      }
    };

    request.await
  }

  /// Number of requests currently in flight.
  pub fn pending(&self) -> usize {
    lock(&self.pending).len()
  }

  /// Forget every in-flight request. Callers already waiting still get
  /// their result; new callers start fresh requests.
  pub fn clear(&self) {
    lock(&self.pending).clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{Error, ErrorKind};
  use futures::future::join_all;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  #[tokio::test]
  async fn concurrent_calls_share_one_request() {
    let dedup = Deduplicator::<String>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..8).map(|_| {
      let calls = Arc::clone(&calls);
      dedup.run("templates:default", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok("node,rust".to_string())
      })
    });

    let results = join_all(requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 8);
    for result in results {
      assert_eq!(result.unwrap(), "node,rust");
    }
    assert_eq!(dedup.pending(), 0);
  }

  #[tokio::test]
  async fn distinct_keys_run_independently() {
    let dedup = Deduplicator::<usize>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = ["a", "b", "c"].into_iter().map(|key| {
      let calls = Arc::clone(&calls);
      dedup.run(key, move || async move {
        Ok(calls.fetch_add(1, Ordering::SeqCst))
      })
    });

    let results = join_all(requests).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(results.iter().all(|r| r.is_ok()));
  }

  #[tokio::test]
  async fn failure_is_shared_and_entry_is_removed() {
    let dedup = Deduplicator::<String>::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..3).map(|_| {
      let calls = Arc::clone(&calls);
      dedup.run("gitignore:node", move || async move {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Err(Error::api("HTTP 503: Service Unavailable", Some(503)))
      })
    });

    for result in join_all(requests).await {
      let err = result.unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Api);
      assert_eq!(err.status(), Some(503));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(dedup.pending(), 0);

    // A settled request is not reused.
    let calls_after = Arc::clone(&calls);
    let value = dedup
      .run("gitignore:node", move || async move {
        calls_after.fetch_add(1, Ordering::SeqCst);
        Ok("node_modules/".to_string())
      })
      .await
      .unwrap();
    assert_eq!(value, "node_modules/");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn pending_tracks_in_flight_requests() {
    let dedup = Arc::new(Deduplicator::<u32>::new());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let task = {
      let dedup = Arc::clone(&dedup);
      tokio::spawn(async move {
        dedup
          .run("slow", move || async move {
            let _ = rx.await;
            Ok(7)
          })
          .await
      })
    };

    while dedup.pending() == 0 {
      tokio::task::yield_now().await;
    }
    assert_eq!(dedup.pending(), 1);

    tx.send(()).unwrap();
    assert_eq!(task.await.unwrap().unwrap(), 7);
    assert_eq!(dedup.pending(), 0);
  }

  #[tokio::test]
  async fn clear_forgets_pending_requests() {
    let dedup = Arc::new(Deduplicator::<u32>::new());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let first = {
      let dedup = Arc::clone(&dedup);
      tokio::spawn(async move {
        dedup
          .run("key", move || async move {
            let _ = rx.await;
            Ok(1)
          })
          .await
      })
    };

    while dedup.pending() == 0 {
      tokio::task::yield_now().await;
    }
    dedup.clear();
    assert_eq!(dedup.pending(), 0);

    let second = dedup.run("key", || async { Ok(2) }).await.unwrap();
    assert_eq!(second, 2);

    tx.send(()).unwrap();
    assert_eq!(first.await.unwrap().unwrap(), 1);
  }
}
