//! Request coalescing for cache misses
//!
//! Wraps the `async_singleflight` crate so that concurrent misses on the
//! same fragment share one trip down the tier chain. Every waiter receives
//! a clone of the leader's result, error included.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;

use crate::error::{FetchError, FetchResult};
use crate::fragment::FragmentKey;

/// Coalesces concurrent fetches of the same fragment
#[derive(Clone)]
pub struct FetchFlights {
    group: Arc<async_singleflight::Group<FragmentKey, Bytes, FetchError>>,
}

impl FetchFlights {
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Run `f` unless a fetch for `key` is already in flight, in which case
    /// wait for that one instead
    pub async fn run<Fut>(&self, key: &FragmentKey, f: Fut) -> FetchResult<Bytes>
    where
        Fut: Future<Output = FetchResult<Bytes>> + Send,
    {
        // Group::work returns Result<V, Option<E>>:
        //   Err(Some(e)) => error from the leader's fetch
        //   Err(None)    => leader dropped or panicked
        self.group.work(key, f).await.map_err(|opt_err| match opt_err {
            Some(inner) => inner,
            None => FetchError::Internal(format!("fetch leader for {key} failed")),
        })
    }
}

impl Default for FetchFlights {
    fn default() -> Self {
        Self::new()
    }
}
