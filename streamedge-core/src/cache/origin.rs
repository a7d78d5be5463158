// Origin tier: terminal link of the fetch chain
//
// Resolves the stream to its current origin through the registry and
// downloads the fragment. A transport failure gets exactly one retry, and the
// retry resolves the stream again: origins migrate, and a heartbeat that
// arrived in between points at the one that is up. A missing fragment is
// final and not retried.
//
// Successful downloads slower than the threshold are reported to the
// slow-path monitor without waiting on it.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult, ProxyError};
use crate::fragment::FragmentKey;
use crate::metrics;
use crate::monitor::{SlowEvent, SlowPathMonitor};
use crate::proxy::OriginProxy;
use crate::registry::StreamRegistry;

pub struct OriginFetchTier {
    registry: Arc<StreamRegistry>,
    proxy: Arc<dyn OriginProxy>,
    slow_threshold: Duration,
    monitor: SlowPathMonitor,
}

impl OriginFetchTier {
    #[must_use]
    pub fn new(
        registry: Arc<StreamRegistry>,
        proxy: Arc<dyn OriginProxy>,
        slow_threshold: Duration,
        monitor: SlowPathMonitor,
    ) -> Self {
        Self {
            registry,
            proxy,
            slow_threshold,
            monitor,
        }
    }

    pub async fn fetch(&self, key: &FragmentKey) -> FetchResult<Bytes> {
        let origin_url = self.resolve(key)?;

        let first_error = match self.download(key, &origin_url).await {
            Ok(bytes) => return Ok(bytes),
            Err(ProxyError::NotFound(_)) => return Err(not_found(key)),
            Err(ProxyError::Transport(e)) => e,
        };

        let retry_url = self.resolve(key)?;
        if retry_url == origin_url {
            warn!(key = %key, origin = %origin_url, error = %first_error, "Origin download failed, retrying");
        } else {
            info!(
                key = %key,
                from = %origin_url,
                to = %retry_url,
                error = %first_error,
                "Origin download failed, retrying against migrated origin"
            );
        }

        match self.download(key, &retry_url).await {
            Ok(bytes) => Ok(bytes),
            Err(ProxyError::NotFound(_)) => Err(not_found(key)),
            Err(ProxyError::Transport(e)) => {
                warn!(key = %key, origin = %retry_url, error = %e, "Origin retry failed");
                Err(FetchError::Transport(e))
            }
        }
    }

    fn resolve(&self, key: &FragmentKey) -> FetchResult<String> {
        self.registry
            .lookup(&key.stream_name)
            .map(|record| record.origin_url)
            .ok_or_else(|| FetchError::StreamUnresolved(key.stream_name.clone()))
    }

    /// One timed download attempt
    async fn download(&self, key: &FragmentKey, origin_url: &str) -> Result<Bytes, ProxyError> {
        let start = Instant::now();
        let result = self.proxy.download(origin_url, &key.fragment_name).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(bytes) => {
                metrics::origin::FETCH_DURATION.observe(elapsed.as_secs_f64());
                debug!(key = %key, bytes = bytes.len(), elapsed = ?elapsed, "Fetched from origin");
                if elapsed > self.slow_threshold {
                    metrics::origin::SLOW_EVENTS.inc();
                    self.monitor.on_slow_event(SlowEvent {
                        stream_name: key.stream_name.clone(),
                        fragment_name: key.fragment_name.clone(),
                        duration: elapsed,
                    });
                }
            }
            Err(ProxyError::NotFound(_)) => {
                metrics::origin::FETCH_FAILURES
                    .with_label_values(&["not_found"])
                    .inc();
            }
            Err(ProxyError::Transport(_)) => {
                metrics::origin::FETCH_FAILURES
                    .with_label_values(&["transport"])
                    .inc();
            }
        }

        result
    }
}

fn not_found(key: &FragmentKey) -> FetchError {
    FetchError::FragmentNotFound {
        stream: key.stream_name.clone(),
        fragment: key.fragment_name.clone(),
    }
}
