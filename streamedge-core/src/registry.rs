// Live stream registry
//
// Origins heartbeat periodically with their base URL and newest fragment.
// A record stays live while `now - last_heartbeat_at <= ttl`:
// 1. `update` inserts or refreshes a record (one per stream name)
// 2. `lookup` / `list_live` never return an expired record (lazy expiry)
// 3. A background sweeper purges expired records every ttl / 2
//
// Records live in a sharded DashMap so heartbeats and lookups for different
// streams do not contend on a single lock. Each record is replaced whole, so
// readers observe either the previous or the new record, never a mix.

use dashmap::DashMap;
use prometheus::IntGauge;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics;

/// Where a live stream can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub name: String,
    /// Base URL of the origin, e.g. "http://10.0.0.5"
    pub origin_url: String,
    /// Newest fragment the origin reported
    pub latest_fragment: String,
    pub last_heartbeat_at: Instant,
}

impl StreamRecord {
    /// Check if the record outlived its TTL at `now`
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) > ttl
    }
}

/// Public view of a live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveStream {
    pub name: String,
    pub fragment: String,
}

impl LiveStream {
    pub fn new(name: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragment: fragment.into(),
        }
    }
}

/// TTL-based registry of live streams
pub struct StreamRegistry {
    streams: DashMap<String, StreamRecord>,
    ttl: Duration,
    live_gauge: IntGauge,
    cancel_token: CancellationToken,
}

impl StreamRegistry {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_gauge(ttl, metrics::registry::LIVE_STREAMS.clone())
    }

    /// Registry reporting its live count to `live_gauge`
    #[must_use]
    pub fn with_gauge(ttl: Duration, live_gauge: IntGauge) -> Self {
        Self {
            streams: DashMap::new(),
            ttl,
            live_gauge,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or refresh a stream (called on every heartbeat)
    pub fn update(&self, name: &str, origin_url: &str, fragment: &str) {
        let record = StreamRecord {
            name: name.to_string(),
            origin_url: origin_url.to_string(),
            latest_fragment: fragment.to_string(),
            last_heartbeat_at: Instant::now(),
        };

        let previous = self.streams.insert(name.to_string(), record);
        let now = Instant::now();
        self.publish_live_count();

        match previous {
            None => {
                info!(stream = name, origin = origin_url, "Stream registered");
            }
            Some(prev) if prev.is_expired(self.ttl, now) => {
                info!(stream = name, origin = origin_url, "Stream came back after expiry");
            }
            Some(prev) if prev.origin_url != origin_url => {
                info!(
                    stream = name,
                    from = %prev.origin_url,
                    to = origin_url,
                    "Stream migrated to a new origin"
                );
            }
            Some(_) => {
                debug!(stream = name, fragment = fragment, "Heartbeat refreshed");
            }
        }
    }

    /// Get a stream's record if it is still live
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<StreamRecord> {
        let record = self.streams.get(name)?;
        if record.is_expired(self.ttl, Instant::now()) {
            return None;
        }
        Some(record.clone())
    }

    /// Snapshot of live streams with their latest fragment, sorted by name
    #[must_use]
    pub fn list_live(&self) -> Vec<LiveStream> {
        let now = Instant::now();
        let mut live: Vec<LiveStream> = self
            .streams
            .iter()
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .map(|entry| LiveStream::new(entry.name.clone(), entry.latest_fragment.clone()))
            .collect();
        live.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        live
    }

    /// Remove a stream regardless of its TTL. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.streams.remove(name).is_some();
        if removed {
            self.publish_live_count();
            info!(stream = name, "Stream removed from registry");
        }
        removed
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.streams
            .iter()
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish_live_count(&self) {
        self.live_gauge
            .set(i64::try_from(self.len()).unwrap_or(i64::MAX));
    }

    /// Purge every expired record. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.streams.len();
        self.streams
            .retain(|_, record| !record.is_expired(self.ttl, now));
        let removed = before.saturating_sub(self.streams.len());
        self.publish_live_count();

        if removed > 0 {
            info!(removed = removed, remaining = self.streams.len(), "Swept expired streams");
        }
        removed
    }

    /// Start the background sweep task, running every `period`
    ///
    /// Returns the `JoinHandle` so the caller can detect task completion.
    /// Use `shutdown()` to stop it.
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?period, "Registry sweeper started");

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Registry sweeper shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        registry.sweep_expired();
                    }
                }
            }
        })
    }

    /// Stop the background sweeper
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(15);

    #[tokio::test(start_paused = true)]
    async fn test_lookup_unknown_stream() {
        let registry = StreamRegistry::new(TTL);
        assert!(registry.lookup("never-registered").is_none());
        assert!(registry.list_live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_then_expiry() {
        let registry = StreamRegistry::new(TTL);
        registry.update("camA", "http://10.0.0.5", "seg5.ts");

        let record = registry.lookup("camA").unwrap();
        assert_eq!(record.origin_url, "http://10.0.0.5");
        assert_eq!(record.latest_fragment, "seg5.ts");

        // Exactly at the TTL boundary the record is still live
        tokio::time::advance(TTL).await;
        assert!(registry.lookup("camA").is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(registry.lookup("camA").is_none());
        assert!(registry.list_live().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_heartbeats_keep_stream_alive() {
        let registry = StreamRegistry::new(TTL);

        for i in 0..20 {
            registry.update("camA", "http://10.0.0.5", &format!("seg{i}.ts"));
            tokio::time::advance(Duration::from_secs(10)).await;
            assert!(registry.lookup("camA").is_some(), "expired after {i} heartbeats");
        }

        assert_eq!(registry.lookup("camA").unwrap().latest_fragment, "seg19.ts");
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_replaces_origin() {
        let registry = StreamRegistry::new(TTL);
        registry.update("camA", "http://10.0.0.5", "seg1.ts");
        registry.update("camA", "http://10.0.0.6", "seg2.ts");

        let record = registry.lookup("camA").unwrap();
        assert_eq!(record.origin_url, "http://10.0.0.6");
        assert_eq!(record.latest_fragment, "seg2.ts");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_live_sorted_and_filters_expired() {
        let registry = StreamRegistry::new(TTL);
        registry.update("old", "http://10.0.0.1", "seg1.ts");
        tokio::time::advance(Duration::from_secs(10)).await;
        registry.update("zeta", "http://10.0.0.2", "seg7.ts");
        registry.update("alpha", "http://10.0.0.3", "seg3.ts");
        tokio::time::advance(Duration::from_secs(10)).await;

        let live = registry.list_live();
        assert_eq!(
            live,
            vec![
                LiveStream::new("alpha", "seg3.ts"),
                LiveStream::new("zeta", "seg7.ts"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let registry = StreamRegistry::new(TTL);
        registry.update("camA", "http://10.0.0.5", "seg1.ts");

        assert!(registry.remove("camA"));
        assert!(!registry.remove("camA"));
        assert!(registry.lookup("camA").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_gauge_follows_every_change() {
        let gauge = IntGauge::new("live_streams_under_test", "live streams").unwrap();
        let registry = StreamRegistry::with_gauge(TTL, gauge.clone());

        registry.update("camA", "http://10.0.0.5", "seg1.ts");
        registry.update("camB", "http://10.0.0.6", "seg1.ts");
        assert_eq!(gauge.get(), 2);

        registry.update("camA", "http://10.0.0.5", "seg2.ts");
        assert_eq!(gauge.get(), 2);

        assert!(registry.remove("camB"));
        assert_eq!(gauge.get(), 1);

        tokio::time::advance(Duration::from_secs(16)).await;
        registry.sweep_expired();
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired() {
        let registry = StreamRegistry::new(TTL);
        registry.update("stale", "http://10.0.0.1", "seg1.ts");
        tokio::time::advance(Duration::from_secs(16)).await;
        registry.update("fresh", "http://10.0.0.2", "seg1.ts");

        assert_eq!(registry.sweep_expired(), 1);
        assert_eq!(registry.sweep_expired(), 0);
        assert!(registry.lookup("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_purges_and_stops() {
        let registry = Arc::new(StreamRegistry::new(TTL));
        let handle = registry.start_sweeper(TTL / 2);

        registry.update("camA", "http://10.0.0.5", "seg1.ts");
        tokio::time::sleep(Duration::from_secs(16)).await;
        // One more sweep period so the task observes the expiry
        tokio::time::sleep(TTL / 2).await;
        assert_eq!(registry.streams.len(), 0);

        registry.shutdown();
        handle.await.unwrap();
    }
}
