// Edge facade
//
// Single entry point used by the HTTP boundary. Owns the registry, the tier
// chain and the background tasks (registry sweeper, optional disk retention,
// slow-path monitor).
//
// Segment fetches are coalesced per fragment and run on their own task: a
// client that disconnects mid-fetch does not abort the fetch, so the caches
// are still populated for the next viewer.

use bytes::Bytes;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheTier, OriginFetchTier};
use crate::config::Config;
use crate::error::{FetchError, FetchResult, ProxyError};
use crate::fragment::{FragmentKey, FragmentKind};
use crate::metrics;
use crate::monitor::{policy_from_config, EscalationPolicy, SlowPathMonitor};
use crate::proxy::{HttpOriginProxy, OriginProxy};
use crate::registry::{LiveStream, StreamRegistry};
use crate::singleflight::FetchFlights;
use crate::storage::{FileStore, FragmentStore};

/// Tunables for an [`EdgeCore`]
#[derive(Debug, Clone)]
pub struct EdgeOptions {
    pub ttl: Duration,
    /// Period of the registry sweep
    pub sweep_interval: Duration,
    pub memory_capacity: NonZeroUsize,
    pub slow_threshold: Duration,
    pub slow_queue_capacity: usize,
    /// Disk entries older than this are deleted; `None` keeps them forever
    pub disk_retention: Option<Duration>,
}

impl EdgeOptions {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let memory_capacity = NonZeroUsize::new(config.cache.memory_capacity)
            .ok_or_else(|| anyhow::anyhow!("cache.memory_capacity must be greater than 0"))?;
        Ok(Self {
            ttl: config.registry.ttl(),
            sweep_interval: config.registry.sweep_interval(),
            memory_capacity,
            slow_threshold: config.origin.slow_threshold(),
            slow_queue_capacity: config.slow_path.queue_capacity,
            disk_retention: config.cache.disk_retention(),
        })
    }
}

pub struct EdgeCore {
    registry: Arc<StreamRegistry>,
    proxy: Arc<dyn OriginProxy>,
    store: Arc<dyn FragmentStore>,
    chain: Arc<CacheTier>,
    flights: FetchFlights,
    monitor: SlowPathMonitor,
    sweep_interval: Duration,
    disk_retention: Option<Duration>,
    cancel_token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EdgeCore {
    /// Assemble the edge around existing collaborators
    ///
    /// Spawns the slow-path monitor, so it must be called inside a Tokio
    /// runtime. Call [`EdgeCore::start`] to launch the periodic tasks.
    pub fn new(
        registry: Arc<StreamRegistry>,
        proxy: Arc<dyn OriginProxy>,
        store: Arc<dyn FragmentStore>,
        policy: Arc<dyn EscalationPolicy>,
        options: &EdgeOptions,
    ) -> Self {
        let (monitor, monitor_task) = SlowPathMonitor::spawn(policy, options.slow_queue_capacity);

        let origin = OriginFetchTier::new(
            Arc::clone(&registry),
            Arc::clone(&proxy),
            options.slow_threshold,
            monitor.clone(),
        );
        let chain = CacheTier::standard(options.memory_capacity, Arc::clone(&store), origin);

        Self {
            registry,
            proxy,
            store,
            chain: Arc::new(chain),
            flights: FetchFlights::new(),
            monitor,
            sweep_interval: options.sweep_interval,
            disk_retention: options.disk_retention,
            cancel_token: CancellationToken::new(),
            tasks: Mutex::new(vec![monitor_task]),
        }
    }

    /// Build the production edge: HTTP origin client, file store and the
    /// configured escalation policy
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let options = EdgeOptions::from_config(config)?;
        let registry = Arc::new(StreamRegistry::new(options.ttl));
        let proxy = HttpOriginProxy::new(config.origin.request_timeout())?;
        let store = FileStore::open(&config.cache.disk_path)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to open fragment store at {}: {e}",
                    config.cache.disk_path.display()
                )
            })?;
        let policy = policy_from_config(
            &config.slow_path,
            Arc::clone(&registry),
            proxy.client().clone(),
        );

        info!(
            ttl = ?options.ttl,
            memory_capacity = options.memory_capacity.get(),
            disk_path = %config.cache.disk_path.display(),
            slow_threshold = ?options.slow_threshold,
            policy = ?config.slow_path.policy,
            "Edge core configured"
        );

        Ok(Self::new(
            registry,
            Arc::new(proxy),
            Arc::new(store),
            policy,
            &options,
        ))
    }

    /// Launch the registry sweeper and, if configured, disk retention
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        tasks.push(self.registry.start_sweeper(self.sweep_interval));

        if let Some(retention) = self.disk_retention {
            tasks.push(self.start_disk_retention(retention));
        }
    }

    fn start_disk_retention(&self, retention: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let cancel_token = self.cancel_token.clone();
        let period = (retention / 2).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(retention = ?retention, interval = ?period, "Disk retention started");

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        info!("Disk retention shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        match store.cleanup(retention).await {
                            Ok(0) => {}
                            Ok(deleted) => debug!(deleted = deleted, "Disk retention pass"),
                            Err(e) => {
                                metrics::cache::DISK_IO_FAILURES
                                    .with_label_values(&["cleanup"])
                                    .inc();
                                warn!(error = %e, "Disk retention pass failed");
                            }
                        }
                    }
                }
            }
        })
    }

    /// Stop every background task and wait for them to finish
    pub async fn shutdown(&self) {
        self.registry.shutdown();
        self.monitor.shutdown();
        self.cancel_token.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Edge core stopped");
    }

    /// Record a heartbeat from an origin
    pub fn heartbeat(&self, stream_name: &str, origin_url: &str, latest_fragment: &str) {
        self.registry.update(stream_name, origin_url, latest_fragment);
    }

    /// Live streams with their latest fragment, sorted by name
    #[must_use]
    pub fn list_live_streams(&self) -> Vec<LiveStream> {
        self.registry.list_live()
    }

    /// Current (origin base URL, latest fragment) of a live stream
    #[must_use]
    pub fn resolve_stream(&self, stream_name: &str) -> Option<(String, String)> {
        self.registry
            .lookup(stream_name)
            .map(|record| (record.origin_url, record.latest_fragment))
    }

    /// Fetch a video segment through memory, disk and origin
    pub async fn fetch_segment(&self, stream_name: &str, fragment_name: &str) -> FetchResult<Bytes> {
        if FragmentKind::of(fragment_name) != FragmentKind::Segment {
            return Err(FetchError::NotCacheable(fragment_name.to_string()));
        }
        // Cached bytes of a stream that stopped heartbeating are not served
        if self.registry.lookup(stream_name).is_none() {
            return Err(FetchError::StreamUnresolved(stream_name.to_string()));
        }

        let key = FragmentKey::new(stream_name, fragment_name);
        let chain = Arc::clone(&self.chain);
        let flights = self.flights.clone();

        let fetch = tokio::spawn(async move {
            flights
                .run(&key, async { chain.fetch(&key).await })
                .await
        });

        match fetch.await {
            Ok(result) => result,
            Err(e) => Err(FetchError::Internal(format!("fetch task failed: {e}"))),
        }
    }

    /// Fetch a playlist straight from the origin; playlists are never cached
    pub async fn fetch_playlist(&self, stream_name: &str, fragment_name: &str) -> FetchResult<Bytes> {
        let (origin_url, _) = self
            .resolve_stream(stream_name)
            .ok_or_else(|| FetchError::StreamUnresolved(stream_name.to_string()))?;

        self.proxy
            .download(&origin_url, fragment_name)
            .await
            .map_err(|e| match e {
                ProxyError::NotFound(_) => FetchError::FragmentNotFound {
                    stream: stream_name.to_string(),
                    fragment: fragment_name.to_string(),
                },
                ProxyError::Transport(e) => FetchError::Transport(e),
            })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Entries currently held by the memory tier
    #[must_use]
    pub fn memory_cached(&self) -> usize {
        self.chain.as_memory().map_or(0, |memory| memory.len())
    }
}
