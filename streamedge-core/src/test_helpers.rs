// Test doubles shared by the unit tests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheTier, OriginFetchTier};
use crate::error::ProxyError;
use crate::monitor::{EscalationPolicy, SlowEvent, SlowPathMonitor};
use crate::proxy::OriginProxy;
use crate::registry::StreamRegistry;

type FailureHook = Box<dyn FnOnce() + Send>;

/// In-memory origin: serves files per base URL and counts downloads
#[derive(Default)]
pub struct MockOrigin {
    files: Mutex<HashMap<(String, String), Bytes>>,
    down: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    on_failure: Mutex<Option<FailureHook>>,
    downloads: AtomicUsize,
}

impl MockOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, base_url: &str, file: &str, data: &'static [u8]) {
        self.files
            .lock()
            .insert((base_url.to_string(), file.to_string()), Bytes::from_static(data));
    }

    /// Make every download from `base_url` fail with a transport error
    pub fn take_down(&self, base_url: &str) {
        self.down.lock().insert(base_url.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Run `hook` once, on the first transport failure
    pub fn on_first_failure(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_failure.lock() = Some(Box::new(hook));
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginProxy for MockOrigin {
    async fn download(&self, base_url: &str, file: &str) -> Result<Bytes, ProxyError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.down.lock().contains(base_url) {
            if let Some(hook) = self.on_failure.lock().take() {
                hook();
            }
            return Err(ProxyError::Transport(format!("{base_url} unreachable")));
        }

        self.files
            .lock()
            .get(&(base_url.to_string(), file.to_string()))
            .cloned()
            .ok_or_else(|| ProxyError::NotFound(format!("{base_url}/{file}")))
    }
}

/// Escalation policy that only records events
#[derive(Default)]
pub struct RecordingPolicy {
    pub events: Mutex<Vec<SlowEvent>>,
}

#[async_trait]
impl EscalationPolicy for RecordingPolicy {
    async fn on_slow_event(&self, event: &SlowEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Origin tier over `origin`, reporting slow downloads to a fresh monitor
pub fn origin_tier(
    registry: &Arc<StreamRegistry>,
    origin: &Arc<MockOrigin>,
    slow_threshold: Duration,
) -> CacheTier {
    let (monitor, _handle) = SlowPathMonitor::spawn(Arc::new(RecordingPolicy::default()), 16);
    CacheTier::Origin(OriginFetchTier::new(
        Arc::clone(registry),
        Arc::clone(origin) as Arc<dyn OriginProxy>,
        slow_threshold,
        monitor,
    ))
}
