// Slow-path monitor
//
// The origin tier reports every download that took longer than the slow
// threshold. Reports are queued with `try_send`, so the fetch that produced
// them never waits on escalation. A background task feeds queued events to
// the configured escalation policy:
// - LogOnlyPolicy      - warn and move on (default)
// - DeregisterPolicy   - drop a stream after N slow fetches within a window
// - NotifyOriginPolicy - POST {origin}/bandwidth so the origin can adapt

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SlowPathConfig, SlowPathPolicyKind};
use crate::proxy::origin_file_url;
use crate::registry::StreamRegistry;

/// A successful origin download that exceeded the slow threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowEvent {
    pub stream_name: String,
    pub fragment_name: String,
    pub duration: Duration,
}

/// Reaction to slow origins
#[async_trait]
pub trait EscalationPolicy: Send + Sync {
    async fn on_slow_event(&self, event: &SlowEvent);
}

/// Logs slow events, takes no action
pub struct LogOnlyPolicy;

#[async_trait]
impl EscalationPolicy for LogOnlyPolicy {
    async fn on_slow_event(&self, event: &SlowEvent) {
        warn!(
            stream = %event.stream_name,
            fragment = %event.fragment_name,
            duration_ms = event.duration.as_millis() as u64,
            "Slow origin download"
        );
    }
}

/// Removes a stream from the registry once it produced `threshold` slow
/// events within a rolling `window`
pub struct DeregisterPolicy {
    registry: Arc<StreamRegistry>,
    threshold: u32,
    window: Duration,
    recent: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl DeregisterPolicy {
    #[must_use]
    pub fn new(registry: Arc<StreamRegistry>, threshold: u32, window: Duration) -> Self {
        Self {
            registry,
            threshold: threshold.max(1),
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Record one event; true when the stream crossed the threshold
    fn record(&self, stream_name: &str, at: Instant) -> bool {
        let mut recent = self.recent.lock();
        // Streams quiet for a whole window have nothing left to count
        recent.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|last| at.saturating_duration_since(*last) <= self.window)
        });

        let timestamps = recent.entry(stream_name.to_string()).or_default();

        timestamps.push_back(at);
        while timestamps
            .front()
            .is_some_and(|first| at.saturating_duration_since(*first) > self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.threshold as usize {
            recent.remove(stream_name);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tracked_streams(&self) -> usize {
        self.recent.lock().len()
    }
}

#[async_trait]
impl EscalationPolicy for DeregisterPolicy {
    async fn on_slow_event(&self, event: &SlowEvent) {
        if self.record(&event.stream_name, Instant::now()) {
            warn!(
                stream = %event.stream_name,
                threshold = self.threshold,
                window = ?self.window,
                "Origin repeatedly slow, deregistering stream"
            );
            self.registry.remove(&event.stream_name);
        } else {
            debug!(stream = %event.stream_name, "Slow event recorded");
        }
    }
}

/// Tells the origin it is serving too slowly
pub struct NotifyOriginPolicy {
    registry: Arc<StreamRegistry>,
    client: reqwest::Client,
}

impl NotifyOriginPolicy {
    #[must_use]
    pub fn new(registry: Arc<StreamRegistry>, client: reqwest::Client) -> Self {
        Self { registry, client }
    }
}

#[async_trait]
impl EscalationPolicy for NotifyOriginPolicy {
    async fn on_slow_event(&self, event: &SlowEvent) {
        let Some(record) = self.registry.lookup(&event.stream_name) else {
            debug!(stream = %event.stream_name, "Slow stream already gone, nothing to notify");
            return;
        };

        let url = origin_file_url(&record.origin_url, "bandwidth");
        match self.client.post(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(stream = %event.stream_name, url = %url, "Notified origin of slow download");
            }
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Origin rejected slow-download notice");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to notify origin of slow download");
            }
        }
    }
}

/// Build the policy selected in configuration
#[must_use]
pub fn policy_from_config(
    config: &SlowPathConfig,
    registry: Arc<StreamRegistry>,
    client: reqwest::Client,
) -> Arc<dyn EscalationPolicy> {
    match config.policy {
        SlowPathPolicyKind::LogOnly => Arc::new(LogOnlyPolicy),
        SlowPathPolicyKind::Deregister => Arc::new(DeregisterPolicy::new(
            registry,
            config.threshold,
            config.window(),
        )),
        SlowPathPolicyKind::NotifyOrigin => Arc::new(NotifyOriginPolicy::new(registry, client)),
    }
}

/// Handle used to report slow events; cheap to clone
#[derive(Clone)]
pub struct SlowPathMonitor {
    sender: mpsc::Sender<SlowEvent>,
    cancel_token: CancellationToken,
}

impl SlowPathMonitor {
    /// Spawn the escalation task and return a handle to it
    ///
    /// At most `queue_capacity` events wait for the policy; further events
    /// are dropped with a warning.
    pub fn spawn(
        policy: Arc<dyn EscalationPolicy>,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<SlowEvent>(queue_capacity.max(1));
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = task_token.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(event) => policy.on_slow_event(&event).await,
                        None => return,
                    },
                }
            }

            // Handle what was already queued before stopping
            receiver.close();
            while let Ok(event) = receiver.try_recv() {
                policy.on_slow_event(&event).await;
            }
            info!("Slow-path monitor stopped");
        });

        (
            Self {
                sender,
                cancel_token,
            },
            handle,
        )
    }

    /// Queue an event without waiting
    pub fn on_slow_event(&self, event: SlowEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(
                    stream = %event.stream_name,
                    fragment = %event.fragment_name,
                    "Slow-path queue full, dropping event"
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Slow-path monitor stopped, dropping event");
            }
        }
    }

    /// Stop the escalation task after it handled the queued events
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
