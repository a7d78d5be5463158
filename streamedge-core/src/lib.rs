// streamedge-core - Edge cache for live HLS streams
//
// Architecture:
// - registry/   - TTL registry of live streams, fed by origin heartbeats
// - cache/      - memory -> disk -> origin fetch chain
// - storage/    - durable byte store behind the disk tier
// - proxy       - HTTP client used to reach origins
// - monitor     - slow-origin detection and escalation
// - edge        - facade tying it together for the HTTP boundary

pub mod cache;
pub mod config;
pub mod edge;
pub mod error;
pub mod fragment;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod proxy;
pub mod registry;
pub mod singleflight;
pub mod storage;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use edge::{EdgeCore, EdgeOptions};
pub use error::{FetchError, FetchResult, ProxyError};
pub use fragment::{FragmentKey, FragmentKind};
pub use monitor::{EscalationPolicy, SlowEvent, SlowPathMonitor};
pub use proxy::{HttpOriginProxy, OriginProxy};
pub use registry::{LiveStream, StreamRecord, StreamRegistry};
pub use storage::{FileStore, FragmentStore};
