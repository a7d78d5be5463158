//! Prometheus metrics for the edge
//!
//! All collectors live on a crate-local registry; the HTTP layer exposes
//! them through `gather()`.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, CounterVec, Encoder,
    Histogram, IntCounter, IntGauge, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Cache tier operations
pub mod cache {
    use super::{
        register_counter_vec_with_registry, register_int_counter_with_registry, CounterVec,
        IntCounter, REGISTRY,
    };

    /// Hits per tier ("memory", "disk")
    pub static TIER_HITS: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "streamedge_tier_hits_total",
            "Fragments served by a cache tier",
            &["tier"],
            REGISTRY.clone()
        )
        .expect("Failed to register TIER_HITS")
    });

    /// Misses per tier ("memory", "disk")
    pub static TIER_MISSES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "streamedge_tier_misses_total",
            "Fragments a cache tier had to delegate downward",
            &["tier"],
            REGISTRY.clone()
        )
        .expect("Failed to register TIER_MISSES")
    });

    pub static MEMORY_EVICTIONS: std::sync::LazyLock<IntCounter> =
        std::sync::LazyLock::new(|| {
            register_int_counter_with_registry!(
                "streamedge_memory_evictions_total",
                "Entries evicted from the memory tier",
                REGISTRY.clone()
            )
            .expect("Failed to register MEMORY_EVICTIONS")
        });

    /// Disk store failures by operation ("read", "write", "cleanup")
    pub static DISK_IO_FAILURES: std::sync::LazyLock<CounterVec> =
        std::sync::LazyLock::new(|| {
            register_counter_vec_with_registry!(
                "streamedge_disk_io_failures_total",
                "Disk tier I/O failures",
                &["op"],
                REGISTRY.clone()
            )
            .expect("Failed to register DISK_IO_FAILURES")
        });
}

/// Origin fetches
pub mod origin {
    use super::{
        register_counter_vec_with_registry, register_histogram_with_registry,
        register_int_counter_with_registry, CounterVec, Histogram, IntCounter, REGISTRY,
    };

    pub static FETCH_DURATION: std::sync::LazyLock<Histogram> = std::sync::LazyLock::new(|| {
        register_histogram_with_registry!(
            "streamedge_origin_fetch_duration_seconds",
            "Wall-clock time from dispatch to full body for origin downloads",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0],
            REGISTRY.clone()
        )
        .expect("Failed to register FETCH_DURATION")
    });

    /// Failed downloads by kind ("not_found", "transport")
    pub static FETCH_FAILURES: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "streamedge_origin_fetch_failures_total",
            "Origin downloads that failed",
            &["kind"],
            REGISTRY.clone()
        )
        .expect("Failed to register FETCH_FAILURES")
    });

    pub static SLOW_EVENTS: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
        register_int_counter_with_registry!(
            "streamedge_slow_events_total",
            "Origin downloads that exceeded the slow threshold",
            REGISTRY.clone()
        )
        .expect("Failed to register SLOW_EVENTS")
    });
}

/// Stream registry
pub mod registry {
    use super::{register_int_gauge_with_registry, IntGauge, REGISTRY};

    pub static LIVE_STREAMS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "streamedge_live_streams",
            "Streams with a non-expired heartbeat",
            REGISTRY.clone()
        )
        .expect("Failed to register LIVE_STREAMS")
    });
}

/// Render every registered metric in the Prometheus text format
pub fn gather() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
