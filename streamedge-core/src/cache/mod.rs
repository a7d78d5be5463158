// Tiered fragment cache
//
// A fetch walks a fixed chain and stops at the first tier that has the
// fragment:
//
//   memory (LRU, bounded) -> disk (unbounded) -> origin (HTTP)
//
// Cache tiers populate themselves from the result of the tier below before
// returning it, so a fragment fetched once is served from memory next time.
// The origin tier is always last and never delegates.

pub mod disk;
pub mod memory;
pub mod origin;

use async_recursion::async_recursion;
use bytes::Bytes;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::FetchResult;
use crate::fragment::FragmentKey;
use crate::storage::FragmentStore;

pub use disk::DiskTier;
pub use memory::MemoryLruTier;
pub use origin::OriginFetchTier;

/// One link of the fetch chain
pub enum CacheTier {
    Memory(MemoryLruTier),
    Disk(DiskTier),
    Origin(OriginFetchTier),
}

impl CacheTier {
    /// Memory -> disk -> origin
    #[must_use]
    pub fn standard(
        memory_capacity: NonZeroUsize,
        store: Arc<dyn FragmentStore>,
        origin: OriginFetchTier,
    ) -> Self {
        let disk = Self::Disk(DiskTier::new(store, Self::Origin(origin)));
        Self::Memory(MemoryLruTier::new(memory_capacity, disk))
    }

    /// Resolve `key` at this tier or below
    #[async_recursion]
    pub async fn fetch(&self, key: &FragmentKey) -> FetchResult<Bytes> {
        match self {
            Self::Memory(tier) => tier.fetch(key).await,
            Self::Disk(tier) => tier.fetch(key).await,
            Self::Origin(tier) => tier.fetch(key).await,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Disk(_) => "disk",
            Self::Origin(_) => "origin",
        }
    }

    /// The memory tier, if this link is one
    #[must_use]
    pub const fn as_memory(&self) -> Option<&MemoryLruTier> {
        match self {
            Self::Memory(tier) => Some(tier),
            _ => None,
        }
    }
}
