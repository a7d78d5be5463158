use thiserror::Error;

/// Outcome of resolving a fragment through the edge.
///
/// `Clone` so a single failed origin fetch can be handed to every caller
/// that was waiting on the same key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("No live stream: {0}")]
    StreamUnresolved(String),

    #[error("Fragment not found upstream: {stream}/{fragment}")]
    FragmentNotFound { stream: String, fragment: String },

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Fragment is not a cacheable segment: {0}")]
    NotCacheable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Whether the caller may reasonably retry the same request later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the outcome should surface as "not found" to clients.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::StreamUnresolved(_) | Self::FragmentNotFound { .. })
    }
}

/// Failure of a single origin download.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Origin has no such file: {0}")]
    NotFound(String),

    #[error("Origin request failed: {0}")]
    Transport(String),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
