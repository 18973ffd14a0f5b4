use thiserror::Error;

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store does not know the script identifier (never loaded, flushed,
    /// or lost on restart).
    #[error("unknown script identifier")]
    NoScript,

    /// A script replied with an explicit error. The first word is the code.
    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("store backend: {0}")]
    Backend(String),
}

impl StoreError {
    /// Error code of a script error reply, e.g. `LEASING`.
    pub fn script_code(&self) -> Option<&str> {
        match self {
            StoreError::Script(msg) => msg.split_whitespace().next(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache entry not found")]
    NotFound,

    /// Another caller holds the lease for this key and is producing the value.
    #[error("cache entry is being leased")]
    Leasing,

    #[error("invalid store reply: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

pub type CacheResult<T> = Result<T, CacheError>;
