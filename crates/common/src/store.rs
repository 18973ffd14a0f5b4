//! Backing-store capability consumed by the cache.
//!
//! The cache never talks to a client library directly. It needs exactly
//! three things from the store: a plain hash field read, loading a script to
//! obtain its identifier, and evaluating a script by identifier. Expiry is
//! only ever set from inside the scripts.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::Reply;

#[async_trait]
pub trait Store: Send + Sync {
    /// Read one field of the hash stored at `key`.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Load `source` into the store's script cache and return its identifier.
    async fn script_load(&self, source: &str) -> Result<String, StoreError>;

    /// Evaluate a previously loaded script.
    ///
    /// Must fail with [`StoreError::NoScript`] when the identifier is unknown
    /// and with [`StoreError::Script`] when the script replies with an error.
    async fn evalsha(&self, sha: &str, keys: &[&str], args: &[&[u8]]) -> Result<Reply, StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for std::sync::Arc<S> {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).hget(key, field).await
    }

    async fn script_load(&self, source: &str) -> Result<String, StoreError> {
        (**self).script_load(source).await
    }

    async fn evalsha(&self, sha: &str, keys: &[&str], args: &[&[u8]]) -> Result<Reply, StoreError> {
        (**self).evalsha(sha, keys, args).await
    }
}
