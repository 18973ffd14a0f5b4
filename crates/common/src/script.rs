//! Client-side cache of script identifiers.
//!
//! Each script is loaded once and then invoked by its SHA1 identifier. The
//! store may drop loaded scripts at any time (restart, `SCRIPT FLUSH`), so an
//! unknown-identifier reply clears the slot and the call is retried with a
//! fresh load until it succeeds or the caller cancels.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cancel::{cancel_on_token, error_if_cancelled, CancellationToken};
use crate::error::{CacheResult, StoreError};
use crate::store::Store;
use crate::types::Reply;

type HookFn = dyn Fn(&str, &StoreError) + Send + Sync;

/// Observer for unexpected store failures. Never alters control flow.
///
/// Without a callback the failure is logged through `tracing`.
#[derive(Clone, Default)]
pub struct FailureHook(Option<Arc<HookFn>>);

impl FailureHook {
    pub fn new(f: impl Fn(&str, &StoreError) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    /// Hook that drops every notification.
    pub fn silent() -> Self {
        Self::new(|_, _| {})
    }

    pub fn notify(&self, op: &str, err: &StoreError) {
        match &self.0 {
            Some(f) => {
                // a panicking observer must not replace the store error
                if catch_unwind(AssertUnwindSafe(|| f(op, err))).is_err() {
                    warn!(op, error = %err, "failure hook panicked");
                }
            }
            None => warn!(op, error = %err, "cache store failure"),
        }
    }
}

impl std::fmt::Debug for FailureHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FailureHook").field(&self.0.is_some()).finish()
    }
}

#[derive(Debug)]
pub struct ScriptSlot {
    name: &'static str,
    source: &'static str,
    sha: RwLock<Option<String>>,
}

impl ScriptSlot {
    pub fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source, sha: RwLock::new(None) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Currently cached identifier, if any.
    pub async fn cached(&self) -> Option<String> {
        self.sha.read().await.clone()
    }

    /// Cached identifier, loading the script if the slot is empty.
    ///
    /// The write lock is held across the load so concurrent callers on an
    /// empty slot trigger a single `SCRIPT LOAD`.
    pub async fn resolve<S: Store + ?Sized>(&self, store: &S) -> Result<String, StoreError> {
        if let Some(sha) = self.sha.read().await.as_ref() {
            return Ok(sha.clone());
        }
        let mut slot = self.sha.write().await;
        if let Some(sha) = slot.as_ref() {
            return Ok(sha.clone());
        }
        let sha = store.script_load(self.source).await?;
        debug!(script = self.name, %sha, "script loaded");
        *slot = Some(sha.clone());
        Ok(sha)
    }

    /// Clear the slot, unless another caller already replaced `stale`.
    pub async fn invalidate(&self, stale: &str) {
        let mut slot = self.sha.write().await;
        if slot.as_deref() == Some(stale) {
            *slot = None;
        }
    }

    /// Evaluate the script, reloading it as often as the store reports the
    /// identifier unknown.
    ///
    /// Load failures and transport errors are reported to `hook` and returned
    /// at once. Script error replies are returned without notifying `hook`;
    /// the caller decides whether they are expected.
    pub async fn invoke<S: Store + ?Sized>(
        &self,
        store: &S,
        keys: &[&str],
        args: &[&[u8]],
        cancel: &CancellationToken,
        hook: &FailureHook,
    ) -> CacheResult<Result<Reply, StoreError>> {
        loop {
            error_if_cancelled(cancel)?;
            let sha = match cancel_on_token(cancel, self.resolve(store)).await? {
                Ok(sha) => sha,
                Err(err) => {
                    hook.notify(self.name, &err);
                    return Err(err.into());
                }
            };
            match cancel_on_token(cancel, store.evalsha(&sha, keys, args)).await? {
                Ok(reply) => return Ok(Ok(reply)),
                Err(StoreError::NoScript) => {
                    hook.notify(self.name, &StoreError::NoScript);
                    self.invalidate(&sha).await;
                    debug!(script = self.name, %sha, "script evicted, reloading");
                }
                Err(err @ StoreError::Script(_)) => return Ok(Err(err)),
                Err(err) => {
                    hook.notify(self.name, &err);
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::CacheError;
    use crate::lua::GET_OR_LEASE;
    use crate::memory::MemoryStore;

    fn slot() -> ScriptSlot {
        ScriptSlot::new("get_or_lease", GET_OR_LEASE)
    }

    fn counting_hook() -> (FailureHook, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let hook = FailureHook::new(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        (hook, seen)
    }

    /// Store that forgets every script and cancels the caller after a few rounds.
    struct Forgetful {
        cancel: CancellationToken,
        evals: AtomicUsize,
    }

    #[async_trait]
    impl Store for Forgetful {
        async fn hget(&self, _: &str, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn script_load(&self, _: &str) -> Result<String, StoreError> {
            Ok("sha".into())
        }

        async fn evalsha(&self, _: &str, _: &[&str], _: &[&[u8]]) -> Result<Reply, StoreError> {
            if self.evals.fetch_add(1, Ordering::Relaxed) == 4 {
                self.cancel.cancel();
            }
            Err(StoreError::NoScript)
        }
    }

    #[tokio::test]
    async fn resolve_loads_once() {
        let store = MemoryStore::new();
        let slot = slot();
        let a = slot.resolve(&store).await.unwrap();
        let b = slot.resolve(&store).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolve_shares_one_load() {
        let store = Arc::new(MemoryStore::new());
        let slot = Arc::new(slot());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let slot = slot.clone();
                tokio::spawn(async move { slot.resolve(&store).await.unwrap() })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_keeps_refreshed_identifier() {
        let store = MemoryStore::new();
        let slot = slot();
        let sha = slot.resolve(&store).await.unwrap();
        slot.invalidate("something-else").await;
        assert_eq!(slot.cached().await, Some(sha.clone()));
        slot.invalidate(&sha).await;
        assert_eq!(slot.cached().await, None);
    }

    #[tokio::test]
    async fn invoke_recovers_from_eviction() {
        let store = MemoryStore::new();
        let slot = slot();
        let (hook, seen) = counting_hook();
        let cancel = CancellationToken::new();
        slot.resolve(&store).await.unwrap();
        store.flush_scripts().await;

        let reply = slot.invoke(&store, &["k"], &[b"30"], &cancel, &hook).await.unwrap();
        assert_eq!(reply.unwrap(), Reply::Nil);
        assert_eq!(store.load_count(), 2);
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn load_failure_is_not_retried() {
        let store = MemoryStore::new();
        store.set_offline(true).await;
        let slot = slot();
        let (hook, seen) = counting_hook();
        let cancel = CancellationToken::new();

        let err = slot.invoke(&store, &["k"], &[b"30"], &cancel, &hook).await.unwrap_err();
        assert!(matches!(err, CacheError::Store(StoreError::Backend(_))));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
        assert_eq!(store.eval_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_stops_reload_loop() {
        let cancel = CancellationToken::new();
        let store = Forgetful { cancel: cancel.clone(), evals: AtomicUsize::new(0) };
        let slot = slot();

        let err = slot
            .invoke(&store, &["k"], &[b"30"], &cancel, &FailureHook::silent())
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));
        assert_eq!(store.evals.load(Ordering::Relaxed), 5);
    }

    #[tokio::test]
    async fn script_errors_bypass_the_hook() {
        let store = MemoryStore::new();
        let slot = slot();
        let (hook, seen) = counting_hook();
        let cancel = CancellationToken::new();

        slot.invoke(&store, &["k"], &[b"30"], &cancel, &hook).await.unwrap().unwrap();
        let second = slot.invoke(&store, &["k"], &[b"30"], &cancel, &hook).await.unwrap();
        assert_eq!(second.unwrap_err().script_code(), Some("LEASING"));
        assert_eq!(seen.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn panicking_hook_is_contained() {
        let hook = FailureHook::new(|_, _| panic!("observer bug"));
        hook.notify("set", &StoreError::NoScript);
    }
}
