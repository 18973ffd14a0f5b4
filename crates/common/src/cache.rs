//! Versioned compare-and-swap cache with miss leasing.
//!
//! `set` only replaces data when the incoming version is strictly newer than
//! the stored one, so a late writer holding old data cannot clobber a fresh
//! value. `get_or_lease` lets exactly one caller recompute a missing value
//! while everyone else backs off with [`CacheError::Leasing`].

use std::time::Duration;

use tracing::debug;

use crate::cancel::{cancel_on_token, CancellationToken};
use crate::error::{CacheError, CacheResult, StoreError};
use crate::lua::{GET_OR_LEASE, LEASING_CODE, SET_IF_NEWER};
use crate::script::{FailureHook, ScriptSlot};
use crate::settings::CacheConfig;
use crate::store::Store;
use crate::types::{Lookup, Reply, DATA_FIELD, DEFAULT_LEASE_TTL_SECS, DEFAULT_WRITE_TTL_SECS};

#[derive(Debug)]
pub struct Cache<S> {
    store: S,
    set_script: ScriptSlot,
    lease_script: ScriptSlot,
    write_ttl: Duration,
    lease_ttl: Duration,
    hook: FailureHook,
}

impl<S: Store> Cache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            set_script: ScriptSlot::new("set_if_newer", SET_IF_NEWER),
            lease_script: ScriptSlot::new("get_or_lease", GET_OR_LEASE),
            write_ttl: Duration::from_secs(DEFAULT_WRITE_TTL_SECS),
            lease_ttl: Duration::from_secs(DEFAULT_LEASE_TTL_SECS),
            hook: FailureHook::default(),
        }
    }

    pub fn from_config(store: S, cfg: &CacheConfig) -> Self {
        Self::new(store).with_ttls(
            Duration::from_secs(cfg.write_ttl_secs),
            Duration::from_secs(cfg.lease_ttl_secs),
        )
    }

    /// TTLs are sent to the store in whole seconds, minimum one, as the
    /// trailing script argument after `key, version, data`. The defaults
    /// (900 s after a write, 30 s after a lease grant) are the fixed expiries
    /// the scripts would otherwise hard-code.
    pub fn with_ttls(mut self, write: Duration, lease: Duration) -> Self {
        self.write_ttl = write;
        self.lease_ttl = lease;
        self
    }

    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load both scripts up front so an unreachable store shows up at startup.
    pub async fn preload(&self, cancel: &CancellationToken) -> CacheResult<()> {
        for slot in [&self.set_script, &self.lease_script] {
            if let Err(err) = cancel_on_token(cancel, slot.resolve(&self.store)).await? {
                self.hook.notify(slot.name(), &err);
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Plain read of the cached data. Ignores leases entirely, so it gives no
    /// stampede protection.
    pub async fn get(&self, cancel: &CancellationToken, key: &str) -> CacheResult<Vec<u8>> {
        match cancel_on_token(cancel, self.store.hget(key, DATA_FIELD)).await? {
            Ok(Some(data)) => Ok(data),
            Ok(None) => Err(CacheError::NotFound),
            Err(err) => {
                self.hook.notify("get", &err);
                Err(err.into())
            }
        }
    }

    /// Read the cached data, or take the lease for recomputing it.
    ///
    /// Fails with [`CacheError::Leasing`] while another caller holds the lease.
    pub async fn get_or_lease(&self, cancel: &CancellationToken, key: &str) -> CacheResult<Lookup> {
        let ttl = ttl_secs(self.lease_ttl);
        let reply = self
            .lease_script
            .invoke(&self.store, &[key], &[ttl.as_bytes()], cancel, &self.hook)
            .await?;
        match reply {
            Ok(Reply::Bulk(data)) => Ok(Lookup::Hit(data)),
            Ok(Reply::Nil) => {
                debug!(key, "lease granted");
                Ok(Lookup::LeaseGranted)
            }
            Ok(other) => Err(CacheError::InvalidPayload(format!("get_or_lease replied {other:?}"))),
            Err(err) => Err(self.script_failure("get_or_lease", err)),
        }
    }

    /// Store `data` under `version` unless the entry already holds the same or
    /// a newer version. A stale write is a silent no-op.
    pub async fn set(
        &self,
        cancel: &CancellationToken,
        key: &str,
        version: u64,
        data: impl AsRef<[u8]>,
    ) -> CacheResult<()> {
        let version = version.to_string();
        let ttl = ttl_secs(self.write_ttl);
        let args: [&[u8]; 3] = [version.as_bytes(), data.as_ref(), ttl.as_bytes()];
        let reply = self
            .set_script
            .invoke(&self.store, &[key], &args, cancel, &self.hook)
            .await?;
        match reply {
            Ok(reply) if reply.is_ok_status() => Ok(()),
            Ok(other) => Err(CacheError::InvalidPayload(format!("set_if_newer replied {other:?}"))),
            Err(err) => Err(self.script_failure("set_if_newer", err)),
        }
    }

    fn script_failure(&self, op: &str, err: StoreError) -> CacheError {
        if err.script_code() == Some(LEASING_CODE) {
            return CacheError::Leasing;
        }
        self.hook.notify(op, &err);
        err.into()
    }
}

fn ttl_secs(ttl: Duration) -> String {
    ttl.as_secs().max(1).to_string()
}
