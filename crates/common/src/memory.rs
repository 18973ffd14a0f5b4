//! In-process [`Store`] for tests and local runs.
//!
//! Interprets the two cache scripts natively. Each evaluation runs entirely
//! under one lock, which gives the same atomicity Redis gives a Lua script.
//! Expiry follows the tokio clock so paused-time tests can jump past a TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::lua::{GET_OR_LEASE, LEASING_CODE, SET_IF_NEWER};
use crate::store::Store;
use crate::types::{Reply, DATA_FIELD, LEASING_FIELD, VERSION_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    SetIfNewer,
    GetOrLease,
    Unknown,
}

#[derive(Debug, Default)]
struct Entry {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    scripts: HashMap<String, ScriptKind>,
    offline: bool,
}

impl State {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Backend("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    loads: AtomicUsize,
    evals: AtomicUsize,
}

pub fn script_sha(source: &str) -> String {
    hex::encode(Sha1::digest(source.as_bytes()))
}

fn utf8_arg<'a>(args: &[&'a [u8]], idx: usize) -> Result<&'a str, StoreError> {
    let raw = args
        .get(idx)
        .ok_or_else(|| StoreError::Backend(format!("missing ARGV[{}]", idx + 1)))?;
    std::str::from_utf8(raw).map_err(|_| StoreError::Backend(format!("ARGV[{}] is not utf-8", idx + 1)))
}

/// Accepts exactly what the Lua script accepts: `0` or digits without a
/// leading zero or sign.
fn canonical_version(raw: &str) -> Option<u64> {
    let canonical = raw == "0"
        || (raw.starts_with(|c: char| matches!(c, '1'..='9')) && raw.bytes().all(|b| b.is_ascii_digit()));
    if canonical {
        raw.parse().ok()
    } else {
        None
    }
}

fn ttl_arg(args: &[&[u8]], idx: usize) -> Result<Duration, StoreError> {
    let secs: u64 = utf8_arg(args, idx)?
        .parse()
        .map_err(|_| StoreError::Backend("ERR value is not an integer or out of range".into()))?;
    Ok(Duration::from_secs(secs))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every loaded script, like `SCRIPT FLUSH` or a server restart.
    pub async fn flush_scripts(&self) {
        self.state.lock().await.scripts.clear();
    }

    /// While offline every call fails with a backend error.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Remaining time to live of `key`, `None` if absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let entry = state.live(key, now)?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn eval_count(&self) -> usize {
        self.evals.load(Ordering::Relaxed)
    }

    fn set_if_newer(state: &mut State, key: &str, args: &[&[u8]], now: Instant) -> Result<Reply, StoreError> {
        let new = canonical_version(utf8_arg(args, 0)?)
            .ok_or_else(|| StoreError::Script("BADVERSION version must be a canonical decimal integer".into()))?;
        let data = args
            .get(1)
            .ok_or_else(|| StoreError::Backend("missing ARGV[2]".into()))?
            .to_vec();
        let ttl = ttl_arg(args, 2)?;

        let current = state
            .live(key, now)
            .and_then(|e| e.fields.get(VERSION_FIELD))
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.parse::<u64>().ok());
        if current.is_some_and(|cur| new <= cur) {
            return Ok(Reply::Bulk(b"OK".to_vec()));
        }

        let entry = state.entries.entry(key.to_string()).or_default();
        entry.fields.insert(VERSION_FIELD.into(), new.to_string().into_bytes());
        entry.fields.insert(DATA_FIELD.into(), data);
        entry.fields.remove(LEASING_FIELD);
        entry.expires_at = Some(now + ttl);
        Ok(Reply::Bulk(b"OK".to_vec()))
    }

    fn get_or_lease(state: &mut State, key: &str, args: &[&[u8]], now: Instant) -> Result<Reply, StoreError> {
        let ttl = ttl_arg(args, 0)?;
        if let Some(entry) = state.live(key, now) {
            if let Some(data) = entry.fields.get(DATA_FIELD) {
                return Ok(Reply::Bulk(data.clone()));
            }
            if entry.fields.contains_key(LEASING_FIELD) {
                return Err(StoreError::Script(format!("{LEASING_CODE} cache entry is being leased")));
            }
        }
        let entry = state.entries.entry(key.to_string()).or_default();
        entry.fields.insert(LEASING_FIELD.into(), b"1".to_vec());
        entry.expires_at = Some(now + ttl);
        Ok(Reply::Nil)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_online()?;
        Ok(state.live(key, now).and_then(|e| e.fields.get(field).cloned()))
    }

    async fn script_load(&self, source: &str) -> Result<String, StoreError> {
        let mut state = self.state.lock().await;
        state.check_online()?;
        let kind = match source {
            SET_IF_NEWER => ScriptKind::SetIfNewer,
            GET_OR_LEASE => ScriptKind::GetOrLease,
            _ => ScriptKind::Unknown,
        };
        let sha = script_sha(source);
        state.scripts.insert(sha.clone(), kind);
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(sha)
    }

    async fn evalsha(&self, sha: &str, keys: &[&str], args: &[&[u8]]) -> Result<Reply, StoreError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_online()?;
        self.evals.fetch_add(1, Ordering::Relaxed);
        let kind = *state.scripts.get(sha).ok_or(StoreError::NoScript)?;
        let [key] = keys else {
            return Err(StoreError::Backend(format!("expected one key, got {}", keys.len())));
        };
        match kind {
            ScriptKind::SetIfNewer => Self::set_if_newer(&mut state, key, args, now),
            ScriptKind::GetOrLease => Self::get_or_lease(&mut state, key, args, now),
            ScriptKind::Unknown => Err(StoreError::Backend("script not supported by memory store".into())),
        }
    }
}
