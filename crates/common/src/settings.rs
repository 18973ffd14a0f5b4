use anyhow::Result;
use serde::Deserialize;

use crate::types::{DEFAULT_LEASE_TTL_SECS, DEFAULT_WRITE_TTL_SECS};

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_write_ttl")]
    pub write_ttl_secs: u64, // default 900
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64, // default 30
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            write_ttl_secs: default_write_ttl(),
            lease_ttl_secs: default_lease_ttl(),
            op_timeout_ms: default_op_timeout(),
        }
    }
}

fn default_redis_url() -> String { "redis://127.0.0.1:6379".into() }
fn default_write_ttl() -> u64 { DEFAULT_WRITE_TTL_SECS }
fn default_lease_ttl() -> u64 { DEFAULT_LEASE_TTL_SECS }
fn default_op_timeout() -> u64 { 2000 }

pub fn parse_cache(s: &str) -> Result<CacheConfig> {
    let cfg: CacheConfig = toml::from_str(s)?;
    if cfg.write_ttl_secs == 0 || cfg.lease_ttl_secs == 0 {
        anyhow::bail!("ttl values must be positive");
    }
    Ok(cfg)
}

pub fn load_cache(path: &str) -> Result<CacheConfig> {
    let s = std::fs::read_to_string(path)?;
    parse_cache(&s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_cache("").unwrap();
        assert_eq!(cfg.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(cfg.write_ttl_secs, 900);
        assert_eq!(cfg.lease_ttl_secs, 30);
        assert_eq!(cfg.op_timeout_ms, 2000);
    }

    #[test]
    fn overrides_are_read() {
        let cfg = parse_cache("redis_url = \"redis://cache:6380\"\nlease_ttl_secs = 5\n").unwrap();
        assert_eq!(cfg.redis_url, "redis://cache:6380");
        assert_eq!(cfg.lease_ttl_secs, 5);
        assert_eq!(cfg.write_ttl_secs, 900);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(parse_cache("write_ttl_secs = 0").is_err());
    }
}
