use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rediscas::cancel::deadline;
use rediscas::settings::{load_cache, CacheConfig};
use rediscas::{Cache, CacheError, Lookup, RedisStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "rediscas", about = "Versioned CAS cache on redis")]
struct Args {
    /// Optional TOML config (redis_url, write_ttl_secs, lease_ttl_secs, op_timeout_ms)
    #[arg(long)]
    config: Option<String>,
    /// Redis url, overrides the config file
    #[arg(long)]
    redis: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Plain read of the cached data
    Get { key: String },
    /// Read the data or take the lease for recomputing it
    Lease { key: String },
    /// Write data under a version; older or equal versions are ignored
    Set { key: String, version: u64, data: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").with_writer(std::io::stderr).init();
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => load_cache(path)?,
        None => CacheConfig::default(),
    };
    if let Some(url) = args.redis {
        cfg.redis_url = url;
    }

    let store = RedisStore::connect(&cfg.redis_url).await?;
    let cache = Cache::from_config(store, &cfg);
    let cancel = deadline(Duration::from_millis(cfg.op_timeout_ms));

    match args.cmd {
        Cmd::Get { key } => match cache.get(&cancel, &key).await {
            Ok(data) => println!("{}", String::from_utf8_lossy(&data)),
            Err(CacheError::NotFound) => {
                info!(%key, "not found");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Cmd::Lease { key } => match cache.get_or_lease(&cancel, &key).await {
            Ok(Lookup::Hit(data)) => println!("{}", String::from_utf8_lossy(&data)),
            Ok(Lookup::LeaseGranted) => {
                info!(%key, ttl_secs = cfg.lease_ttl_secs, "lease granted, set the value before it expires");
                std::process::exit(2);
            }
            Err(CacheError::Leasing) => {
                info!(%key, "another caller holds the lease");
                std::process::exit(3);
            }
            Err(e) => return Err(e.into()),
        },
        Cmd::Set { key, version, data } => {
            cache.set(&cancel, &key, version, data).await?;
            info!(%key, version, "set done");
        }
    }
    cancel.cancel();
    Ok(())
}
