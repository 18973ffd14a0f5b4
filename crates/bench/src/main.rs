use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rediscas::settings::{load_cache, CacheConfig};
use rediscas::{Cache, CacheError, CancellationToken, Lookup, RedisStore};
use tokio::time::Instant;
use tracing::{info, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Redis url
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    redis: String,
    /// Optional TOML config; its redis_url wins over --redis
    #[arg(long)]
    config: Option<String>,
    /// Cache key every worker hammers
    #[arg(long, default_value = "bench")]
    key: String,
    /// Iterations per worker
    #[arg(long, default_value_t = 100_000)]
    iterations: u64,
    /// Concurrent workers sharing one cache
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Version written by a lease holder
    #[arg(long, default_value_t = 10)]
    version: u64,
    /// Value written by a lease holder
    #[arg(long, default_value = "some long string abcdafdafdsfaf")]
    value: String,
    /// Optional CSV output (worker,iteration,outcome,micros)
    #[arg(long)]
    out: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    hits: u64,
    leases: u64,
    leasing: u64,
}

type Row = (usize, u64, &'static str, u128);

async fn worker(
    id: usize,
    cache: Arc<Cache<RedisStore>>,
    args: Arc<Args>,
    cancel: CancellationToken,
    record: bool,
) -> Result<(Tally, Vec<Row>)> {
    let mut tally = Tally::default();
    let mut rows = Vec::new();
    for i in 0..args.iterations {
        let start = Instant::now();
        let outcome = match cache.get_or_lease(&cancel, &args.key).await {
            Ok(Lookup::Hit(_)) => {
                tally.hits += 1;
                "hit"
            }
            Ok(Lookup::LeaseGranted) => {
                cache.set(&cancel, &args.key, args.version, &args.value).await?;
                tally.leases += 1;
                "lease"
            }
            Err(CacheError::Leasing) => {
                tally.leasing += 1;
                "leasing"
            }
            Err(e) => return Err(e.into()),
        };
        if record {
            rows.push((id, i, outcome, start.elapsed().as_micros()));
        }
    }
    Ok((tally, rows))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => load_cache(path)?,
        None => CacheConfig { redis_url: args.redis.clone(), ..CacheConfig::default() },
    };

    let store = RedisStore::connect(&cfg.redis_url).await?;
    let cache = Arc::new(Cache::from_config(store, &cfg));
    let cancel = CancellationToken::new();
    cache.preload(&cancel).await?;
    info!(workers = args.workers, iterations = args.iterations, key = %args.key, "bench started");

    let record = args.out.is_some();
    let args = Arc::new(args);
    let started_at = chrono::Utc::now();
    let start = Instant::now();
    let runs = futures_util::future::try_join_all(
        (0..args.workers.max(1)).map(|id| worker(id, cache.clone(), args.clone(), cancel.clone(), record)),
    )
    .await?;
    let elapsed = start.elapsed();

    let mut total = Tally::default();
    for (t, _) in &runs {
        total.hits += t.hits;
        total.leases += t.leases;
        total.leasing += t.leasing;
    }

    if let Some(path) = &args.out {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["worker", "iteration", "outcome", "micros"])?;
        for (_, rows) in &runs {
            for (id, i, outcome, micros) in rows {
                wtr.write_record([id.to_string(), i.to_string(), outcome.to_string(), micros.to_string()])?;
            }
        }
        wtr.flush()?;
        info!("rows written to {}", path);
    }

    let summary = serde_json::json!({
        "started_at": started_at.to_rfc3339(),
        "elapsed_ms": elapsed.as_millis() as u64,
        "hits": total.hits,
        "leases": total.leases,
        "leasing": total.leasing,
    });
    println!("{summary}");
    Ok(())
}
