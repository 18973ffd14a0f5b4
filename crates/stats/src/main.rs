use anyhow::Result;
use clap::Parser;
use csv::StringRecord;
use std::collections::BTreeMap;

#[derive(Parser, Debug)]
struct Args {
    /// Bench CSV path (worker,iteration,outcome,micros)
    #[arg(long, default_value = "bench.csv")]
    input: String,
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() { return 0; }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx]
}

#[derive(Debug, Default)]
struct Samples {
    by_outcome: BTreeMap<String, Vec<u64>>,
    /// Short rows and rows whose latency is not an integer.
    skipped: usize,
}

fn collect(records: impl Iterator<Item = csv::Result<StringRecord>>) -> Result<Samples> {
    let mut samples = Samples::default();
    for rec in records {
        let rec = rec?;
        if rec.len() < 4 {
            samples.skipped += 1;
            continue;
        }
        let Ok(micros) = rec[3].trim().parse::<u64>() else {
            samples.skipped += 1;
            continue;
        };
        let outcome = rec[2].trim().to_string();
        samples.by_outcome.entry(outcome).or_default().push(micros);
    }
    for v in samples.by_outcome.values_mut() {
        v.sort_unstable();
    }
    Ok(samples)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rdr = csv::Reader::from_path(&args.input)?;
    let Samples { by_outcome, skipped } = collect(rdr.records())?;
    if skipped > 0 {
        println!("skipped {skipped} malformed rows");
    }
    if by_outcome.is_empty() {
        println!("no rows");
        return Ok(());
    }

    println!("latency per outcome (us):");
    for (outcome, v) in &by_outcome {
        let sum: u64 = v.iter().sum();
        let avg = sum as f64 / v.len() as f64;
        println!(
            "  {outcome:<8} n={:<8} avg={avg:.1} p50={} p90={} p99={} max={}",
            v.len(),
            percentile(v, 0.5),
            percentile(v, 0.9),
            percentile(v, 0.99),
            v.last().copied().unwrap_or(0),
        );
    }
    Ok(())
}
