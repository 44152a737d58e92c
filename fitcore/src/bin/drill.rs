use fitcore::*;
use rayon::prelude::*;

/// A randomized workload driver for the first-fit allocator engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Size of the simulated address range, in bytes
    #[arg(short, long, default_value_t = 8192)]
    memory: Bytes,

    /// Allocation attempts per run
    #[arg(short, long, default_value_t = 1000)]
    iterations: usize,

    /// Seed of the first run; run k gets seed + k
    #[arg(short, long, default_value_t = 62)]
    seed: u64,

    /// Number of independently seeded runs
    #[arg(short, long, default_value_t = 1)]
    runs: usize,

    /// Comma-separated allocation size palette
    #[arg(long, value_delimiter = ',')]
    sizes: Vec<Bytes>,

    /// Dump the full reports as JSON instead of the text summary
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();
    let cli = Args::parse();
    assert!(cli.runs > 0, "At least one run must be requested.");
    let sizes = if cli.sizes.is_empty() {
        DEFAULT_SIZES.to_vec()
    } else {
        cli.sizes.clone()
    };

    let configs: Vec<DrillConfig> = (0..cli.runs)
        .map(|k| DrillConfig {
            total_size: cli.memory,
            iterations: cli.iterations,
            sizes:      sizes.clone(),
            seed:       cli.seed + k as u64,
        })
        .collect();

    let total = Instant::now();
    // Runs own independent engines, so sweeping them in parallel is
    // fair game. A single run stays on one thread for clean timings.
    let reports: Vec<RunReport> = if cli.runs > 1 {
        configs.par_iter().map(harness::run).collect()
    } else {
        configs.iter().map(harness::run).collect()
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reports).unwrap());
        return;
    }

    println!(
        "Palette: [{}] over {} bytes, {} iterations/run",
        sizes.iter().join(", "),
        cli.memory,
        cli.iterations
    );
    for r in &reports {
        println!(
            "seed {}:\tsuccess {:.1}%\tavg alloc {:.4} ms\tthroughput {:.0} ops/s\tfrag {:.1}%\tpeak {} bytes",
            r.seed,
            r.success_rate * 100.0,
            r.avg_alloc_ms,
            r.throughput,
            r.fragmentation * 100.0,
            r.peak_allocated_bytes
        );
    }

    let mean = |f: fn(&RunReport) -> f64| reports.iter().map(f).sum::<f64>() / reports.len() as f64;
    println!(
        "Total drill time: {:.2} seconds",
        total.elapsed().as_secs_f64()
    );
    println!(
        "Success rate:\t{:.1}%\nThroughput:\t{:.0} ops/s\nFragmentation:\t{:.1}%",
        mean(|r| r.success_rate) * 100.0,
        mean(|r| r.throughput),
        mean(|r| r.fragmentation) * 100.0
    );
}
