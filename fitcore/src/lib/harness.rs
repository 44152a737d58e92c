use crate::engine::Engine;
use crate::utils::*;
use log::info;
use serde::Serialize;

/// The allocation sizes drills draw from unless told otherwise. Taken
/// from the size classes the comparison demos exercise.
pub const DEFAULT_SIZES: [Bytes; 8] = [16, 32, 64, 128, 256, 512, 1024, 2048];

/// Configuration of one randomized drill run.
#[derive(Clone, Debug)]
pub struct DrillConfig {
    pub total_size: Bytes,
    /// Allocation attempts to make. Each may be followed by a release.
    pub iterations: usize,
    /// Palette the per-iteration request size is drawn from, uniformly.
    pub sizes:      Vec<Bytes>,
    /// Seed of the run's ChaCha stream. Same configuration, same
    /// operation log.
    pub seed:       u64,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Alloc,
    Dealloc,
}

/// One line of the operation log.
#[derive(Serialize, Clone, Copy, Debug)]
pub struct OpRecord {
    /// Iteration the operation belongs to.
    pub index:   usize,
    pub kind:    OpKind,
    pub size:    Bytes,
    pub latency: Duration,
    pub success: bool,
}

/// Everything a completed run reports: the full operation log, plus
/// aggregates computed once the loop is over.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub seed:                   u64,
    pub iterations:             usize,
    pub successful_allocs:      usize,
    pub success_rate:           f64,
    /// Mean latency over *all* allocation attempts, failed included.
    pub avg_alloc_ms:           f64,
    /// Successful allocations per wall-clock second.
    pub throughput:             f64,
    pub fragmentation:          f64,
    pub peak_allocated_bytes:   Bytes,
    pub wall_clock:             Duration,
    pub log:                    Vec<OpRecord>,
}

/// Drives a fresh engine through `iterations` randomized rounds: one
/// allocation attempt each and -- with probability one half after a
/// success -- one release of a uniformly chosen live block. A failed
/// allocation is a recorded sample, never a run-aborting error: the
/// loop always completes.
///
/// The harness only ever talks to the engine through its public
/// contract, the same one any other caller gets.
pub fn run(cfg: &DrillConfig) -> RunReport {
    assert!(cfg.iterations > 0, "A drill needs at least one iteration.");
    assert!(!cfg.sizes.is_empty(), "A drill needs a non-empty size palette.");

    let mut engine = Engine::new(cfg.total_size);
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let mut live: Vec<(BlockId, Bytes)> = vec![];
    let mut log: Vec<OpRecord> = Vec::with_capacity(cfg.iterations);
    info!(
        "drill: {} iterations over {}B, seed {}",
        cfg.iterations, cfg.total_size, cfg.seed
    );

    let clock = Instant::now();
    for index in 0..cfg.iterations {
        let size = cfg.sizes[rng.gen_range(0..cfg.sizes.len())];
        let lap = Instant::now();
        let verdict = engine.allocate(size);
        log.push(OpRecord {
            index,
            kind: OpKind::Alloc,
            size,
            latency: lap.elapsed(),
            success: verdict.is_ok(),
        });
        if let Ok(grant) = verdict {
            live.push((grant.id, size));
            if rng.gen_bool(0.5) {
                let (victim, freed) = live.swap_remove(rng.gen_range(0..live.len()));
                let lap = Instant::now();
                let released = engine.free(victim);
                log.push(OpRecord {
                    index,
                    kind: OpKind::Dealloc,
                    size: freed,
                    latency: lap.elapsed(),
                    success: released.is_ok(),
                });
            }
        }
    }
    let wall_clock = clock.elapsed();

    let successful_allocs = log
        .iter()
        .filter(|r| r.kind == OpKind::Alloc && r.success)
        .count();
    // One alloc entry exists per iteration, so the mean is well-defined.
    let avg_alloc_ms = log
        .iter()
        .filter(|r| r.kind == OpKind::Alloc)
        .map(|r| r.latency.as_secs_f64() * 1e3)
        .sum::<f64>()
        / cfg.iterations as f64;
    let stats = engine.stats();

    RunReport {
        seed:                   cfg.seed,
        iterations:             cfg.iterations,
        successful_allocs,
        success_rate:           successful_allocs as f64 / cfg.iterations as f64,
        avg_alloc_ms,
        throughput:             successful_allocs as f64 / wall_clock.as_secs_f64(),
        fragmentation:          stats.fragmentation,
        peak_allocated_bytes:   stats.peak_allocated_bytes,
        wall_clock,
        log,
    }
}
