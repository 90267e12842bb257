//! Host calibration of the PBKDF2 iteration count.
//!
//! Each round hashes a single SHA-256 block `iterations` times as a proxy for
//! derivation cost and rescales the count by `target / measured`. This is
//! proportional correction rather than a search, so convergence is heuristic:
//! the loop is bounded by rounds, total time, a tolerance band around the target
//! and a stability guard on consecutive measurements.

use std::{
    hint::black_box,
    time::{Duration, Instant},
};

use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// Iteration count of the first round.
pub const START_ITERATIONS: u32 = 10_000;

/// Bounds and thresholds for one calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkParams {
    /// Desired duration of one derivation, in seconds.
    pub target_secs: f64,
    /// Stop once cumulative measured time exceeds this.
    pub max_total_secs: f64,
    /// Hard cap on rounds.
    pub max_rounds: u32,
    /// Accept a round within this distance of the target.
    pub tolerance_secs: f64,
    /// Stop when two consecutive rounds differ by less than this.
    pub stability_secs: f64,
    pub start_iterations: u32,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            target_secs: 1.0,
            max_total_secs: 30.0,
            max_rounds: 20,
            tolerance_secs: 0.1,
            stability_secs: 0.01,
            start_iterations: START_ITERATIONS,
        }
    }
}

impl BenchmarkParams {
    #[must_use]
    pub fn new(target_secs: f64, max_total_secs: f64, max_rounds: u32) -> Self {
        Self {
            target_secs,
            max_total_secs,
            max_rounds,
            ..Self::default()
        }
    }
}

/// Why the calibration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    WithinTolerance,
    MaxRounds,
    TimeBudget,
    Stable,
}

/// Result of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkOutcome {
    pub iterations: u32,
    pub rounds: u32,
    pub elapsed_secs: f64,
    pub stop: StopReason,
}

/// Check that a working SHA-256 and a monotonic clock are available.
pub fn check_environment() -> Result<(), VaultError> {
    // SHA-256("abc"), FIPS 180-2 appendix B.1.
    const ABC_PREFIX: [u8; 4] = [0xba, 0x78, 0x16, 0xbf];
    let digest = Sha256::digest(b"abc");
    if digest[..4] != ABC_PREFIX {
        return Err(VaultError::UnsupportedEnvironment(
            "SHA-256 digest self-test failed".to_string(),
        ));
    }

    let start = Instant::now();
    let later = Instant::now();
    if later < start {
        return Err(VaultError::UnsupportedEnvironment(
            "clock is not monotonic".to_string(),
        ));
    }
    Ok(())
}

/// Run `iterations` chained single-block hashes and return the wall time.
fn time_hash_rounds(iterations: u32) -> Duration {
    let mut block = [0u8; 32];
    let start = Instant::now();
    for _ in 0..iterations {
        let digest = Sha256::digest(black_box(block));
        block.copy_from_slice(&digest);
    }
    black_box(block);
    start.elapsed()
}

/// Calibrate against the real host clock.
///
/// CPU-bound; call from a blocking context (see [`benchmark_async`]).
pub fn benchmark(params: &BenchmarkParams) -> Result<BenchmarkOutcome, VaultError> {
    check_environment()?;
    let outcome = run_rounds(params, |iterations| {
        time_hash_rounds(iterations).as_secs_f64()
    });

    #[cfg(feature = "tracing")]
    tracing::info!(
        iterations = outcome.iterations,
        rounds = outcome.rounds,
        elapsed_secs = outcome.elapsed_secs,
        stop = ?outcome.stop,
        "key derivation benchmark finished"
    );

    Ok(outcome)
}

/// Run [`benchmark`] on the blocking thread pool.
pub async fn benchmark_async(params: BenchmarkParams) -> Result<BenchmarkOutcome, VaultError> {
    tokio::task::spawn_blocking(move || benchmark(&params))
        .await
        .map_err(|e| VaultError::UnsupportedEnvironment(format!("benchmark task failed: {e}")))?
}

/// Calibrate, falling back to `fallback` iterations when the host can't be measured.
pub async fn benchmark_or_default(params: BenchmarkParams, fallback: u32) -> u32 {
    match benchmark_async(params).await {
        Ok(outcome) => outcome.iterations,
        Err(_e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %_e, fallback, "benchmark failed, using default iterations");
            fallback.max(1)
        },
    }
}

/// The calibration loop, with the measurement injected.
///
/// `measure(iterations)` returns the duration of one round in seconds.
pub fn run_rounds(
    params: &BenchmarkParams,
    mut measure: impl FnMut(u32) -> f64,
) -> BenchmarkOutcome {
    let mut iterations = params.start_iterations.max(1);
    let mut total = 0.0_f64;
    let mut previous: Option<f64> = None;
    let mut rounds = 0u32;

    loop {
        let measured = measure(iterations).max(0.0);
        rounds += 1;
        total += measured;

        #[cfg(feature = "tracing")]
        tracing::debug!(round = rounds, iterations, measured, "benchmark round");

        let stop = if (measured - params.target_secs).abs() <= params.tolerance_secs {
            Some(StopReason::WithinTolerance)
        } else if rounds >= params.max_rounds {
            Some(StopReason::MaxRounds)
        } else if total > params.max_total_secs {
            Some(StopReason::TimeBudget)
        } else if previous.is_some_and(|p| (measured - p).abs() < params.stability_secs) {
            Some(StopReason::Stable)
        } else {
            None
        };

        if let Some(stop) = stop {
            return BenchmarkOutcome {
                iterations,
                rounds,
                elapsed_secs: total,
                stop,
            };
        }

        iterations = rescale(iterations, params.target_secs, measured);
        previous = Some(measured);
    }
}

/// Scale `iterations` by `target / measured`, keeping the result in `1..=u32::MAX`.
fn rescale(iterations: u32, target: f64, measured: f64) -> u32 {
    // A round too fast to time at all: grow by the largest sane step.
    let ratio = if measured <= f64::EPSILON {
        1_000.0
    } else {
        target / measured
    };
    let next = (f64::from(iterations) * ratio).round();
    if next.is_nan() {
        return iterations.max(1);
    }
    if next >= f64::from(u32::MAX) {
        u32::MAX
    } else if next < 1.0 {
        1
    } else {
        next as u32
    }
}
