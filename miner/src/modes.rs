//! One-shot solve and benchmark modes

use std::time::{Duration, Instant};

use anyhow::Context;
use colored::*;
use log::info;
use rand::Rng;

use turbomul_engine::{
    encode, multiply, multiply_parallel, score, Deriver, Dimensions, LedgerClient, MatrixA,
    MatrixB, Preamble,
};

use crate::stats::fmt_rate;

/// Fetch one workload, solve it with the server's matrices and ask the
/// validator whether the math checks out. No search, no submission.
pub async fn run_once<C: LedgerClient + ?Sized>(client: &C) -> anyhow::Result<()> {
    let dims = Dimensions::AMADEUS;

    let started = Instant::now();
    let workload = client
        .fetch_workload()
        .await
        .context("Failed to fetch workload")?;
    let fetch_time = started.elapsed();
    info!(
        "Workload for epoch {} ({} matrices)",
        workload.epoch(),
        if workload.matrices.is_some() { "server" } else { "derived" }
    );

    let preamble = workload.preamble.to_bytes();
    let solve_started = Instant::now();
    let solution = tokio::task::spawn_blocking(move || -> turbomul_engine::Result<_> {
        let (a, b) = workload.matrices(dims)?;
        let checksum = multiply_parallel(&a, &b)?;
        encode(&preamble, &[], &checksum.to_le_bytes())
    })
    .await
    .context("Solver task panicked")??;
    let solve_time = solve_started.elapsed();

    let verdict = client
        .validate(&solution)
        .await
        .context("Failed to validate solution")?;

    let mark = |ok: bool| if ok { "yes".bright_green().bold() } else { "no".bright_red().bold() };
    println!("{} {}", " * ".bright_green().bold(), "SOLVE".bright_white().bold());
    println!("    {:<12} {}", "epoch".bright_black(), Preamble::from_bytes(solution.preamble())?.epoch());
    println!("    {:<12} {} bytes", "solution".bright_black(), solution.len());
    println!("    {:<12} {} bits", "score".bright_black(), score(solution.as_bytes()));
    println!("    {:<12} {}", "valid_math".bright_black(), mark(verdict.valid_math));
    println!("    {:<12} {}", "valid".bright_black(), mark(verdict.valid));
    println!("    {:<12} {:.2?} fetch, {:.2?} solve", "timing".bright_black(), fetch_time, solve_time);

    Ok(())
}

#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub iterations: usize,
    pub multiply: Duration,
    pub multiply_parallel: Duration,
    pub derive: Duration,
    pub score: Duration,
}

impl BenchmarkReport {
    fn per_sec(iterations: usize, total: Duration) -> f64 {
        let secs = total.as_secs_f64();
        if secs > 0.0 {
            iterations as f64 / secs
        } else {
            0.0
        }
    }

    pub fn solutions_per_sec(&self) -> f64 {
        Self::per_sec(self.iterations, self.multiply)
    }

    pub fn print(&self) {
        println!("{} {}", " * ".bright_green().bold(), "BENCHMARK".bright_white().bold());
        let rows = [
            ("multiply", self.multiply),
            ("multiply-par", self.multiply_parallel),
            ("derive", self.derive),
            ("score", self.score),
        ];
        for (name, total) in rows {
            let (value, unit, _) = fmt_rate(Self::per_sec(self.iterations, total));
            let avg = total / self.iterations.max(1) as u32;
            println!(
                "    {:<12} {} {}  avg {:.3?}",
                name.bright_black(),
                value.bright_cyan().bold(),
                unit.white(),
                avg,
            );
        }
        println!(
            "    {:<12} {:.2} solutions/s over {} runs",
            "result".bright_black(),
            self.solutions_per_sec(),
            self.iterations,
        );
    }
}

fn random_matrices(rng: &mut impl Rng, dims: Dimensions) -> anyhow::Result<(MatrixA, MatrixB)> {
    let a: Vec<u8> = (0..dims.a_len()).map(|_| rng.gen()).collect();
    let b: Vec<i8> = (0..dims.b_len()).map(|_| rng.gen()).collect();
    Ok((
        MatrixA::new(dims.m, dims.k, a)?,
        MatrixB::new(dims.k, dims.n, b)?,
    ))
}

/// Time checksum computation over random matrices, plus derivation and scoring.
pub fn run_benchmark(iterations: usize, dims: Dimensions) -> anyhow::Result<BenchmarkReport> {
    if iterations == 0 {
        anyhow::bail!("Benchmark needs at least one iteration");
    }
    let mut rng = rand::thread_rng();

    let mut multiply_total = Duration::ZERO;
    let mut parallel_total = Duration::ZERO;
    let mut checksum = Vec::new();
    for i in 0..iterations {
        let (a, b) = random_matrices(&mut rng, dims)?;

        let t = Instant::now();
        let c = multiply(&a, &b)?;
        multiply_total += t.elapsed();

        let t = Instant::now();
        let p = multiply_parallel(&a, &b)?;
        parallel_total += t.elapsed();

        if c != p {
            anyhow::bail!("Parallel checksum diverged on run {}", i);
        }
        checksum = c.to_le_bytes();
    }

    let mut preamble = Preamble::zeroed();
    let mut deriver = Deriver::new(dims);
    let mut derive_total = Duration::ZERO;
    for i in 0..iterations {
        preamble.epoch = i as u32;
        let bytes = preamble.to_bytes();
        let t = Instant::now();
        deriver.derive_into(&bytes)?;
        derive_total += t.elapsed();
    }

    let solution = encode(&Preamble::zeroed().to_bytes(), &[], &checksum)?;
    let t = Instant::now();
    let mut best = 0;
    for _ in 0..iterations {
        best = best.max(score(solution.as_bytes()));
    }
    let score_total = t.elapsed();
    log::debug!("Benchmark solution scored {} bits", best);

    Ok(BenchmarkReport {
        iterations,
        multiply: multiply_total,
        multiply_parallel: parallel_total,
        derive: derive_total,
        score: score_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benchmark_small_dims() {
        let report = run_benchmark(3, Dimensions::with_k(64)).unwrap();
        assert_eq!(report.iterations, 3);
        assert!(report.solutions_per_sec() >= 0.0);
    }

    #[test]
    fn test_benchmark_rejects_zero_runs() {
        assert!(run_benchmark(0, Dimensions::with_k(4)).is_err());
    }

    #[test]
    fn test_random_matrices_shape() {
        let dims = Dimensions::with_k(8);
        let (a, b) = random_matrices(&mut rand::thread_rng(), dims).unwrap();
        assert_eq!((a.rows(), a.cols()), (16, 8));
        assert_eq!((b.rows(), b.cols()), (8, 16));
    }

    #[test]
    fn test_per_sec() {
        assert_eq!(BenchmarkReport::per_sec(10, Duration::ZERO), 0.0);
        assert!((BenchmarkReport::per_sec(10, Duration::from_secs(2)) - 5.0).abs() < 1e-9);
    }
}
