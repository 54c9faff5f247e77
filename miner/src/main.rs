mod client;
mod config;
mod modes;
mod stats;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::*;
use log::{info, warn};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use turbomul_engine::{Dimensions, Session};

use client::HttpLedgerClient;
use config::Config;
use stats::MinerStats;

#[derive(Parser, Debug)]
#[command(
    name = "turbomul-miner",
    version,
    author = "TurboMul Team",
    about = "TurboMul Miner - uPoW matrix-multiplication miner for the Amadeus ledger",
    long_about = None
)]
struct Cli {
    /// Workload/validation API base URL
    #[arg(long)]
    api: Option<String>,

    /// Chain RPC base URL
    #[arg(long)]
    rpc: Option<String>,

    /// Search strategy (recompute, reuse)
    #[arg(short, long)]
    strategy: Option<String>,

    /// Number of worker threads (0 = auto-detect)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Nonces claimed per batch
    #[arg(long)]
    batch_size: Option<u64>,

    /// Attempts per search round
    #[arg(long)]
    attempts: Option<u64>,

    /// Difficulty override in leading zero bits
    #[arg(short, long)]
    difficulty: Option<u32>,

    /// Accepted solutions per epoch before waiting for the next
    #[arg(long)]
    solutions_per_epoch: Option<u32>,

    /// Stop after this many accepted solutions
    #[arg(long)]
    max_solutions: Option<u64>,

    /// Check server matrices against local derivation
    #[arg(long)]
    verify_workload: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Config file path (default: ~/.turbomul/miner-config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the effective config to the config path and exit
    #[arg(long)]
    write_config: bool,

    /// Solve a single workload with the server matrices and report validity
    #[arg(long)]
    once: bool,

    /// Time N checksum computations over random matrices and exit
    #[arg(long, value_name = "N")]
    benchmark: Option<usize>,

    /// Stats panel refresh interval in seconds
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(api) = &self.api {
            config.api.base_url = api.clone();
        }
        if let Some(rpc) = &self.rpc {
            config.api.rpc_url = rpc.clone();
        }
        if let Some(strategy) = &self.strategy {
            config.mining.strategy = strategy.clone();
        }
        if let Some(threads) = self.threads {
            config.mining.threads = threads;
        }
        if let Some(batch) = self.batch_size {
            config.mining.batch_size = batch;
        }
        if let Some(attempts) = self.attempts {
            config.mining.attempts_per_round = attempts;
        }
        if self.difficulty.is_some() {
            config.mining.difficulty = self.difficulty;
        }
        if let Some(n) = self.solutions_per_epoch {
            config.mining.solutions_per_epoch = n;
        }
        if self.max_solutions.is_some() {
            config.mining.max_solutions = self.max_solutions;
        }
        if self.verify_workload {
            config.mining.verify_workload = true;
        }
        if self.insecure {
            config.api.insecure_tls = true;
        }
        if let Some(secs) = self.stats_interval {
            config.logging.stats_interval_secs = secs;
        }
        if self.no_color {
            config.logging.no_color = true;
        }
        if self.quiet {
            config.logging.quiet = true;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

fn level_filter(config: &Config) -> log::LevelFilter {
    if config.logging.quiet {
        return log::LevelFilter::Warn;
    }
    match config.logging.level.as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut config = match &cli.config {
        Some(path) if path.exists() => Config::from_file(path)?,
        Some(_) => Config::default(),
        None => Config::load_default()?,
    };
    cli.apply(&mut config);
    config.validate()?;

    env_logger::Builder::from_default_env()
        .filter_level(level_filter(&config))
        .init();

    if config.logging.no_color {
        colored::control::set_override(false);
    }

    if cli.write_config {
        config.save(&config_path)?;
        println!("Config written to {}", config_path.display());
        return Ok(());
    }

    if !config.logging.quiet {
        print_banner();
        print_config(&config);
    }

    if let Some(n) = cli.benchmark {
        let report = tokio::task::spawn_blocking(move || modes::run_benchmark(n, Dimensions::AMADEUS))
            .await
            .context("Benchmark task panicked")??;
        report.print();
        return Ok(());
    }

    let client = Arc::new(HttpLedgerClient::new(&config.api)?);

    if cli.once {
        return modes::run_once(client.as_ref()).await;
    }

    let session = Arc::new(Session::new(config.to_session_config()?)?);
    let cancel = CancellationToken::new();

    // Ctrl+C: first press stops gracefully, the session returns its summary
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\n{} {} {}\n",
                format!("[{}]", chrono::Utc::now().format("%H:%M:%S")).bright_black(),
                "signal".bright_yellow(),
                "Ctrl+C - shutting down...".bright_yellow().bold(),
            );
            shutdown.cancel();
        }
    });

    let stats = Arc::new(Mutex::new(MinerStats::new(
        &config.mining.strategy,
        &config.api.base_url,
        config.threads(),
    )));
    if !config.logging.quiet {
        let interval_secs = config.logging.stats_interval_secs.max(1);
        let panel_session = Arc::clone(&session);
        let panel_stats = Arc::clone(&stats);
        let panel_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = panel_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let mut stats = panel_stats.lock();
                        stats.update(&panel_session.snapshot());
                        stats.print();
                    }
                }
            }
        });
    }

    info!("Mining against {}", config.api.base_url);
    let summary = session.run(client.as_ref(), cancel.clone()).await;
    cancel.cancel();

    {
        let mut stats = stats.lock();
        stats.update(&session.snapshot());
        log::debug!("Final stats: {}", stats.to_json());
    }

    if summary.accepted == 0 && !summary.cancelled {
        warn!("Session ended without an accepted solution");
    }
    print_summary(&summary);

    Ok(())
}

fn print_banner() {
    println!();
    println!("{}",   " ╔══════════════════════════════════════════════════════════════════╗".bright_cyan());
    println!("{}{}{}" ," ║ ".bright_cyan(), format!("       TURBOMUL MINER  v{:<8}                                  ", env!("CARGO_PKG_VERSION")).bright_white().bold(), " ║".bright_cyan());
    println!("{}{}{}" ," ║ ".bright_cyan(), "       uPoW  ·  16 x 50240 x 16 integer matrix product          ".bright_black(), " ║".bright_cyan());
    println!("{}",   " ╠══════════════════════════════════════════════════════════════════╣".bright_cyan());
    println!("{}{}{}" ," ║ ".bright_cyan(), " Strategies   recompute (nonce) · reuse (filler)              ".white(), " ║".bright_cyan());
    println!("{}{}{}" ," ║ ".bright_cyan(), " Proof        BLAKE3 XOF matrices · BLAKE3 leading zero bits  ".white(), " ║".bright_cyan());
    println!("{}",   " ╚══════════════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

fn print_config(config: &Config) {
    let pad = "   ".bright_black();
    println!("{} {}", " * ".bright_green().bold(), "CONFIG".bright_white().bold());
    println!("{}  {:<12} {}", pad, "api".bright_black(), config.api.base_url.bright_white());
    println!("{}  {:<12} {}", pad, "rpc".bright_black(), config.api.rpc_url.bright_white());
    println!("{}  {:<12} {}", pad, "strategy".bright_black(), config.mining.strategy.bright_cyan());
    println!("{}  {:<12} {}", pad, "threads".bright_black(), config.threads().to_string().bright_magenta().bold());
    println!("{}  {:<12} {}", pad, "batch".bright_black(), config.mining.batch_size.to_string().bright_white());
    println!("{}  {:<12} {}", pad, "difficulty".bright_black(), match config.mining.difficulty {
        Some(bits) => format!("{} bits (override)", bits).bright_yellow(),
        None => "ledger".bright_white(),
    });
    if config.api.insecure_tls {
        println!("{}  {:<12} {}", pad, "tls".bright_black(), "verification DISABLED".bright_red().bold());
    }
    println!();
    println!("{}", "─────────────────────────────────────────────────────────────────".bright_black());
    println!();
}

fn print_summary(summary: &turbomul_engine::SessionSummary) {
    println!();
    println!("{} {}", " * ".bright_green().bold(), "SUMMARY".bright_white().bold());
    println!("    {:<12} {}", "accepted".bright_black(), summary.accepted.to_string().bright_green().bold());
    println!("    {:<12} {}", "rejected".bright_black(), summary.rejected.to_string().bright_red());
    println!("    {:<12} {}", "stale".bright_black(), summary.stale.to_string().bright_yellow());
    println!("    {:<12} {}", "found".bright_black(), summary.found);
    println!("    {:<12} {}", "attempts".bright_black(), stats::fmt_count(summary.attempts));
    println!("    {:<12} {} bits", "best".bright_black(), summary.best_score);
    println!("    {:<12} {}", "epochs".bright_black(), summary.epochs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "turbomul-miner",
            "--strategy", "reuse",
            "--threads", "3",
            "--difficulty", "18",
            "--insecure",
            "--debug",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.mining.strategy, "reuse");
        assert_eq!(config.mining.threads, 3);
        assert_eq!(config.mining.difficulty, Some(18));
        assert!(config.api.insecure_tls);
        assert_eq!(level_filter(&config), log::LevelFilter::Debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unset_flags_keep_file_values() {
        let cli = Cli::parse_from(["turbomul-miner"]);
        let mut config = Config::default();
        config.mining.batch_size = 32;
        config.mining.max_solutions = Some(5);
        cli.apply(&mut config);

        assert_eq!(config.mining.batch_size, 32);
        assert_eq!(config.mining.max_solutions, Some(5));
        assert_eq!(level_filter(&config), log::LevelFilter::Info);
    }

    #[test]
    fn test_quiet_wins_over_level() {
        let cli = Cli::parse_from(["turbomul-miner", "--quiet", "--debug"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(level_filter(&config), log::LevelFilter::Warn);
    }

    #[test]
    fn test_benchmark_flag() {
        let cli = Cli::parse_from(["turbomul-miner", "--benchmark", "5", "--once"]);
        assert_eq!(cli.benchmark, Some(5));
        assert!(cli.once);
    }
}
