//! Configuration management for TurboMul miner
//!
//! JSON config file with per-field defaults; CLI flags override it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use turbomul_engine::{Dimensions, SearchConfig, SessionConfig, Strategy, HASH_BITS};

/// Miner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger endpoints
    #[serde(default)]
    pub api: ApiConfig,

    /// Search configuration
    #[serde(default)]
    pub mining: MiningConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Workload and validation API
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Chain RPC (stats, submission, epoch score)
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_stats_timeout")]
    pub stats_timeout_secs: u64,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure_tls: bool,

    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// recompute | reuse
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Worker threads (0 = auto)
    #[serde(default)]
    pub threads: usize,

    /// Nonces claimed per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Attempts per search round before the round reports exhaustion
    #[serde(default = "default_attempts_per_round")]
    pub attempts_per_round: u64,

    /// Exhausted rounds before the workload is refreshed
    #[serde(default = "default_refresh_rounds")]
    pub refresh_after_rounds: u32,

    #[serde(default = "default_solutions_per_epoch")]
    pub solutions_per_epoch: u32,

    /// Stop after this many accepted solutions
    pub max_solutions: Option<u64>,

    /// Difficulty override in bits (ledger value otherwise)
    pub difficulty: Option<u32>,

    /// Check server matrices against local derivation
    #[serde(default)]
    pub verify_workload: bool,

    #[serde(default = "default_epoch_poll")]
    pub epoch_poll_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Quiet mode
    #[serde(default)]
    pub quiet: bool,

    /// Stats panel refresh (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            rpc_url: default_rpc_url(),
            fetch_timeout_secs: default_fetch_timeout(),
            stats_timeout_secs: default_stats_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            insecure_tls: false,
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            threads: 0,
            batch_size: default_batch_size(),
            attempts_per_round: default_attempts_per_round(),
            refresh_after_rounds: default_refresh_rounds(),
            solutions_per_epoch: default_solutions_per_epoch(),
            max_solutions: None,
            difficulty: None,
            verify_workload: false,
            epoch_poll_secs: default_epoch_poll(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            no_color: false,
            quiet: false,
            stats_interval_secs: default_stats_interval(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;

        let config: Config = serde_json::from_str(&content)
            .context("Failed to parse config JSON")?;

        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;

        if let Some(dir) = path.as_ref().parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path.as_ref(), json)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Could not determine home directory")?;

        Ok(home.join(".turbomul").join("miner-config.json"))
    }

    /// Load config from default location
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;

        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn strategy(&self) -> Result<Strategy> {
        self.mining
            .strategy
            .parse::<Strategy>()
            .map_err(|e| anyhow::anyhow!(e))
    }

    /// Worker threads with 0 resolved to the core count
    pub fn threads(&self) -> usize {
        if self.mining.threads == 0 {
            num_cpus::get()
        } else {
            self.mining.threads
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [("api", &self.api.base_url), ("rpc", &self.api.rpc_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("{} URL must start with http:// or https:// (got '{}')", name, url);
            }
        }

        self.strategy()?;

        if self.mining.batch_size == 0 {
            anyhow::bail!("Batch size must be at least 1");
        }

        if self.mining.attempts_per_round == 0 {
            anyhow::bail!("Attempts per round must be at least 1");
        }

        if self.mining.solutions_per_epoch == 0 {
            anyhow::bail!("Solutions per epoch must be at least 1");
        }

        if let Some(bits) = self.mining.difficulty {
            if bits > HASH_BITS {
                anyhow::bail!("Difficulty must be between 0 and {} bits", HASH_BITS);
            }
        }

        if self.api.backoff_base_secs > self.api.backoff_max_secs {
            anyhow::bail!("Backoff base must not exceed backoff max");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}. Valid: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    /// Session parameters for the engine
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let call_timeout = self
            .api
            .fetch_timeout_secs
            .max(self.api.submit_timeout_secs)
            .max(self.api.stats_timeout_secs);

        Ok(SessionConfig {
            strategy: self.strategy()?,
            dims: Dimensions::AMADEUS,
            search: SearchConfig {
                workers: self.threads(),
                batch_size: self.mining.batch_size,
                attempt_budget: Some(self.mining.attempts_per_round),
            },
            // Per-request timeouts live in the HTTP client; this bounds the whole call.
            call_timeout: Duration::from_secs(call_timeout + 5),
            backoff_base: Duration::from_secs(self.api.backoff_base_secs),
            backoff_max: Duration::from_secs(self.api.backoff_max_secs),
            refresh_after_rounds: self.mining.refresh_after_rounds,
            solutions_per_epoch: self.mining.solutions_per_epoch,
            epoch_poll_interval: Duration::from_secs(self.mining.epoch_poll_secs),
            max_solutions: self.mining.max_solutions,
            verify_workload: self.mining.verify_workload,
            difficulty_override: self.mining.difficulty,
        })
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://testnet.ama.one".to_string()
}

fn default_rpc_url() -> String {
    "https://testnet-rpc.ama.one".to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_stats_timeout() -> u64 {
    10
}

fn default_submit_timeout() -> u64 {
    60
}

fn default_backoff_base() -> u64 {
    1
}

fn default_backoff_max() -> u64 {
    30
}

fn default_strategy() -> String {
    "recompute".to_string()
}

fn default_batch_size() -> u64 {
    16
}

fn default_attempts_per_round() -> u64 {
    20_000
}

fn default_refresh_rounds() -> u32 {
    5
}

fn default_solutions_per_epoch() -> u32 {
    1
}

fn default_epoch_poll() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    10
}
