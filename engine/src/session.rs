//! Workload / session state machine
//!
//! ```text
//! Fetching ─→ Mining ─→ Validating ─→ Submitting ─→ Scoring ─┐
//!    ↑          │            │                               │
//!    │          └─ refresh ──┤ stale / math failure          │
//!    └───────────────────────┴───────────────────────────────┘
//!    any external failure ─→ ErrorBackoff ─→ Fetching
//! ```
//!
//! The ledger itself is behind [`LedgerClient`]; every call is bounded by
//! `call_timeout` and a timeout counts as a transient failure.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::difficulty::DEFAULT_DIFF_BITS;
use crate::dims::Dimensions;
use crate::encoder::{Solution, Strategy};
use crate::error::{EngineError, Result};
use crate::search::{
    Coordinator, FoundSolution, RecomputeSource, ReuseSource, SearchConfig, SearchOutcome,
    SearchPhase, SearchState,
};
use crate::workload::Workload;

/// Validator verdict on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Math correct and difficulty met for the current segment.
    pub valid: bool,
    /// Checksum matches the preamble's matrices.
    pub valid_math: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub accepted: bool,
    pub raw: serde_json::Value,
}

/// The ledger's HTTP surface, abstracted so the engine stays network-free.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_workload(&self) -> Result<Workload>;

    /// `Ok(None)` when the ledger does not report a difficulty.
    async fn fetch_difficulty(&self) -> Result<Option<u32>>;

    async fn validate(&self, solution: &Solution) -> Result<Validation>;

    async fn submit(&self, solution: &Solution) -> Result<SubmitReceipt>;

    async fn epoch_score(&self) -> Result<Option<serde_json::Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    Fetching = 0,
    Mining = 1,
    Validating = 2,
    Submitting = 3,
    Scoring = 4,
    ErrorBackoff = 5,
    Stopped = 6,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Mining,
            2 => SessionState::Validating,
            3 => SessionState::Submitting,
            4 => SessionState::Scoring,
            5 => SessionState::ErrorBackoff,
            6 => SessionState::Stopped,
            _ => SessionState::Fetching,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Fetching => "fetching",
            SessionState::Mining => "mining",
            SessionState::Validating => "validating",
            SessionState::Submitting => "submitting",
            SessionState::Scoring => "scoring",
            SessionState::ErrorBackoff => "backoff",
            SessionState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub strategy: Strategy,
    pub dims: Dimensions,
    pub search: SearchConfig,
    /// Upper bound on any single ledger call.
    pub call_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Exhausted search rounds before the workload is fetched again.
    pub refresh_after_rounds: u32,
    /// Accepted solutions to aim for before waiting on the next epoch.
    pub solutions_per_epoch: u32,
    pub epoch_poll_interval: Duration,
    /// Stop the session after this many accepted solutions.
    pub max_solutions: Option<u64>,
    /// Check shipped matrices against local derivation before mining.
    pub verify_workload: bool,
    pub difficulty_override: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Recompute,
            dims: Dimensions::AMADEUS,
            search: SearchConfig::default(),
            call_timeout: Duration::from_secs(60),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            refresh_after_rounds: 10,
            solutions_per_epoch: 1,
            epoch_poll_interval: Duration::from_secs(30),
            max_solutions: None,
            verify_workload: false,
            difficulty_override: None,
        }
    }
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub search_phase: Option<SearchPhase>,
    pub epoch: Option<u32>,
    pub difficulty: u32,
    pub attempts: u64,
    pub best_score: u32,
    pub hits: u64,
    pub found: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub stale: u64,
    pub errors: u64,
}

/// Totals returned when [`Session::run`] ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub stale: u64,
    pub found: u64,
    pub attempts: u64,
    pub best_score: u32,
    pub epochs: u64,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Counters {
    retired_attempts: AtomicU64,
    retired_hits: AtomicU64,
    best: AtomicU32,
    found: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    stale: AtomicU64,
    errors: AtomicU64,
    epochs: AtomicU64,
    difficulty: AtomicU32,
}

/// Search state of the epoch in flight plus how many of its solutions landed.
struct EpochContext {
    epoch: u32,
    state: Arc<SearchState>,
    accepted: u32,
}

enum MiningSource {
    Recompute(Arc<RecomputeSource>),
    Reuse(Arc<ReuseSource>),
}

/// What to do after a found solution went through the ledger.
enum Settled {
    Refetch,
    Backoff(EngineError),
}

pub struct Session {
    config: SessionConfig,
    coordinator: Arc<Coordinator>,
    stop: Arc<AtomicBool>,
    state: AtomicU8,
    current: RwLock<Option<Arc<SearchState>>>,
    counters: Counters,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let coordinator = Coordinator::new(config.search.clone())?;
        let counters = Counters::default();
        counters.difficulty.store(
            config.difficulty_override.unwrap_or(DEFAULT_DIFF_BITS),
            Ordering::Relaxed,
        );
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
            stop: Arc::new(AtomicBool::new(false)),
            state: AtomicU8::new(SessionState::Fetching as u8),
            current: RwLock::new(None),
            counters,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        let prev = self.state.swap(state as u8, Ordering::AcqRel);
        if prev != state as u8 {
            debug!("Session: {} → {}", SessionState::from_u8(prev), state);
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        // Held for the whole read; `retire` moves totals under the write lock.
        let current = self.current.read();
        let c = &self.counters;
        let (live_attempts, live_hits, live_best) = current
            .as_ref()
            .map(|s| (s.attempts(), s.hits(), s.best_score()))
            .unwrap_or((0, 0, 0));

        SessionSnapshot {
            state: self.state(),
            search_phase: current.as_ref().map(|s| s.phase()),
            epoch: current.as_ref().map(|s| s.epoch()),
            difficulty: c.difficulty.load(Ordering::Relaxed),
            attempts: c.retired_attempts.load(Ordering::Relaxed) + live_attempts,
            best_score: c.best.load(Ordering::Relaxed).max(live_best),
            hits: c.retired_hits.load(Ordering::Relaxed) + live_hits,
            found: c.found.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            stale: c.stale.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }

    /// Run until `cancel` fires or `max_solutions` are accepted.
    pub async fn run<C>(&self, client: &C, cancel: CancellationToken) -> SessionSummary
    where
        C: LedgerClient + ?Sized,
    {
        self.stop.store(false, Ordering::Release);
        let watcher = {
            let token = cancel.clone();
            let stop = self.stop.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                stop.store(true, Ordering::Release);
            })
        };

        let mut failures: u32 = 0;
        let mut epoch_ctx: Option<EpochContext> = None;

        info!(
            "Session started: strategy {}, {} workers, K = {}",
            self.config.strategy,
            self.coordinator.config().workers,
            self.config.dims.k
        );

        while !cancel.is_cancelled() && !self.quota_reached() {
            self.set_state(SessionState::Fetching);
            let (workload, diff_bits) = match self.fetch(client).await {
                Ok(fetched) => {
                    failures = 0;
                    fetched
                }
                Err(e) => {
                    self.backoff(&mut failures, e, &cancel).await;
                    continue;
                }
            };

            let epoch = workload.epoch();
            if let Some(ctx) = &epoch_ctx {
                if ctx.epoch != epoch {
                    let stale = EngineError::StaleWorkload {
                        in_use: ctx.epoch,
                        current: epoch,
                    };
                    info!("{}; discarding in-flight search", stale);
                    self.retire(ctx);
                    epoch_ctx = None;
                }
            }
            let ctx = epoch_ctx.get_or_insert_with(|| self.open_epoch(epoch));

            if ctx.accepted >= self.config.solutions_per_epoch.max(1) {
                debug!(
                    "Epoch {} quota reached ({} accepted); polling for the next epoch",
                    epoch, ctx.accepted
                );
                self.pause(self.config.epoch_poll_interval, &cancel).await;
                continue;
            }

            if self.config.verify_workload {
                match workload.verify_matrices(self.config.dims) {
                    Ok(true) => debug!("Workload matrices match local derivation"),
                    Ok(false) => {
                        error!("Server matrices disagree with local derivation for epoch {}", epoch);
                        self.backoff(
                            &mut failures,
                            EngineError::transient("verify_workload", "matrix mismatch"),
                            &cancel,
                        )
                        .await;
                        continue;
                    }
                    Err(e) => {
                        self.backoff(&mut failures, e, &cancel).await;
                        continue;
                    }
                }
            }

            self.set_state(SessionState::Mining);
            let source = match self.prepare_source(&workload).await {
                Ok(source) => source,
                Err(e) => {
                    self.backoff(&mut failures, e, &cancel).await;
                    continue;
                }
            };

            let rounds = self.config.refresh_after_rounds.max(1);
            for round in 1..=rounds {
                if cancel.is_cancelled() {
                    break;
                }
                let outcome = self.search(&source, diff_bits, ctx.state.clone()).await;
                match outcome {
                    Ok(SearchOutcome::Found(found)) => {
                        match self.settle(client, ctx, found).await {
                            Settled::Refetch => {}
                            Settled::Backoff(e) => self.backoff(&mut failures, e, &cancel).await,
                        }
                        break;
                    }
                    Ok(SearchOutcome::Exhausted { best_score, attempts }) => {
                        debug!(
                            "Round {}/{} exhausted: {} attempts, best {} / {} bits",
                            round, rounds, attempts, best_score, diff_bits
                        );
                    }
                    Ok(SearchOutcome::Cancelled) => break,
                    Err(e) => {
                        error!("Search failed: {}", e);
                        self.backoff(&mut failures, e, &cancel).await;
                        break;
                    }
                }
            }
        }

        watcher.abort();
        if let Some(ctx) = &epoch_ctx {
            self.retire(ctx);
        }
        self.set_state(SessionState::Stopped);

        let snap = self.snapshot();
        let summary = SessionSummary {
            accepted: snap.accepted,
            rejected: snap.rejected,
            stale: snap.stale,
            found: snap.found,
            attempts: snap.attempts,
            best_score: snap.best_score,
            epochs: self.counters.epochs.load(Ordering::Relaxed),
            cancelled: cancel.is_cancelled(),
        };
        info!(
            "Session stopped: {} accepted, {} rejected, {} stale, {} attempts",
            summary.accepted, summary.rejected, summary.stale, summary.attempts
        );
        summary
    }

    fn quota_reached(&self) -> bool {
        self.config
            .max_solutions
            .map(|max| self.counters.accepted.load(Ordering::Relaxed) >= max)
            .unwrap_or(false)
    }

    fn open_epoch(&self, epoch: u32) -> EpochContext {
        info!("Mining epoch {}", epoch);
        self.counters.epochs.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(SearchState::with_cancel(epoch, self.stop.clone()));
        *self.current.write() = Some(state.clone());
        EpochContext {
            epoch,
            state,
            accepted: 0,
        }
    }

    /// Fold a finished epoch's progress into the cumulative counters.
    ///
    /// Runs under the `current` write lock so a snapshot never sees the
    /// epoch both live and retired.
    fn retire(&self, ctx: &EpochContext) {
        let mut current = self.current.write();
        if current.as_ref().map(|s| Arc::ptr_eq(s, &ctx.state)).unwrap_or(false) {
            *current = None;
        }
        let c = &self.counters;
        c.retired_attempts.fetch_add(ctx.state.attempts(), Ordering::Relaxed);
        c.retired_hits.fetch_add(ctx.state.hits(), Ordering::Relaxed);
        c.best.fetch_max(ctx.state.best_score(), Ordering::Relaxed);
    }

    async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::transient(
                op,
                format!("timed out after {:?}", self.config.call_timeout),
            )),
        }
    }

    async fn fetch<C>(&self, client: &C) -> Result<(Workload, u32)>
    where
        C: LedgerClient + ?Sized,
    {
        let workload = self.call("fetch_workload", client.fetch_workload()).await?;

        let diff_bits = match self.config.difficulty_override {
            Some(d) => d,
            None => match self.call("fetch_difficulty", client.fetch_difficulty()).await {
                Ok(Some(d)) => d,
                Ok(None) => DEFAULT_DIFF_BITS,
                Err(e) => {
                    let last = self.counters.difficulty.load(Ordering::Relaxed);
                    warn!("Difficulty unavailable ({}), keeping {} bits", e, last);
                    last
                }
            },
        };
        self.counters.difficulty.store(diff_bits, Ordering::Relaxed);

        debug!("Fetched workload: epoch {}, diff {} bits", workload.epoch(), diff_bits);
        Ok((workload, diff_bits))
    }

    async fn prepare_source(&self, workload: &Workload) -> Result<MiningSource> {
        match self.config.strategy {
            Strategy::Recompute => Ok(MiningSource::Recompute(Arc::new(RecomputeSource::new(
                &workload.preamble,
                self.config.dims,
            )))),
            Strategy::Reuse => {
                let workload = workload.clone();
                let dims = self.config.dims;
                let source = tokio::task::spawn_blocking(move || ReuseSource::from_workload(&workload, dims))
                    .await
                    .map_err(|e| EngineError::WorkerPool(e.to_string()))??;
                Ok(MiningSource::Reuse(Arc::new(source)))
            }
        }
    }

    async fn search(
        &self,
        source: &MiningSource,
        diff_bits: u32,
        state: Arc<SearchState>,
    ) -> Result<SearchOutcome> {
        let coordinator = self.coordinator.clone();
        let handle = match source {
            MiningSource::Recompute(s) => {
                let s = s.clone();
                tokio::task::spawn_blocking(move || coordinator.run(s.as_ref(), diff_bits, &state))
            }
            MiningSource::Reuse(s) => {
                let s = s.clone();
                tokio::task::spawn_blocking(move || coordinator.run(s.as_ref(), diff_bits, &state))
            }
        };
        handle
            .await
            .map_err(|e| EngineError::WorkerPool(e.to_string()))?
    }

    /// Validate, submit and score a found solution.
    async fn settle<C>(&self, client: &C, ctx: &mut EpochContext, found: FoundSolution) -> Settled
    where
        C: LedgerClient + ?Sized,
    {
        self.counters.found.fetch_add(1, Ordering::Relaxed);
        info!(
            "Solution found: epoch {}, {} bits, seq {}, worker {}",
            found.epoch, found.score, found.seq, found.worker
        );

        self.set_state(SessionState::Validating);
        let verdict = match self.call("validate", client.validate(&found.solution)).await {
            Ok(v) => v,
            // The slot stays filled, so the next round retries this solution.
            Err(e) => return Settled::Backoff(e),
        };

        match verdict {
            Validation {
                valid: true,
                valid_math: true,
            } => {}
            Validation {
                valid_math: true, ..
            } => {
                warn!("Solution math ok but not valid (stale segment or difficulty miss); refetching");
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                ctx.state.discard_found();
                return Settled::Refetch;
            }
            _ => {
                error!(
                    "Validator rejected the checksum for epoch {}, seq {}",
                    found.epoch, found.seq
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                ctx.state.discard_found();
                return Settled::Refetch;
            }
        }

        self.set_state(SessionState::Submitting);
        let receipt = match self.call("submit", client.submit(&found.solution)).await {
            Ok(r) => r,
            Err(e) => return Settled::Backoff(e),
        };
        ctx.state.discard_found();

        if receipt.accepted {
            ctx.accepted += 1;
            let total = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
            info!("Solution accepted ({} total)", total);
        } else {
            warn!("Submission refused: {}", receipt.raw);
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Settled::Refetch;
        }

        self.set_state(SessionState::Scoring);
        match self.call("epoch_score", client.epoch_score()).await {
            Ok(Some(score)) => info!("Epoch score: {}", score),
            Ok(None) => {}
            Err(e) => warn!("Epoch score unavailable: {}", e),
        }
        Settled::Refetch
    }

    fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.config
            .backoff_base
            .saturating_mul(factor)
            .min(self.config.backoff_max)
    }

    async fn backoff(&self, failures: &mut u32, err: EngineError, cancel: &CancellationToken) {
        self.set_state(SessionState::ErrorBackoff);
        self.counters.errors.fetch_add(1, Ordering::Relaxed);
        let delay = self.backoff_delay(*failures);
        *failures = failures.saturating_add(1);
        if err.is_transient() {
            warn!("{} - retrying in {:?}", err, delay);
        } else {
            error!("{} - retrying in {:?}", err, delay);
        }
        self.pause(delay, cancel).await;
    }

    async fn pause(&self, delay: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {}
        }
    }
}
