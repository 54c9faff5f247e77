//! Parallel nonce search
//!
//! A [`Coordinator`] drives one [`AttemptSource`] across a fixed
//! [`WorkerPool`]. Workers claim sequence-number batches lazily from a shared
//! [`NonceSpace`], score each candidate and race to fill the epoch's found
//! slot in [`SearchState`]. The first accepted candidate wins; every other
//! worker stops at its next check.

mod coordinator;
mod nonce;
mod pool;
mod sources;
mod state;

pub use coordinator::Coordinator;
pub use nonce::NonceSpace;
pub use pool::WorkerPool;
pub use sources::{RecomputeScratch, RecomputeSource, ReuseScratch, ReuseSource, FILLER_LEN};
pub use state::SearchState;

use serde::{Deserialize, Serialize};

use crate::encoder::Solution;
use crate::error::Result;

/// Tuning for one coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Worker threads in the pool.
    pub workers: usize,
    /// Sequence numbers per claim.
    pub batch_size: u64,
    /// Total attempts per run; `None` searches until found or cancelled.
    pub attempt_budget: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            batch_size: 64,
            attempt_budget: Some(100_000),
        }
    }
}

/// How often a worker looks at the stop flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelGranularity {
    /// Before every attempt. For sources whose attempts cost milliseconds.
    PerAttempt,
    /// Between batches only. For sources whose attempts are a single hash.
    PerBatch,
}

/// Produces candidate solutions for sequence numbers.
///
/// Each worker owns one `Scratch`; `attempt` writes the candidate into it and
/// returns a view, so the hot loop does not allocate.
pub trait AttemptSource: Sync {
    type Scratch: Send;

    /// Per-worker buffers for a run seeded with `salt`.
    fn scratch(&self, salt: u64) -> Self::Scratch;

    /// Build the candidate for `seq`.
    fn attempt<'s>(&self, scratch: &'s mut Self::Scratch, seq: u64) -> Result<&'s [u8]>;

    /// Size of the trailing checksum region in every candidate.
    fn checksum_len(&self) -> usize;

    fn cancel_granularity(&self) -> CancelGranularity;
}

/// Winning candidate of an epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundSolution {
    pub solution: Solution,
    pub score: u32,
    pub seq: u64,
    pub worker: usize,
    pub epoch: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found(FoundSolution),
    Exhausted { best_score: u32, attempts: u64 },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SearchPhase {
    Idle = 0,
    Searching = 1,
    Found = 2,
    Exhausted = 3,
    Cancelled = 4,
}

impl SearchPhase {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => SearchPhase::Searching,
            2 => SearchPhase::Found,
            3 => SearchPhase::Exhausted,
            4 => SearchPhase::Cancelled,
            _ => SearchPhase::Idle,
        }
    }
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SearchPhase::Idle => "idle",
            SearchPhase::Searching => "searching",
            SearchPhase::Found => "found",
            SearchPhase::Exhausted => "exhausted",
            SearchPhase::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}
