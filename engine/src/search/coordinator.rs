//! Search coordinator

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, error};
use parking_lot::Mutex;

use crate::difficulty::{accept, score};
use crate::encoder::Solution;
use crate::error::{EngineError, Result};

use super::nonce::NonceSpace;
use super::pool::WorkerPool;
use super::state::SearchState;
use super::{AttemptSource, CancelGranularity, FoundSolution, SearchConfig, SearchOutcome, SearchPhase};

/// Owns the worker pool and runs searches on it, one at a time.
pub struct Coordinator {
    config: SearchConfig,
    pool: WorkerPool,
}

impl Coordinator {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.workers)?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search until a candidate scores at least `diff_bits`, the attempt
    /// budget runs out, or `state` is cancelled.
    ///
    /// A found slot already filled in `state` short-circuits to `Found`.
    pub fn run<S: AttemptSource>(
        &self,
        source: &S,
        diff_bits: u32,
        state: &SearchState,
    ) -> Result<SearchOutcome> {
        let space = NonceSpace::new(self.config.batch_size, self.config.attempt_budget);
        let halt = AtomicBool::new(false);
        let failure: Mutex<Option<EngineError>> = Mutex::new(None);
        let attempts_before = state.attempts();
        let start = Instant::now();

        state.set_phase(SearchPhase::Searching);
        debug!(
            "Search started: epoch {}, {} workers, batch {}, budget {:?}, diff {} bits",
            state.epoch(),
            self.pool.workers(),
            space.batch_size(),
            self.config.attempt_budget,
            diff_bits
        );

        self.pool.broadcast(|worker| {
            let ctx = WorkerContext {
                worker,
                source,
                diff_bits,
                state,
                space: &space,
                halt: &halt,
            };
            if let Err(e) = ctx.run() {
                error!("Worker {} failed: {}", worker, e);
                halt.store(true, Ordering::Release);
                failure.lock().get_or_insert(e);
            }
        });

        let attempts = state.attempts() - attempts_before;
        let elapsed = start.elapsed().as_secs_f64();
        debug!(
            "Search finished: {} attempts in {:.2}s ({:.1}/s), best {} bits",
            attempts,
            elapsed,
            if elapsed > 0.0 { attempts as f64 / elapsed } else { 0.0 },
            state.best_score()
        );

        if let Some(e) = failure.into_inner() {
            state.set_phase(SearchPhase::Idle);
            return Err(e);
        }

        let outcome = if let Some(found) = state.found() {
            state.set_phase(SearchPhase::Found);
            SearchOutcome::Found(found)
        } else if state.is_cancelled() {
            state.set_phase(SearchPhase::Cancelled);
            SearchOutcome::Cancelled
        } else {
            state.set_phase(SearchPhase::Exhausted);
            SearchOutcome::Exhausted {
                best_score: state.best_score(),
                attempts,
            }
        };
        Ok(outcome)
    }
}

struct WorkerContext<'a, S> {
    worker: usize,
    source: &'a S,
    diff_bits: u32,
    state: &'a SearchState,
    space: &'a NonceSpace,
    halt: &'a AtomicBool,
}

impl<S: AttemptSource> WorkerContext<'_, S> {
    fn stopped(&self) -> bool {
        self.state.should_stop() || self.halt.load(Ordering::Acquire)
    }

    fn run(&self) -> Result<()> {
        let mut scratch = self.source.scratch(self.space.salt());
        let per_attempt = self.source.cancel_granularity() == CancelGranularity::PerAttempt;
        let mut local_best = 0u32;

        while !self.stopped() {
            let Some(batch) = self.space.claim() else {
                break;
            };

            let mut done = 0u64;
            let mut finished = false;
            for seq in batch {
                if per_attempt && self.stopped() {
                    finished = true;
                    break;
                }

                let candidate = match self.source.attempt(&mut scratch, seq) {
                    Ok(c) => c,
                    Err(e) => {
                        self.state.add_attempts(done);
                        return Err(e);
                    }
                };
                let s = score(candidate);
                done += 1;

                if s > local_best {
                    local_best = s;
                    self.state.record_score(s);
                }

                if accept(s, self.diff_bits) {
                    self.state.record_hit();
                    let solution =
                        match Solution::from_bytes(candidate.to_vec(), self.source.checksum_len()) {
                            Ok(solution) => solution,
                            Err(e) => {
                                self.state.add_attempts(done);
                                return Err(e);
                            }
                        };
                    let won = self.state.try_record(FoundSolution {
                        solution,
                        score: s,
                        seq,
                        worker: self.worker,
                        epoch: self.state.epoch(),
                    });
                    if won {
                        debug!("Worker {} found seq {} with {} bits", self.worker, seq, s);
                    }
                    finished = true;
                    break;
                }
            }

            self.state.add_attempts(done);
            if finished {
                break;
            }
        }
        Ok(())
    }
}
