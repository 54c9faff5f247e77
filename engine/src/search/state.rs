//! Shared per-epoch search state

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{FoundSolution, SearchPhase};

/// Everything workers, the session and the stats panel share for one epoch.
///
/// The found slot is written at most once until [`discard_found`] reopens
/// it. Workers poll [`should_stop`] which reads two flags and never locks.
///
/// [`discard_found`]: SearchState::discard_found
/// [`should_stop`]: SearchState::should_stop
#[derive(Debug)]
pub struct SearchState {
    epoch: u32,
    found: Mutex<Option<FoundSolution>>,
    found_flag: AtomicBool,
    cancel: Arc<AtomicBool>,
    best: AtomicU32,
    attempts: AtomicU64,
    hits: AtomicU64,
    phase: AtomicU8,
}

impl SearchState {
    pub fn new(epoch: u32) -> Self {
        Self::with_cancel(epoch, Arc::new(AtomicBool::new(false)))
    }

    /// State wired to an externally owned cancel flag.
    pub fn with_cancel(epoch: u32, cancel: Arc<AtomicBool>) -> Self {
        Self {
            epoch,
            found: Mutex::new(None),
            found_flag: AtomicBool::new(false),
            cancel,
            best: AtomicU32::new(0),
            attempts: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            phase: AtomicU8::new(SearchPhase::Idle as u8),
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_found(&self) -> bool {
        self.found_flag.load(Ordering::Acquire)
    }

    pub fn should_stop(&self) -> bool {
        self.is_found() || self.is_cancelled()
    }

    /// Offer a winner. Returns `true` if this call filled the slot.
    pub fn try_record(&self, found: FoundSolution) -> bool {
        let mut slot = self.found.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(found);
        self.found_flag.store(true, Ordering::Release);
        true
    }

    pub fn found(&self) -> Option<FoundSolution> {
        self.found.lock().clone()
    }

    /// Empty the slot after the validator rejected its content.
    pub fn discard_found(&self) -> Option<FoundSolution> {
        let mut slot = self.found.lock();
        let old = slot.take();
        self.found_flag.store(false, Ordering::Release);
        self.set_phase(SearchPhase::Idle);
        old
    }

    /// Raise the best score seen; ties keep the incumbent.
    pub fn record_score(&self, score: u32) {
        self.best.fetch_max(score, Ordering::Relaxed);
    }

    pub fn best_score(&self) -> u32 {
        self.best.load(Ordering::Relaxed)
    }

    pub fn add_attempts(&self, n: u64) {
        if n > 0 {
            self.attempts.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Count a candidate that met the difficulty, whether or not it won the slot.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> SearchPhase {
        SearchPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: SearchPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;

    fn found(seq: u64) -> FoundSolution {
        FoundSolution {
            solution: encode(&[0u8; 240], &[], &[0u8; 4]).unwrap(),
            score: 3,
            seq,
            worker: 0,
            epoch: 1,
        }
    }

    #[test]
    fn test_first_writer_wins() {
        let state = SearchState::new(1);
        assert!(!state.should_stop());
        assert!(state.try_record(found(5)));
        assert!(!state.try_record(found(6)));
        assert!(state.should_stop());
        assert_eq!(state.found().unwrap().seq, 5);
    }

    #[test]
    fn test_discard_reopens_slot() {
        let state = SearchState::new(1);
        state.try_record(found(5));
        assert_eq!(state.discard_found().unwrap().seq, 5);
        assert!(!state.is_found());
        assert!(state.try_record(found(9)));
        assert_eq!(state.found().unwrap().seq, 9);
    }

    #[test]
    fn test_best_score_is_monotone() {
        let state = SearchState::new(1);
        for s in [3, 9, 4, 9, 1] {
            state.record_score(s);
        }
        assert_eq!(state.best_score(), 9);
    }

    #[test]
    fn test_external_cancel_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let state = SearchState::with_cancel(2, flag.clone());
        assert!(!state.is_cancelled());
        flag.store(true, Ordering::SeqCst);
        assert!(state.should_stop());
        assert_eq!(state.phase(), SearchPhase::Idle);
    }
}
