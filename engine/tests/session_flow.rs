/// Session state machine against an in-memory ledger
///
/// The mock ledger validates for real: it re-derives the matrices from the
/// submitted preamble and compares the checksum, so these tests exercise
/// the same contract the HTTP validator enforces.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use turbomul_engine::{
    derive, multiply, score, Dimensions, EngineError, LedgerClient, Preamble, Result,
    SearchConfig, Session, SessionConfig, SessionState, Solution, Strategy, SubmitReceipt,
    Validation, Workload,
};

fn toy() -> Dimensions {
    Dimensions::with_k(4)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct MockLedger {
    epoch: AtomicU32,
    diff_bits: u32,
    /// Errors handed out by the next fetches, front first.
    fetch_failures: Mutex<VecDeque<EngineError>>,
    /// Forced verdicts for the next validations, front first.
    verdicts: Mutex<VecDeque<Validation>>,
    /// Errors handed out by the next validations, ahead of any verdict.
    validate_failures: Mutex<VecDeque<EngineError>>,
    /// Move to the next epoch whenever a validation fails.
    advance_on_validate_failure: bool,
    advance_on_submit: bool,
    fetches: AtomicU64,
    validations: AtomicU64,
    validated: Mutex<Vec<Solution>>,
    submissions: Mutex<Vec<Solution>>,
}

impl MockLedger {
    fn new(diff_bits: u32) -> Self {
        Self {
            epoch: AtomicU32::new(1),
            diff_bits,
            fetch_failures: Mutex::new(VecDeque::new()),
            verdicts: Mutex::new(VecDeque::new()),
            validate_failures: Mutex::new(VecDeque::new()),
            advance_on_validate_failure: false,
            advance_on_submit: true,
            fetches: AtomicU64::new(0),
            validations: AtomicU64::new(0),
            validated: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    fn check(&self, solution: &Solution) -> Validation {
        let valid_math = match derive(solution.preamble(), toy()) {
            Ok((a, b)) => match multiply(&a, &b) {
                Ok(c) => c.to_le_bytes() == solution.checksum_bytes(),
                Err(_) => false,
            },
            Err(_) => false,
        };
        let current = Preamble::from_bytes(solution.preamble())
            .map(|p| p.epoch == self.epoch.load(Ordering::SeqCst))
            .unwrap_or(false);
        Validation {
            valid: valid_math && current && score(solution.as_bytes()) >= self.diff_bits,
            valid_math,
        }
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fetch_workload(&self) -> Result<Workload> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fetch_failures.lock().pop_front() {
            return Err(e);
        }
        let mut p = Preamble::zeroed();
        p.epoch = self.epoch.load(Ordering::SeqCst);
        Ok(Workload::from_preamble(p))
    }

    async fn fetch_difficulty(&self) -> Result<Option<u32>> {
        Ok(Some(self.diff_bits))
    }

    async fn validate(&self, solution: &Solution) -> Result<Validation> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.validated.lock().push(solution.clone());
        if let Some(e) = self.validate_failures.lock().pop_front() {
            if self.advance_on_validate_failure {
                self.epoch.fetch_add(1, Ordering::SeqCst);
            }
            return Err(e);
        }
        if let Some(v) = self.verdicts.lock().pop_front() {
            return Ok(v);
        }
        Ok(self.check(solution))
    }

    async fn submit(&self, solution: &Solution) -> Result<SubmitReceipt> {
        let accepted = self.check(solution).valid;
        self.submissions.lock().push(solution.clone());
        if accepted && self.advance_on_submit {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }
        Ok(SubmitReceipt {
            accepted,
            raw: serde_json::json!({ "error": if accepted { "ok" } else { "invalid" } }),
        })
    }

    async fn epoch_score(&self) -> Result<Option<serde_json::Value>> {
        Ok(Some(serde_json::json!({ "score": 1 })))
    }
}

fn config(strategy: Strategy, max_solutions: Option<u64>) -> SessionConfig {
    SessionConfig {
        strategy,
        dims: toy(),
        search: SearchConfig {
            workers: 2,
            batch_size: 8,
            attempt_budget: Some(4_096),
        },
        call_timeout: Duration::from_secs(5),
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        refresh_after_rounds: 2,
        solutions_per_epoch: 1,
        epoch_poll_interval: Duration::from_millis(1),
        max_solutions,
        verify_workload: true,
        difficulty_override: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// 1. Happy path
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_recompute_session_accepts_across_epochs() {
    init_logging();
    let ledger = MockLedger::new(3);
    let session = Session::new(config(Strategy::Recompute, Some(2))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;

    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected, 0);
    assert!(summary.epochs >= 2);
    assert!(!summary.cancelled);
    assert_eq!(session.state(), SessionState::Stopped);

    let submissions = ledger.submissions.lock();
    assert_eq!(submissions.len(), 2);
    let epochs: Vec<u32> = submissions
        .iter()
        .map(|s| Preamble::from_bytes(s.preamble()).unwrap().epoch)
        .collect();
    assert_eq!(epochs, vec![1, 2]);
}

#[tokio::test]
async fn test_reuse_session_submits_filler_solution() {
    init_logging();
    let ledger = MockLedger::new(3);
    let session = Session::new(config(Strategy::Reuse, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.accepted, 1);

    let submissions = ledger.submissions.lock();
    assert_eq!(submissions[0].filler().len(), turbomul_engine::search::FILLER_LEN);
}

// ═══════════════════════════════════════════════════════════════════════════
// 2. Failure handling
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_transient_fetch_failures_back_off_and_recover() {
    init_logging();
    let ledger = MockLedger::new(2);
    {
        let mut failures = ledger.fetch_failures.lock();
        for _ in 0..3 {
            failures.push_back(EngineError::transient("fetch_workload", "connection refused"));
        }
    }
    let session = Session::new(config(Strategy::Recompute, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.accepted, 1);
    assert!(ledger.fetches.load(Ordering::SeqCst) >= 4);
    assert!(session.snapshot().errors >= 3);
}

#[tokio::test]
async fn test_math_failure_is_discarded_and_search_resumes() {
    init_logging();
    let ledger = MockLedger::new(2);
    ledger.verdicts.lock().push_back(Validation {
        valid: false,
        valid_math: false,
    });
    let session = Session::new(config(Strategy::Recompute, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.accepted, 1);
    assert!(summary.found >= 2);
    assert!(ledger.validations.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_valid_math_only_counts_as_stale() {
    init_logging();
    let ledger = MockLedger::new(2);
    ledger.verdicts.lock().push_back(Validation {
        valid: false,
        valid_math: true,
    });
    let session = Session::new(config(Strategy::Recompute, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.stale, 1);
    assert_eq!(summary.accepted, 1);
    assert_eq!(ledger.submissions.lock().len(), 1);
}

#[tokio::test]
async fn test_validate_timeout_retries_same_solution() {
    init_logging();
    let ledger = MockLedger::new(3);
    ledger
        .validate_failures
        .lock()
        .push_back(EngineError::transient("validate", "timed out"));
    let session = Session::new(config(Strategy::Recompute, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rejected, 0);
    assert!(session.snapshot().errors >= 1);

    // The retained solution is validated again rather than searched anew.
    let validated = ledger.validated.lock();
    assert_eq!(validated.len(), 2);
    assert_eq!(validated[0], validated[1]);
    let submissions = ledger.submissions.lock();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0], validated[0]);
}

#[tokio::test]
async fn test_pending_solution_dropped_when_epoch_moves() {
    init_logging();
    let mut ledger = MockLedger::new(3);
    ledger.advance_on_validate_failure = true;
    ledger
        .validate_failures
        .lock()
        .push_back(EngineError::transient("validate", "connection reset"));
    let session = Session::new(config(Strategy::Recompute, Some(1))).unwrap();

    let summary = session.run(&ledger, CancellationToken::new()).await;
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.stale, 0);
    assert!(summary.epochs >= 2);

    let epoch_of = |s: &Solution| Preamble::from_bytes(s.preamble()).unwrap().epoch;
    let validated = ledger.validated.lock();
    assert_eq!(epoch_of(&validated[0]), 1);
    assert!(validated[1..].iter().all(|s| epoch_of(s) == 2));

    let submitted: Vec<u32> = ledger.submissions.lock().iter().map(epoch_of).collect();
    assert_eq!(submitted, vec![2]);
}

// ═══════════════════════════════════════════════════════════════════════════
// 3. Cancellation
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cancel_stops_unbounded_search() {
    init_logging();
    let ledger = MockLedger::new(0);
    let mut cfg = config(Strategy::Recompute, None);
    cfg.difficulty_override = Some(257);
    cfg.search.attempt_budget = None;
    let session = Session::new(cfg).unwrap();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), session.run(&ledger, token))
        .await
        .expect("session must honor cancellation");
    assert!(summary.cancelled);
    assert_eq!(summary.accepted, 0);
    assert!(summary.attempts > 0);
    assert!(ledger.submissions.lock().is_empty());
}
