//! # TurboMul Engine - uPoW search core
//!
//! Finds a byte string that satisfies the ledger's matrix-multiplication
//! proof of work: the solution embeds the exact product of two matrices
//! derived from its own preamble, and its BLAKE3 hash must carry at least
//! `diff_bits` leading zero bits.
//!
//! ## Architecture
//!
//! ```text
//! Workload → Preamble ─┬─→ [derive: BLAKE3 XOF] → A (u8), B (i8)
//!                      │                              ↓
//!                      │                     [checksum: A·B, i64 acc]
//!                      ↓                              ↓
//!              [encoder: preamble ‖ filler ‖ checksum] → [difficulty]
//!                                   ↑                        ↓
//!                        [search: worker pool, nonce space, found slot]
//!                                   ↑                        ↓
//!                         [session: fetch → mine → validate → submit]
//! ```
//!
//! ## Solution layout
//!
//! ```text
//! [preamble: 240 bytes][filler: 0..N bytes][checksum: 1024 bytes]
//! ```
//!
//! The validator reads the first 240 and the last 1024 bytes only. The reuse
//! strategy relies on that to vary the filler without recomputing the
//! product; this is a property of the current validator, not of the protocol.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turbomul_engine::{Coordinator, Dimensions, RecomputeSource, SearchConfig, SearchState};
//!
//! let source = RecomputeSource::new(template, Dimensions::AMADEUS);
//! let coordinator = Coordinator::new(SearchConfig::default())?;
//! let state = SearchState::new(template.epoch());
//! let outcome = coordinator.run(&source, 20, &state)?;
//! ```

pub mod checksum;
pub mod derive;
pub mod difficulty;
pub mod dims;
pub mod encoder;
pub mod error;
pub mod matrix;
pub mod preamble;
pub mod search;
pub mod session;
pub mod workload;

pub use checksum::{multiply, multiply_parallel, Checksum};
pub use derive::{derive, Deriver};
pub use difficulty::{accept, leading_zero_bits, score, DEFAULT_DIFF_BITS, HASH_BITS};
pub use dims::Dimensions;
pub use encoder::{encode, Solution, Strategy};
pub use error::{EngineError, Result};
pub use matrix::{MatrixA, MatrixB};
pub use preamble::{Preamble, NONCE_LEN, PREAMBLE_LEN};
pub use search::{
    CancelGranularity, AttemptSource, Coordinator, FoundSolution, RecomputeSource,
    ReuseSource, SearchConfig, SearchOutcome, SearchPhase, SearchState, WorkerPool,
};
pub use session::{
    LedgerClient, Session, SessionConfig, SessionSnapshot, SessionState, SessionSummary,
    SubmitReceipt, Validation,
};
pub use workload::Workload;
