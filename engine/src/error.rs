//! Engine error taxonomy

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed preamble, workload body or matrix buffer.
    #[error("invalid input length for {what}: expected {expected} bytes, got {actual}")]
    InvalidInputLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Matrix shapes that cannot be multiplied. A caller bug, not a runtime condition.
    #[error("shape mismatch: A is {a_rows}x{a_cols}, B is {b_rows}x{b_cols}")]
    ShapeMismatch {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },

    /// Workload fetch, validation or submission failed or timed out.
    #[error("transient I/O failure during {op}: {reason}")]
    TransientIo { op: &'static str, reason: String },

    /// The ledger epoch moved on underneath an in-flight search.
    #[error("stale workload: searching epoch {in_use}, ledger is at epoch {current}")]
    StaleWorkload { in_use: u32, current: u32 },

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl EngineError {
    pub fn transient(op: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::TransientIo {
            op,
            reason: reason.to_string(),
        }
    }

    /// Whether the session should back off and retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }
}
