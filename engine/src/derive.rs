//! Matrix derivation from the preamble
//!
//! BLAKE3 in extendable-output mode over the 240 preamble bytes. The first
//! `m*k` output bytes fill A row-major, the next `k*n` fill B row-major as
//! signed bytes. Identical preambles yield identical matrices on every
//! machine, so workers and the validator agree without shipping matrices.

use crate::dims::Dimensions;
use crate::error::{EngineError, Result};
use crate::matrix::{MatrixA, MatrixB};
use crate::preamble::PREAMBLE_LEN;

/// Derive `(A, B)` for `preamble` at the given shape.
pub fn derive(preamble: &[u8], dims: Dimensions) -> Result<(MatrixA, MatrixB)> {
    let mut deriver = Deriver::new(dims);
    deriver.derive_into(preamble)?;
    Ok(deriver.into_matrices())
}

/// Reusable derivation buffers for hot loops.
///
/// One instance per worker: the XOF buffer is 1.6 MB at production size and
/// must not be reallocated on every attempt.
pub struct Deriver {
    dims: Dimensions,
    xof: Vec<u8>,
    a: MatrixA,
    b: MatrixB,
}

impl Deriver {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            dims,
            xof: vec![0u8; dims.xof_len()],
            a: MatrixA::zeroed(dims.m, dims.k),
            b: MatrixB::zeroed(dims.k, dims.n),
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Regenerate the matrices for `preamble` into the internal buffers.
    pub fn derive_into(&mut self, preamble: &[u8]) -> Result<(&MatrixA, &MatrixB)> {
        if preamble.len() != PREAMBLE_LEN {
            return Err(EngineError::InvalidInputLength {
                what: "preamble",
                expected: PREAMBLE_LEN,
                actual: preamble.len(),
            });
        }

        let mut hasher = blake3::Hasher::new();
        hasher.update(preamble);
        hasher.finalize_xof().fill(&mut self.xof);

        let a_len = self.dims.a_len();
        self.a.fill_from(&self.xof[..a_len]);
        self.b.fill_from(&self.xof[a_len..]);
        Ok((&self.a, &self.b))
    }

    pub fn matrices(&self) -> (&MatrixA, &MatrixB) {
        (&self.a, &self.b)
    }

    pub fn into_matrices(self) -> (MatrixA, MatrixB) {
        (self.a, self.b)
    }
}
