//! Checksum (matrix C = A · B)
//!
//! Every term is at most 255 × 128 in magnitude and K = 50240 terms can sum
//! to about 1.6e9. That is exact in an integer accumulator and far outside
//! the 2^24 window where an f32 accumulator stays exact, so the product is
//! computed in i64 and truncated to i32 per cell. There is no float path.

use rayon::prelude::*;

use crate::error::{EngineError, Result};
use crate::matrix::{MatrixA, MatrixB};

/// `rows x cols` i32 result, serialized row-major little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    rows: usize,
    cols: usize,
    values: Vec<i32>,
}

impl Checksum {
    pub fn new(rows: usize, cols: usize, values: Vec<i32>) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(EngineError::InvalidInputLength {
                what: "checksum cells",
                expected: rows * cols,
                actual: values.len(),
            });
        }
        Ok(Self { rows, cols, values })
    }

    pub fn from_le_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != rows * cols * 4 {
            return Err(EngineError::InvalidInputLength {
                what: "checksum",
                expected: rows * cols * 4,
                actual: bytes.len(),
            });
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[i32] {
        &self.values
    }

    pub fn get(&self, i: usize, j: usize) -> i32 {
        self.values[i * self.cols + j]
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 4);
        self.write_le_bytes_into(&mut out);
        out
    }

    /// Append the serialized form to `out`.
    pub fn write_le_bytes_into(&self, out: &mut Vec<u8>) {
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

fn check_shapes(a: &MatrixA, b: &MatrixB) -> Result<()> {
    if a.cols() != b.rows() {
        return Err(EngineError::ShapeMismatch {
            a_rows: a.rows(),
            a_cols: a.cols(),
            b_rows: b.rows(),
            b_cols: b.cols(),
        });
    }
    Ok(())
}

/// One output row: `C[i][*] = Σ_k A[i][k] * B[k][*]`, i-k-j order so B is streamed row by row.
fn row_product(a: &MatrixA, b: &MatrixB, i: usize, out: &mut [i32]) {
    let n = b.cols();
    let mut acc = vec![0i64; n];
    for (k, &a_ik) in a.row(i).iter().enumerate() {
        if a_ik == 0 {
            continue;
        }
        let a_ik = a_ik as i64;
        for (cell, &b_kj) in acc.iter_mut().zip(b.row(k)) {
            *cell += a_ik * b_kj as i64;
        }
    }
    for (dst, v) in out.iter_mut().zip(acc) {
        *dst = v as i32;
    }
}

/// Exact integer product on the calling thread. Used inside search workers.
pub fn multiply(a: &MatrixA, b: &MatrixB) -> Result<Checksum> {
    check_shapes(a, b)?;
    let (m, n) = (a.rows(), b.cols());
    let mut values = vec![0i32; m * n];
    if n > 0 {
        for (i, row) in values.chunks_mut(n).enumerate() {
            row_product(a, b, i, row);
        }
    }
    Ok(Checksum { rows: m, cols: n, values })
}

/// Same product with output rows spread over the rayon pool.
///
/// For one-shot use (checksum-reuse setup, benchmarks). Search workers call
/// [`multiply`] because they already occupy every core.
pub fn multiply_parallel(a: &MatrixA, b: &MatrixB) -> Result<Checksum> {
    check_shapes(a, b)?;
    let (m, n) = (a.rows(), b.cols());
    let mut values = vec![0i32; m * n];
    if n > 0 {
        values
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, row)| row_product(a, b, i, row));
    }
    Ok(Checksum { rows: m, cols: n, values })
}
