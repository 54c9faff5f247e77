//! Row-major byte matrices
//!
//! A holds unsigned bytes, B holds signed bytes. The same wire byte means a
//! different number in each: `0xFF` is 255 in A and -1 in B. Reading B as
//! unsigned produces a checksum the validator rejects.

use crate::error::{EngineError, Result};

/// `rows x cols` unsigned 8-bit matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixA {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

/// `rows x cols` signed 8-bit matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixB {
    rows: usize,
    cols: usize,
    data: Vec<i8>,
}

impl MatrixA {
    pub fn new(rows: usize, cols: usize, data: Vec<u8>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(EngineError::InvalidInputLength {
                what: "matrix A",
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self> {
        Self::new(rows, cols, bytes.to_vec())
    }

    pub fn zeroed(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[u8] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn get(&self, i: usize, j: usize) -> u8 {
        self.data[i * self.cols + j]
    }

    /// Refill in place from a raw byte slice of the same size.
    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        self.data.copy_from_slice(bytes);
    }
}

impl MatrixB {
    pub fn new(rows: usize, cols: usize, data: Vec<i8>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(EngineError::InvalidInputLength {
                what: "matrix B",
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Reinterpret wire bytes as two's-complement values.
    pub fn from_bytes(rows: usize, cols: usize, bytes: &[u8]) -> Result<Self> {
        Self::new(rows, cols, bytes.iter().map(|&b| b as i8).collect())
    }

    pub fn zeroed(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.data
    }

    pub fn row(&self, k: usize) -> &[i8] {
        &self.data[k * self.cols..(k + 1) * self.cols]
    }

    pub fn get(&self, k: usize, j: usize) -> i8 {
        self.data[k * self.cols + j]
    }

    pub(crate) fn fill_from(&mut self, bytes: &[u8]) {
        for (dst, &src) in self.data.iter_mut().zip(bytes) {
            *dst = src as i8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_b_is_signed() {
        let b = MatrixB::from_bytes(1, 4, &[0x00, 0x7F, 0x80, 0xFF]).unwrap();
        assert_eq!(b.as_slice(), &[0, 127, -128, -1]);
        assert_eq!(b.get(0, 3), -1);
    }

    #[test]
    fn test_a_is_unsigned() {
        let a = MatrixA::from_bytes(1, 2, &[0x80, 0xFF]).unwrap();
        assert_eq!(a.get(0, 0), 128);
        assert_eq!(a.get(0, 1), 255);
    }

    #[test]
    fn test_row_major() {
        let a = MatrixA::from_bytes(2, 3, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(a.row(1), &[4, 5, 6]);
        assert_eq!(a.get(1, 0), 4);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(matches!(
            MatrixA::from_bytes(2, 2, &[0; 3]),
            Err(EngineError::InvalidInputLength { expected: 4, actual: 3, .. })
        ));
        assert!(MatrixB::from_bytes(3, 2, &[0; 7]).is_err());
    }
}
