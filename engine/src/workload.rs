//! Workload parsing
//!
//! The ledger serves either a bare 240-byte preamble or `seed || A || B`
//! with the matrices already expanded. Both forms describe the same work:
//! the matrices are a pure function of the preamble.

use log::{debug, warn};

use crate::derive::derive;
use crate::dims::Dimensions;
use crate::error::{EngineError, Result};
use crate::matrix::{MatrixA, MatrixB};
use crate::preamble::{Preamble, PREAMBLE_LEN};

#[derive(Debug, Clone)]
pub struct Workload {
    pub preamble: Preamble,
    pub matrices: Option<(MatrixA, MatrixB)>,
}

impl Workload {
    pub fn from_preamble(preamble: Preamble) -> Self {
        Self {
            preamble,
            matrices: None,
        }
    }

    /// Parse a workload response body.
    pub fn from_response(bytes: &[u8], dims: Dimensions) -> Result<Self> {
        if bytes.len() == PREAMBLE_LEN {
            return Ok(Self::from_preamble(Preamble::from_bytes(bytes)?));
        }

        let matrix_len = dims.xof_len();
        if bytes.len() < PREAMBLE_LEN + matrix_len {
            return Err(EngineError::InvalidInputLength {
                what: "workload",
                expected: PREAMBLE_LEN + matrix_len,
                actual: bytes.len(),
            });
        }

        let seed_len = bytes.len() - matrix_len;
        if seed_len > PREAMBLE_LEN {
            warn!(
                "Workload seed is {} bytes, using the first {}",
                seed_len, PREAMBLE_LEN
            );
        }
        let preamble = Preamble::from_bytes(&bytes[..PREAMBLE_LEN])?;

        let a_end = seed_len + dims.a_len();
        let a = MatrixA::from_bytes(dims.m, dims.k, &bytes[seed_len..a_end])?;
        let b = MatrixB::from_bytes(dims.k, dims.n, &bytes[a_end..])?;
        debug!(
            "Parsed workload: epoch {}, seed {} bytes, matrices {}x{} / {}x{}",
            preamble.epoch(),
            seed_len,
            dims.m,
            dims.k,
            dims.k,
            dims.n
        );

        Ok(Self {
            preamble,
            matrices: Some((a, b)),
        })
    }

    pub fn epoch(&self) -> u32 {
        self.preamble.epoch()
    }

    /// Server matrices when shipped, otherwise derived locally.
    pub fn matrices(&self, dims: Dimensions) -> Result<(MatrixA, MatrixB)> {
        match &self.matrices {
            Some((a, b)) => Ok((a.clone(), b.clone())),
            None => derive(&self.preamble.to_bytes(), dims),
        }
    }

    /// Whether shipped matrices match local derivation. `true` when none were shipped.
    pub fn verify_matrices(&self, dims: Dimensions) -> Result<bool> {
        let Some((a, b)) = &self.matrices else {
            return Ok(true);
        };
        let (da, db) = derive(&self.preamble.to_bytes(), dims)?;
        Ok(a == &da && b == &db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Dimensions::with_k(4)
    }

    fn preamble_bytes(epoch: u32) -> Vec<u8> {
        let mut p = Preamble::zeroed();
        p.epoch = epoch;
        p.to_bytes().to_vec()
    }

    fn response(seed: &[u8]) -> Vec<u8> {
        let (a, b) = derive(&seed[..PREAMBLE_LEN], dims()).unwrap();
        let mut body = seed.to_vec();
        body.extend_from_slice(a.as_slice());
        body.extend(b.as_slice().iter().map(|&x| x as u8));
        body
    }

    #[test]
    fn test_bare_preamble() {
        let w = Workload::from_response(&preamble_bytes(7), dims()).unwrap();
        assert_eq!(w.epoch(), 7);
        assert!(w.matrices.is_none());
        assert!(w.verify_matrices(dims()).unwrap());
    }

    #[test]
    fn test_with_matrices() {
        let body = response(&preamble_bytes(3));
        let w = Workload::from_response(&body, dims()).unwrap();
        assert_eq!(w.epoch(), 3);
        assert!(w.matrices.is_some());
        assert!(w.verify_matrices(dims()).unwrap());

        let derived = derive(&preamble_bytes(3), dims()).unwrap();
        assert_eq!(w.matrices(dims()).unwrap(), derived);
    }

    #[test]
    fn test_long_seed_truncated() {
        let mut seed = preamble_bytes(5);
        seed.extend_from_slice(&[0xEE; 16]);
        let body = response(&seed);
        let w = Workload::from_response(&body, dims()).unwrap();
        assert_eq!(w.preamble.to_bytes().to_vec(), preamble_bytes(5));
        assert!(w.verify_matrices(dims()).unwrap());
    }

    #[test]
    fn test_tampered_matrices_fail_verification() {
        let mut body = response(&preamble_bytes(1));
        body[PREAMBLE_LEN] ^= 0xFF;
        let w = Workload::from_response(&body, dims()).unwrap();
        assert!(!w.verify_matrices(dims()).unwrap());
    }

    #[test]
    fn test_short_bodies_rejected() {
        for len in [0, 100, 239, 241, PREAMBLE_LEN + dims().xof_len() - 1] {
            assert!(matches!(
                Workload::from_response(&vec![0u8; len], dims()),
                Err(EngineError::InvalidInputLength { .. })
            ));
        }
    }
}
