//! Candidate generators for the two strategies

use crate::checksum::{multiply, multiply_parallel, Checksum};
use crate::derive::Deriver;
use crate::dims::Dimensions;
use crate::encoder::encode;
use crate::error::Result;
use crate::preamble::{Preamble, NONCE_LEN, PREAMBLE_LEN};
use crate::workload::Workload;

use super::{AttemptSource, CancelGranularity};

/// Filler written by [`ReuseSource`]: 8-byte salt LE then 8-byte sequence LE.
pub const FILLER_LEN: usize = 16;

/// Fresh nonce per attempt, so fresh matrices and a fresh product.
///
/// Nonce layout: `salt as u32` LE (4 bytes) then `seq` LE (8 bytes).
pub struct RecomputeSource {
    template: [u8; PREAMBLE_LEN],
    dims: Dimensions,
}

pub struct RecomputeScratch {
    salt: [u8; 4],
    preamble: [u8; PREAMBLE_LEN],
    deriver: Deriver,
    buf: Vec<u8>,
}

impl RecomputeSource {
    pub fn new(template: &Preamble, dims: Dimensions) -> Self {
        Self {
            template: template.to_bytes(),
            dims,
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn nonce(salt: u64, seq: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..4].copy_from_slice(&(salt as u32).to_le_bytes());
        nonce[4..].copy_from_slice(&seq.to_le_bytes());
        nonce
    }
}

impl AttemptSource for RecomputeSource {
    type Scratch = RecomputeScratch;

    fn scratch(&self, salt: u64) -> RecomputeScratch {
        RecomputeScratch {
            salt: (salt as u32).to_le_bytes(),
            preamble: self.template,
            deriver: Deriver::new(self.dims),
            buf: Vec::with_capacity(PREAMBLE_LEN + self.dims.checksum_len()),
        }
    }

    fn attempt<'s>(&self, scratch: &'s mut RecomputeScratch, seq: u64) -> Result<&'s [u8]> {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..4].copy_from_slice(&scratch.salt);
        nonce[4..].copy_from_slice(&seq.to_le_bytes());
        Preamble::write_nonce(&mut scratch.preamble, &nonce);

        let (a, b) = scratch.deriver.derive_into(&scratch.preamble)?;
        let checksum = multiply(a, b)?;

        scratch.buf.clear();
        scratch.buf.extend_from_slice(&scratch.preamble);
        checksum.write_le_bytes_into(&mut scratch.buf);
        Ok(&scratch.buf)
    }

    fn checksum_len(&self) -> usize {
        self.dims.checksum_len()
    }

    fn cancel_granularity(&self) -> CancelGranularity {
        CancelGranularity::PerAttempt
    }
}

/// One product per workload; each attempt rewrites the filler and rehashes.
///
/// Only valid while the validator ignores bytes between the preamble and
/// the checksum.
pub struct ReuseSource {
    base: Vec<u8>,
    checksum_len: usize,
}

pub struct ReuseScratch {
    buf: Vec<u8>,
}

const SALT_AT: usize = PREAMBLE_LEN;
const SEQ_AT: usize = PREAMBLE_LEN + 8;

impl ReuseSource {
    pub fn new(preamble: &[u8], checksum: &Checksum) -> Result<Self> {
        let base = encode(preamble, &[0u8; FILLER_LEN], &checksum.to_le_bytes())?;
        Ok(Self {
            checksum_len: base.checksum_bytes().len(),
            base: base.into_bytes(),
        })
    }

    /// Compute the workload's product once, across the rayon pool.
    pub fn from_workload(workload: &Workload, dims: Dimensions) -> Result<Self> {
        let (a, b) = workload.matrices(dims)?;
        let checksum = multiply_parallel(&a, &b)?;
        Self::new(&workload.preamble.to_bytes(), &checksum)
    }

    pub fn checksum_bytes(&self) -> &[u8] {
        &self.base[self.base.len() - self.checksum_len..]
    }
}

impl AttemptSource for ReuseSource {
    type Scratch = ReuseScratch;

    fn scratch(&self, salt: u64) -> ReuseScratch {
        let mut buf = self.base.clone();
        buf[SALT_AT..SEQ_AT].copy_from_slice(&salt.to_le_bytes());
        ReuseScratch { buf }
    }

    fn attempt<'s>(&self, scratch: &'s mut ReuseScratch, seq: u64) -> Result<&'s [u8]> {
        scratch.buf[SEQ_AT..SEQ_AT + 8].copy_from_slice(&seq.to_le_bytes());
        Ok(&scratch.buf)
    }

    fn checksum_len(&self) -> usize {
        self.checksum_len
    }

    fn cancel_granularity(&self) -> CancelGranularity {
        CancelGranularity::PerBatch
    }
}
