//! Solution encoding
//!
//! ```text
//! [preamble: 240][filler: 0..N][checksum: checksum_len]
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::preamble::PREAMBLE_LEN;

/// Concatenate the three regions of a candidate.
pub fn encode(preamble: &[u8], filler: &[u8], checksum: &[u8]) -> Result<Solution> {
    if preamble.len() != PREAMBLE_LEN {
        return Err(EngineError::InvalidInputLength {
            what: "preamble",
            expected: PREAMBLE_LEN,
            actual: preamble.len(),
        });
    }
    let mut bytes = Vec::with_capacity(PREAMBLE_LEN + filler.len() + checksum.len());
    bytes.extend_from_slice(preamble);
    bytes.extend_from_slice(filler);
    bytes.extend_from_slice(checksum);
    Ok(Solution {
        bytes,
        checksum_len: checksum.len(),
    })
}

/// Encoded candidate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    bytes: Vec<u8>,
    checksum_len: usize,
}

impl Solution {
    /// Wrap already encoded bytes whose trailing `checksum_len` bytes are the checksum.
    pub fn from_bytes(bytes: Vec<u8>, checksum_len: usize) -> Result<Self> {
        let min = PREAMBLE_LEN + checksum_len;
        if bytes.len() < min {
            return Err(EngineError::InvalidInputLength {
                what: "solution",
                expected: min,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes, checksum_len })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn preamble(&self) -> &[u8] {
        &self.bytes[..PREAMBLE_LEN]
    }

    pub fn filler(&self) -> &[u8] {
        &self.bytes[PREAMBLE_LEN..self.bytes.len() - self.checksum_len]
    }

    pub fn checksum_bytes(&self) -> &[u8] {
        &self.bytes[self.bytes.len() - self.checksum_len..]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// How candidates are produced each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fresh nonce, fresh matrices, fresh product per attempt.
    #[default]
    Recompute,
    /// One product per workload; only the filler varies.
    Reuse,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recompute" | "full" => Ok(Strategy::Recompute),
            "reuse" | "filler" | "hash-only" => Ok(Strategy::Reuse),
            other => Err(format!(
                "unknown strategy '{}' (expected recompute|full or reuse|filler|hash-only)",
                other
            )),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Recompute => write!(f, "recompute"),
            Strategy::Reuse => write!(f, "reuse"),
        }
    }
}
