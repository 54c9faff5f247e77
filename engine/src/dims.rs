//! Matrix dimensions

use serde::{Deserialize, Serialize};

/// Shape of the proof-of-work product: A is `m x k`, B is `k x n`, C is `m x n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

impl Dimensions {
    /// Production shape: A `[[u8; 50240]; 16]`, B `[[i8; 16]; 50240]`, C `[[i32; 16]; 16]`.
    pub const AMADEUS: Dimensions = Dimensions { m: 16, k: 50240, n: 16 };

    pub const fn new(m: usize, k: usize, n: usize) -> Self {
        Self { m, k, n }
    }

    /// Production M and N with a shortened inner dimension. Checksum size is unchanged.
    pub const fn with_k(k: usize) -> Self {
        Self { m: 16, k, n: 16 }
    }

    pub const fn a_len(&self) -> usize {
        self.m * self.k
    }

    pub const fn b_len(&self) -> usize {
        self.k * self.n
    }

    /// Bytes drawn from the XOF stream per derivation.
    pub const fn xof_len(&self) -> usize {
        self.a_len() + self.b_len()
    }

    /// Serialized checksum size (i32 little-endian per cell).
    pub const fn checksum_len(&self) -> usize {
        self.m * self.n * 4
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::AMADEUS
    }
}
