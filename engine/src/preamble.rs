//! 240-byte preamble

use crate::error::{EngineError, Result};

pub const PREAMBLE_LEN: usize = 240;
pub const NONCE_LEN: usize = 12;

const EPOCH: std::ops::Range<usize> = 0..4;
const SEGMENT_VR_HASH: std::ops::Range<usize> = 4..36;
const PK: std::ops::Range<usize> = 36..84;
const POP: std::ops::Range<usize> = 84..180;
const COMPUTOR: std::ops::Range<usize> = 180..228;
const NONCE: std::ops::Range<usize> = 228..240;

/// Fixed-layout workload header. Everything except `epoch` is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub epoch: u32,
    pub segment_vr_hash: [u8; 32],
    pub pk: [u8; 48],
    pub pop: [u8; 96],
    pub computor: [u8; 48],
    pub nonce: [u8; NONCE_LEN],
}

impl Preamble {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PREAMBLE_LEN {
            return Err(EngineError::InvalidInputLength {
                what: "preamble",
                expected: PREAMBLE_LEN,
                actual: bytes.len(),
            });
        }

        let mut p = Self::zeroed();
        p.epoch = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        p.segment_vr_hash.copy_from_slice(&bytes[SEGMENT_VR_HASH]);
        p.pk.copy_from_slice(&bytes[PK]);
        p.pop.copy_from_slice(&bytes[POP]);
        p.computor.copy_from_slice(&bytes[COMPUTOR]);
        p.nonce.copy_from_slice(&bytes[NONCE]);
        Ok(p)
    }

    /// All-zero preamble.
    pub fn zeroed() -> Self {
        Self {
            epoch: 0,
            segment_vr_hash: [0; 32],
            pk: [0; 48],
            pop: [0; 96],
            computor: [0; 48],
            nonce: [0; NONCE_LEN],
        }
    }

    pub fn to_bytes(&self) -> [u8; PREAMBLE_LEN] {
        let mut out = [0u8; PREAMBLE_LEN];
        out[EPOCH].copy_from_slice(&self.epoch.to_le_bytes());
        out[SEGMENT_VR_HASH].copy_from_slice(&self.segment_vr_hash);
        out[PK].copy_from_slice(&self.pk);
        out[POP].copy_from_slice(&self.pop);
        out[COMPUTOR].copy_from_slice(&self.computor);
        out[NONCE].copy_from_slice(&self.nonce);
        out
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Copy of this template with a different nonce.
    pub fn with_nonce(&self, nonce: [u8; NONCE_LEN]) -> Self {
        Self {
            nonce,
            ..self.clone()
        }
    }

    /// Overwrite the nonce field inside an already serialized preamble.
    pub fn write_nonce(buf: &mut [u8], nonce: &[u8; NONCE_LEN]) {
        buf[NONCE].copy_from_slice(nonce);
    }
}
