//! Difficulty scoring
//!
//! A candidate's score is the number of leading zero bits of its BLAKE3-256
//! digest, counted MSB-first across bytes in order.

/// Digest width; also the upper bound of any score.
pub const HASH_BITS: u32 = 256;

/// Used when the ledger does not report a difficulty.
pub const DEFAULT_DIFF_BITS: u32 = 20;

pub fn leading_zero_bits(bytes: &[u8]) -> u32 {
    let mut bits = 0;
    for &b in bytes {
        if b == 0 {
            bits += 8;
        } else {
            return bits + b.leading_zeros();
        }
    }
    bits
}

/// Leading zero bits of `blake3(candidate)`.
pub fn score(candidate: &[u8]) -> u32 {
    leading_zero_bits(blake3::hash(candidate).as_bytes())
}

pub fn accept(score: u32, diff_bits: u32) -> bool {
    score >= diff_bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_zero_bits() {
        assert_eq!(leading_zero_bits(&[0x00, 0x00, 0x0F]), 20);
        assert_eq!(leading_zero_bits(&[0xFF]), 0);
        assert_eq!(leading_zero_bits(&[0x01, 0x00]), 7);
        assert_eq!(leading_zero_bits(&[0x00; 5]), 40);
        assert_eq!(leading_zero_bits(&[]), 0);
    }

    #[test]
    fn test_score_bounds() {
        let s = score(b"turbomul");
        assert!(s <= HASH_BITS);
        assert_eq!(s, leading_zero_bits(blake3::hash(b"turbomul").as_bytes()));
    }

    #[test]
    fn test_accept_bounds() {
        for s in [0, 1, 20, 255, 256] {
            assert!(accept(s, 0));
            assert!(!accept(s, HASH_BITS + 1));
        }
        assert!(accept(20, 20));
        assert!(!accept(19, 20));
    }
}
