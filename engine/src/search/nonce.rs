//! Sequence-number space shared by the workers of one run

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lazily claimed batches of sequence numbers.
///
/// Batch `b` covers `[b * batch_size, (b + 1) * batch_size)`, cut at the
/// attempt budget. Claims are a single `fetch_add`, so no two workers ever
/// see the same sequence number within a run. The salt distinguishes runs.
#[derive(Debug)]
pub struct NonceSpace {
    next_batch: AtomicU64,
    batch_size: u64,
    budget: Option<u64>,
    salt: u64,
}

impl NonceSpace {
    /// Fresh space with a random salt.
    pub fn new(batch_size: u64, budget: Option<u64>) -> Self {
        Self::with_salt(batch_size, budget, rand::random())
    }

    pub fn with_salt(batch_size: u64, budget: Option<u64>, salt: u64) -> Self {
        Self {
            next_batch: AtomicU64::new(0),
            batch_size: batch_size.max(1),
            budget,
            salt,
        }
    }

    pub fn salt(&self) -> u64 {
        self.salt
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    /// Next unclaimed batch, or `None` once the budget is spent.
    pub fn claim(&self) -> Option<Range<u64>> {
        let b = self.next_batch.fetch_add(1, Ordering::Relaxed);
        let start = b.checked_mul(self.batch_size)?;
        let mut end = start.saturating_add(self.batch_size);
        if let Some(budget) = self.budget {
            if start >= budget {
                return None;
            }
            end = end.min(budget);
        }
        Some(start..end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_batches_are_contiguous_and_cut_at_budget() {
        let space = NonceSpace::with_salt(4, Some(10), 0);
        assert_eq!(space.claim(), Some(0..4));
        assert_eq!(space.claim(), Some(4..8));
        assert_eq!(space.claim(), Some(8..10));
        assert_eq!(space.claim(), None);
        assert_eq!(space.claim(), None);
    }

    #[test]
    fn test_unbounded() {
        let space = NonceSpace::with_salt(3, None, 0);
        for b in 0..100u64 {
            assert_eq!(space.claim(), Some(b * 3..b * 3 + 3));
        }
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let space = NonceSpace::with_salt(0, Some(2), 0);
        assert_eq!(space.claim(), Some(0..1));
        assert_eq!(space.claim(), Some(1..2));
        assert_eq!(space.claim(), None);
    }

    #[test]
    fn test_concurrent_claims_are_disjoint() {
        let space = Arc::new(NonceSpace::with_salt(7, Some(10_000), 0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let space = space.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(r) = space.claim() {
                        seen.extend(r);
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        let mut total = 0;
        for h in handles {
            let seen = h.join().unwrap();
            total += seen.len();
            all.extend(seen);
        }
        assert_eq!(total, 10_000);
        assert_eq!(all.len(), 10_000);
    }

    #[test]
    fn test_fresh_salt_per_space() {
        // Two random u64 salts colliding is a 2^-64 event.
        assert_ne!(NonceSpace::new(1, None).salt(), NonceSpace::new(1, None).salt());
    }
}
