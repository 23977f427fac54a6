// ============================================================
// Layer 4 — Overfit Subset Sampler
// ============================================================
// Draws the small train subset that is re-scored every epoch
// alongside the validation set, to watch for overfitting.
//
//   k distinct indices from 0..len, without replacement
//   k >= len → every index, in order
//
// Seeded with StdRng so the same seed always draws the same
// subset.
//
// Reference: rand crate documentation (seq::index::sample)

use rand::{rngs::StdRng, seq::index, SeedableRng};

/// Number of training examples scored as the overfit monitor.
pub const OVERFIT_SUBSET_SIZE: usize = 5;

pub fn sample_subset_indices(len: usize, k: usize, seed: u64) -> Vec<usize> {
    if k >= len {
        return (0..len).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let indices = index::sample(&mut rng, len, k).into_vec();

    tracing::debug!("Drew overfit subset of {} from {} examples", indices.len(), len);
    indices
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_subset_is_distinct_and_in_range() {
        let idx = sample_subset_indices(100, OVERFIT_SUBSET_SIZE, 7);
        assert_eq!(idx.len(), 5);
        assert!(idx.iter().all(|&i| i < 100));
        assert_eq!(idx.iter().collect::<HashSet<_>>().len(), 5);
    }

    #[test]
    fn test_same_seed_same_subset() {
        assert_eq!(sample_subset_indices(64, 5, 42), sample_subset_indices(64, 5, 42));
    }

    #[test]
    fn test_small_dataset_uses_everything() {
        assert_eq!(sample_subset_indices(3, 5, 1), vec![0, 1, 2]);
        assert!(sample_subset_indices(0, 5, 1).is_empty());
    }
}
