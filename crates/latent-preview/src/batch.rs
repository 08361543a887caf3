//! Batch item selection and grid layout

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Which batch items to preview and how to arrange them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Batch indices to decode, strictly increasing
    pub selected_indices: SmallVec<[usize; 8]>,
    /// Grid columns (at least 1)
    pub columns: usize,
}

impl BatchPlan {
    /// Number of selected items
    pub fn len(&self) -> usize {
        self.selected_indices.len()
    }

    /// Whether nothing was selected
    pub fn is_empty(&self) -> bool {
        self.selected_indices.is_empty()
    }

    /// Grid rows needed for the selection
    pub fn rows(&self) -> usize {
        self.len().div_ceil(self.columns)
    }

    /// Grid cell (column, row) of the n-th selected item
    pub fn cell(&self, n: usize) -> (usize, usize) {
        (n % self.columns, n / self.columns)
    }
}

/// Selects a bounded, representative subset of a generation batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSampler {
    max_batch: usize,
    max_batch_cols: usize,
    step_mode: bool,
}

impl BatchSampler {
    /// Create a sampler; zero limits are raised to one
    pub fn new(max_batch: usize, max_batch_cols: usize, step_mode: bool) -> Self {
        Self {
            max_batch: max_batch.max(1),
            max_batch_cols: max_batch_cols.max(1),
            step_mode,
        }
    }

    /// Plan the preview for a batch of `batch_size` items
    pub fn plan(&self, batch_size: usize) -> BatchPlan {
        let k = batch_size.min(self.max_batch);

        let selected_indices = if !self.step_mode || k <= 1 || k == batch_size {
            (0..k).collect()
        } else {
            // Evenly spread over 0..=N-1, rounded to nearest
            let span = batch_size - 1;
            let gaps = k - 1;
            (0..k).map(|i| (i * span + gaps / 2) / gaps).collect()
        };

        BatchPlan {
            selected_indices,
            columns: self.max_batch_cols.min(k).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(plan: &BatchPlan) -> Vec<usize> {
        plan.selected_indices.to_vec()
    }

    #[test]
    fn test_contiguous_prefix() {
        let plan = BatchSampler::new(4, 2, false).plan(10);
        assert_eq!(indices(&plan), vec![0, 1, 2, 3]);
        assert_eq!(plan.columns, 2);
        assert_eq!(plan.rows(), 2);
    }

    #[test]
    fn test_step_mode_spread() {
        let plan = BatchSampler::new(4, 2, true).plan(10);
        assert_eq!(indices(&plan), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_step_mode_uneven_spread() {
        let plan = BatchSampler::new(3, 3, true).plan(8);
        assert_eq!(indices(&plan), vec![0, 4, 7]);

        let plan = BatchSampler::new(4, 4, true).plan(5);
        assert_eq!(indices(&plan), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_step_mode_small_batch_is_prefix() {
        let plan = BatchSampler::new(4, 2, true).plan(3);
        assert_eq!(indices(&plan), vec![0, 1, 2]);

        let plan = BatchSampler::new(1, 2, true).plan(9);
        assert_eq!(indices(&plan), vec![0]);
        assert_eq!(plan.columns, 1);
    }

    #[test]
    fn test_empty_batch() {
        let plan = BatchSampler::new(4, 2, true).plan(0);
        assert!(plan.is_empty());
        assert_eq!(plan.columns, 1);
        assert_eq!(plan.rows(), 0);
    }

    #[test]
    fn test_columns_bounded_by_selection() {
        let plan = BatchSampler::new(8, 5, false).plan(3);
        assert_eq!(plan.columns, 3);
        assert_eq!(plan.rows(), 1);

        let plan = BatchSampler::new(8, 3, false).plan(7);
        assert_eq!(plan.columns, 3);
        assert_eq!(plan.rows(), 3);
        assert_eq!(plan.cell(0), (0, 0));
        assert_eq!(plan.cell(4), (1, 1));
        assert_eq!(plan.cell(6), (0, 2));
    }

    #[test]
    fn test_zero_limits_raised() {
        let plan = BatchSampler::new(0, 0, false).plan(5);
        assert_eq!(indices(&plan), vec![0]);
        assert_eq!(plan.columns, 1);
    }
}
