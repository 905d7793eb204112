//! Working statistics of a leaf under consideration.
//!
//! Two of these exist at any time: one for the smaller child of the last
//! split and one for the larger. The smaller/larger asymmetry is what the
//! histogram subtraction trick keys off.

use rayon::prelude::*;

use crate::partition::DataPartition;

/// Chunk length for deterministic gradient sums: fixed boundaries make
/// the reduction independent of the thread count.
const SUM_CHUNK: usize = 2048;

/// Aggregate statistics for one leaf.
#[derive(Clone, Debug)]
pub struct LeafSplits {
    leaf_index: i32,
    num_data_in_leaf: u32,
    num_data: u32,
    sum_gradients: f64,
    sum_hessians: f64,
    /// True only for the full-dataset root: histogram construction can
    /// then skip the row index indirection entirely.
    covers_all_data: bool,
}

impl LeafSplits {
    pub fn new(num_data: usize) -> Self {
        Self {
            leaf_index: -1,
            num_data_in_leaf: 0,
            num_data: num_data as u32,
            sum_gradients: 0.0,
            sum_hessians: 0.0,
            covers_all_data: false,
        }
    }

    /// Dataset swap.
    pub fn reset_num_data(&mut self, num_data: usize) {
        self.num_data = num_data as u32;
    }

    /// Root initialisation over the full dataset.
    pub fn init_full(&mut self, gradients: &[f32], hessians: &[f32]) {
        let (sum_g, sum_h) = sum_pairs(gradients, hessians, None);
        self.leaf_index = 0;
        self.num_data_in_leaf = self.num_data;
        self.sum_gradients = sum_g;
        self.sum_hessians = sum_h;
        self.covers_all_data = true;
    }

    /// Root initialisation over a bagging subset held by the partition.
    pub fn init_from_partition(
        &mut self,
        leaf: usize,
        partition: &DataPartition,
        gradients: &[f32],
        hessians: &[f32],
    ) {
        let rows = partition.leaf_indices(leaf);
        let (sum_g, sum_h) = sum_pairs(gradients, hessians, Some(rows));
        self.leaf_index = leaf as i32;
        self.num_data_in_leaf = rows.len() as u32;
        self.sum_gradients = sum_g;
        self.sum_hessians = sum_h;
        self.covers_all_data = false;
    }

    /// Non-root initialisation with sums inherited from the parent split.
    pub fn init_with_sums(
        &mut self,
        leaf: usize,
        partition: &DataPartition,
        sum_gradients: f64,
        sum_hessians: f64,
    ) {
        self.leaf_index = leaf as i32;
        self.num_data_in_leaf = partition.leaf_count(leaf) as u32;
        self.sum_gradients = sum_gradients;
        self.sum_hessians = sum_hessians;
        self.covers_all_data = false;
    }

    /// Mark the slot unused.
    pub fn init_unused(&mut self) {
        self.leaf_index = -1;
        self.num_data_in_leaf = 0;
        self.sum_gradients = 0.0;
        self.sum_hessians = 0.0;
        self.covers_all_data = false;
    }

    #[inline]
    pub fn leaf_index(&self) -> i32 {
        self.leaf_index
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.leaf_index >= 0
    }

    #[inline]
    pub fn num_data_in_leaf(&self) -> u32 {
        self.num_data_in_leaf
    }

    #[inline]
    pub fn sum_gradients(&self) -> f64 {
        self.sum_gradients
    }

    #[inline]
    pub fn sum_hessians(&self) -> f64 {
        self.sum_hessians
    }

    #[inline]
    pub fn covers_all_data(&self) -> bool {
        self.covers_all_data
    }
}

/// Deterministic chunked sum of gradient/hessian pairs, optionally
/// indirected through row indices.
fn sum_pairs(gradients: &[f32], hessians: &[f32], rows: Option<&[u32]>) -> (f64, f64) {
    match rows {
        None => {
            let partials: Vec<(f64, f64)> = gradients
                .par_chunks(SUM_CHUNK)
                .zip(hessians.par_chunks(SUM_CHUNK))
                .map(|(gs, hs)| {
                    let mut g = 0.0f64;
                    let mut h = 0.0f64;
                    for i in 0..gs.len() {
                        g += gs[i] as f64;
                        h += hs[i] as f64;
                    }
                    (g, h)
                })
                .collect();
            partials
                .into_iter()
                .fold((0.0, 0.0), |(g, h), (pg, ph)| (g + pg, h + ph))
        }
        Some(rows) => {
            let partials: Vec<(f64, f64)> = rows
                .par_chunks(SUM_CHUNK)
                .map(|chunk| {
                    let mut g = 0.0f64;
                    let mut h = 0.0f64;
                    for &row in chunk {
                        g += gradients[row as usize] as f64;
                        h += hessians[row as usize] as f64;
                    }
                    (g, h)
                })
                .collect();
            partials
                .into_iter()
                .fold((0.0, 0.0), |(g, h), (pg, ph)| (g + pg, h + ph))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_init_sums_everything() {
        let grad = vec![1.0f32, -1.0, 2.0, -2.0];
        let hess = vec![1.0f32; 4];
        let mut splits = LeafSplits::new(4);
        splits.init_full(&grad, &hess);
        assert_eq!(splits.leaf_index(), 0);
        assert_eq!(splits.num_data_in_leaf(), 4);
        assert_eq!(splits.sum_gradients(), 0.0);
        assert_eq!(splits.sum_hessians(), 4.0);
        assert!(splits.covers_all_data());
    }

    #[test]
    fn partition_init_sums_subset() {
        let grad = vec![1.0f32, 10.0, 2.0, 20.0];
        let hess = vec![0.5f32, 5.0, 0.5, 5.0];
        let mut partition = DataPartition::new(4, 2);
        partition.set_used_indices(&[1, 3]);
        partition.init();
        let mut splits = LeafSplits::new(4);
        splits.init_from_partition(0, &partition, &grad, &hess);
        assert_eq!(splits.num_data_in_leaf(), 2);
        assert_eq!(splits.sum_gradients(), 30.0);
        assert_eq!(splits.sum_hessians(), 10.0);
        assert!(!splits.covers_all_data());
    }

    #[test]
    fn unused_slot() {
        let mut splits = LeafSplits::new(4);
        splits.init_full(&[1.0; 4], &[1.0; 4]);
        splits.init_unused();
        assert!(!splits.in_use());
        assert_eq!(splits.leaf_index(), -1);
    }

    #[test]
    fn chunked_sum_matches_sequential() {
        let n = 10_000;
        let grad: Vec<f32> = (0..n).map(|i| (i % 7) as f32 - 3.0).collect();
        let hess: Vec<f32> = (0..n).map(|i| (i % 3) as f32 + 1.0).collect();
        let (g, h) = sum_pairs(&grad, &hess, None);
        let g_seq: f64 = grad.iter().map(|&v| v as f64).sum();
        let h_seq: f64 = hess.iter().map(|&v| v as f64).sum();
        assert!((g - g_seq).abs() < 1e-9);
        assert!((h - h_seq).abs() < 1e-9);
    }
}
