//! Row partitioning across leaves.
//!
//! All row indices live in one contiguous buffer; each leaf owns a range.
//! Splitting a leaf partitions its range in place, with the left rows
//! staying under the original leaf id and the right rows moving to an
//! explicit new leaf id.
//!
//! The partition is stable: rows keep their relative order through every
//! split, so histogram accumulation order (and therefore float sums) is
//! independent of how the tree grew.

use crate::bitset::find_in_bitset;
use crate::data::Dataset;

/// Routing rule of one split, in bin space.
#[derive(Clone, Copy, Debug)]
pub enum SplitCondition<'a> {
    /// Bins `<= max_bin` go left.
    Numerical { max_bin: u32 },
    /// Bins present in the bitset go left.
    Categorical { bitset: &'a [u32] },
}

/// Per-leaf row index ranges over a shared buffer.
pub struct DataPartition {
    indices: Vec<u32>,
    left_scratch: Vec<u32>,
    right_scratch: Vec<u32>,
    leaf_begin: Vec<usize>,
    leaf_count: Vec<usize>,
    num_data: usize,
    num_leaves: usize,
    /// Preconfigured bagging subset; when set, `init` seeds leaf 0 with
    /// these rows instead of the full range.
    used_indices: Option<Vec<u32>>,
}

impl DataPartition {
    pub fn new(num_data: usize, num_leaves: usize) -> Self {
        Self {
            indices: Vec::with_capacity(num_data),
            left_scratch: Vec::new(),
            right_scratch: Vec::new(),
            leaf_begin: vec![0; num_leaves],
            leaf_count: vec![0; num_leaves],
            num_data,
            num_leaves,
            used_indices: None,
        }
    }

    /// Change the row count (dataset swap).
    pub fn reset_num_data(&mut self, num_data: usize) {
        self.num_data = num_data;
        self.used_indices = None;
    }

    /// Change the leaf capacity (config change).
    pub fn reset_leaves(&mut self, num_leaves: usize) {
        self.num_leaves = num_leaves;
        self.leaf_begin.resize(num_leaves, 0);
        self.leaf_count.resize(num_leaves, 0);
    }

    /// Preconfigure a bagging subset used by the next `init`.
    pub fn set_used_indices(&mut self, used: &[u32]) {
        self.used_indices = Some(used.to_vec());
    }

    /// Start a new tree: leaf 0 owns every (used) row.
    pub fn init(&mut self) {
        self.leaf_begin.fill(0);
        self.leaf_count.fill(0);
        match &self.used_indices {
            None => {
                self.indices.clear();
                self.indices.extend(0..self.num_data as u32);
            }
            Some(used) => {
                self.indices.clear();
                self.indices.extend_from_slice(used);
            }
        }
        self.leaf_count[0] = self.indices.len();
    }

    /// Rebuild leaf ranges from per-row leaf predictions (used when
    /// refitting an existing tree on new rows).
    pub fn reset_by_leaf_pred(&mut self, leaf_pred: &[i32], num_leaves: usize) {
        if num_leaves > self.num_leaves {
            self.reset_leaves(num_leaves);
        }
        self.leaf_begin.fill(0);
        self.leaf_count.fill(0);
        for &leaf in leaf_pred {
            self.leaf_count[leaf as usize] += 1;
        }
        let mut offset = 0usize;
        for leaf in 0..num_leaves {
            self.leaf_begin[leaf] = offset;
            offset += self.leaf_count[leaf];
        }
        let mut cursor = self.leaf_begin.clone();
        self.indices.resize(leaf_pred.len(), 0);
        for (row, &leaf) in leaf_pred.iter().enumerate() {
            let slot = &mut cursor[leaf as usize];
            self.indices[*slot] = row as u32;
            *slot += 1;
        }
        self.num_data = leaf_pred.len();
    }

    /// Rows currently owned by a leaf.
    #[inline]
    pub fn leaf_indices(&self, leaf: usize) -> &[u32] {
        let begin = self.leaf_begin[leaf];
        &self.indices[begin..begin + self.leaf_count[leaf]]
    }

    /// Row count of a leaf.
    #[inline]
    pub fn leaf_count(&self, leaf: usize) -> usize {
        self.leaf_count[leaf]
    }

    /// Leaf capacity.
    #[inline]
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Split `leaf`'s rows; left rows stay under `leaf`, right rows move
    /// to `right_leaf`.
    pub fn split(
        &mut self,
        leaf: usize,
        dataset: &Dataset,
        inner_feature: usize,
        condition: SplitCondition<'_>,
        default_left: bool,
        right_leaf: usize,
    ) {
        let begin = self.leaf_begin[leaf];
        let count = self.leaf_count[leaf];

        self.left_scratch.clear();
        self.right_scratch.clear();
        for &row in &self.indices[begin..begin + count] {
            let bin = dataset.bin(row as usize, inner_feature);
            let goes_left = if dataset.is_missing_bin(inner_feature, bin) {
                default_left
            } else {
                match condition {
                    SplitCondition::Numerical { max_bin } => bin <= max_bin,
                    SplitCondition::Categorical { bitset } => find_in_bitset(bitset, bin),
                }
            };
            if goes_left {
                self.left_scratch.push(row);
            } else {
                self.right_scratch.push(row);
            }
        }

        let left_count = self.left_scratch.len();
        let right_count = self.right_scratch.len();
        self.indices[begin..begin + left_count].copy_from_slice(&self.left_scratch);
        self.indices[begin + left_count..begin + count].copy_from_slice(&self.right_scratch);

        self.leaf_count[leaf] = left_count;
        self.leaf_begin[right_leaf] = begin + left_count;
        self.leaf_count[right_leaf] = right_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::construct_bitset;
    use crate::data::{BinMapper, DatasetBuilder, MissingType};

    fn make_dataset() -> Dataset {
        // Feature 0: bins [0,1,0,1,0,1,0,1]
        // Feature 1: bins [0,0,0,0,1,1,1,1]
        let mut builder = DatasetBuilder::new(16);
        builder.push_binned(
            vec![0, 1, 0, 1, 0, 1, 0, 1],
            BinMapper::numerical(vec![0.5, f64::INFINITY], MissingType::None, 0, 0),
        );
        builder.push_binned(
            vec![0, 0, 0, 0, 1, 1, 1, 1],
            BinMapper::numerical(vec![0.5, f64::INFINITY], MissingType::None, 0, 0),
        );
        builder.build().unwrap()
    }

    #[test]
    fn init_owns_all_rows() {
        let mut partition = DataPartition::new(8, 4);
        partition.init();
        assert_eq!(partition.leaf_count(0), 8);
        assert_eq!(partition.leaf_indices(0), (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn split_is_stable() {
        let dataset = make_dataset();
        let mut partition = DataPartition::new(8, 4);
        partition.init();

        partition.split(
            0,
            &dataset,
            0,
            SplitCondition::Numerical { max_bin: 0 },
            false,
            1,
        );
        assert_eq!(partition.leaf_count(0), 4);
        assert_eq!(partition.leaf_count(1), 4);
        // Relative order preserved on both sides.
        assert_eq!(partition.leaf_indices(0), &[0, 2, 4, 6]);
        assert_eq!(partition.leaf_indices(1), &[1, 3, 5, 7]);
    }

    #[test]
    fn nested_splits_partition_all_rows() {
        let dataset = make_dataset();
        let mut partition = DataPartition::new(8, 4);
        partition.init();

        partition.split(
            0,
            &dataset,
            1,
            SplitCondition::Numerical { max_bin: 0 },
            false,
            1,
        );
        partition.split(
            0,
            &dataset,
            0,
            SplitCondition::Numerical { max_bin: 0 },
            false,
            2,
        );
        let total: usize = (0..3).map(|l| partition.leaf_count(l)).sum();
        assert_eq!(total, 8);
        assert_eq!(partition.leaf_indices(0), &[0, 2]);
        assert_eq!(partition.leaf_indices(2), &[1, 3]);
        assert_eq!(partition.leaf_indices(1), &[4, 5, 6, 7]);
    }

    #[test]
    fn categorical_split_routes_by_bitset() {
        let mut builder = DatasetBuilder::new(16);
        builder.push_binned(
            vec![0, 1, 2, 3, 0, 1, 2, 3],
            BinMapper::categorical(vec![0, 1, 2, 3], MissingType::None, 0, 0),
        );
        let dataset = builder.build().unwrap();
        let mut partition = DataPartition::new(8, 4);
        partition.init();

        let bitset = construct_bitset(&[0, 2]);
        partition.split(
            0,
            &dataset,
            0,
            SplitCondition::Categorical { bitset: &bitset },
            false,
            1,
        );
        assert_eq!(partition.leaf_indices(0), &[0, 2, 4, 6]);
        assert_eq!(partition.leaf_indices(1), &[1, 3, 5, 7]);
    }

    #[test]
    fn reset_by_leaf_pred_groups_rows() {
        let mut partition = DataPartition::new(6, 4);
        partition.reset_by_leaf_pred(&[1, 0, 1, 2, 0, 1], 3);
        assert_eq!(partition.leaf_indices(0), &[1, 4]);
        assert_eq!(partition.leaf_indices(1), &[0, 2, 5]);
        assert_eq!(partition.leaf_indices(2), &[3]);
    }

    #[test]
    fn bagging_subset_limits_root() {
        let mut partition = DataPartition::new(8, 4);
        partition.set_used_indices(&[1, 3, 5]);
        partition.init();
        assert_eq!(partition.leaf_count(0), 3);
        assert_eq!(partition.leaf_indices(0), &[1, 3, 5]);
    }
}
