//! Growable decision tree.
//!
//! Leaf ids are shared with the row partition: splitting leaf `l` keeps
//! the left child under id `l` and assigns the right child the next free
//! leaf id (`next_leaf_id`). Internal nodes are numbered in split order,
//! so a tree with `k` leaves has `k - 1` internal nodes and node 0 is the
//! root whenever at least one split was made.

use crate::bitset::find_in_bitset;
use crate::data::MissingType;

/// Decision rule of one internal node.
#[derive(Clone, Debug)]
enum Decision {
    Numerical {
        missing_type: MissingType,
        default_left: bool,
    },
    Categorical {
        /// Index into the categorical bitset tables.
        cat_idx: usize,
    },
}

/// A decision tree under construction or ready for scoring.
#[derive(Clone, Debug)]
pub struct Tree {
    num_leaves: usize,
    // Internal node arrays, indexed by node id. Child entries >= 0 point
    // to internal nodes; entries < 0 encode leaf ids as `!leaf`.
    left_child: Vec<i32>,
    right_child: Vec<i32>,
    split_feature_inner: Vec<i32>,
    split_feature: Vec<i32>,
    threshold_in_bin: Vec<u32>,
    threshold: Vec<f64>,
    split_gain: Vec<f64>,
    decision: Vec<Decision>,
    // Leaf arrays, indexed by leaf id.
    leaf_parent: Vec<i32>,
    leaf_value: Vec<f64>,
    leaf_count: Vec<u32>,
    leaf_depth: Vec<u32>,
    // Categorical bitsets, bin space and raw category space.
    cat_bitsets_inner: Vec<Vec<u32>>,
    cat_bitsets: Vec<Vec<u32>>,
    shrinkage: f64,
}

impl Tree {
    /// A single-leaf tree with capacity for `max_leaves` leaves.
    pub fn new(max_leaves: usize) -> Self {
        let n_nodes = max_leaves.saturating_sub(1);
        Self {
            num_leaves: 1,
            left_child: vec![0; n_nodes],
            right_child: vec![0; n_nodes],
            split_feature_inner: vec![-1; n_nodes],
            split_feature: vec![-1; n_nodes],
            threshold_in_bin: vec![0; n_nodes],
            threshold: vec![0.0; n_nodes],
            split_gain: vec![0.0; n_nodes],
            decision: Vec::with_capacity(n_nodes),
            leaf_parent: vec![-1; max_leaves],
            leaf_value: vec![0.0; max_leaves],
            leaf_count: vec![0; max_leaves],
            leaf_depth: vec![0; max_leaves],
            cat_bitsets_inner: Vec::new(),
            cat_bitsets: Vec::new(),
            shrinkage: 1.0,
        }
    }

    #[inline]
    pub fn num_leaves(&self) -> usize {
        self.num_leaves
    }

    /// Leaf id the next split's right child will receive.
    #[inline]
    pub fn next_leaf_id(&self) -> usize {
        self.num_leaves
    }

    #[inline]
    pub fn leaf_depth(&self, leaf: usize) -> u32 {
        self.leaf_depth[leaf]
    }

    #[inline]
    pub fn leaf_output(&self, leaf: usize) -> f64 {
        self.leaf_value[leaf]
    }

    #[inline]
    pub fn set_leaf_output(&mut self, leaf: usize, value: f64) {
        self.leaf_value[leaf] = value;
    }

    #[inline]
    pub fn leaf_count(&self, leaf: usize) -> u32 {
        self.leaf_count[leaf]
    }

    #[inline]
    pub fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    /// Scale all leaf outputs by the learning rate.
    pub fn shrink(&mut self, rate: f64) {
        for value in &mut self.leaf_value[..self.num_leaves] {
            *value *= rate;
        }
        self.shrinkage *= rate;
    }

    /// Real feature a node splits on (for inspection).
    #[inline]
    pub fn split_feature(&self, node: usize) -> i32 {
        self.split_feature[node]
    }

    /// Bin threshold a node splits at (numerical nodes).
    #[inline]
    pub fn split_threshold_bin(&self, node: usize) -> u32 {
        self.threshold_in_bin[node]
    }

    /// Raw threshold a node splits at (numerical nodes).
    #[inline]
    pub fn split_threshold(&self, node: usize) -> f64 {
        self.threshold[node]
    }

    /// Recorded gain of a node's split.
    #[inline]
    pub fn split_gain(&self, node: usize) -> f64 {
        self.split_gain[node]
    }

    /// Perform a numerical split of `leaf`; returns the right child's
    /// leaf id.
    #[allow(clippy::too_many_arguments)]
    pub fn split(
        &mut self,
        leaf: usize,
        inner_feature: usize,
        real_feature: usize,
        threshold_bin: u32,
        threshold_real: f64,
        left_output: f64,
        right_output: f64,
        left_count: u32,
        right_count: u32,
        gain: f64,
        missing_type: MissingType,
        default_left: bool,
    ) -> usize {
        let node = self.register_split(leaf, inner_feature, real_feature, gain);
        self.threshold_in_bin[node] = threshold_bin;
        self.threshold[node] = threshold_real;
        self.decision.push(Decision::Numerical {
            missing_type,
            default_left,
        });
        self.finish_split(leaf, left_output, right_output, left_count, right_count)
    }

    /// Perform a categorical split of `leaf`; `bitset_inner` is in bin
    /// space (used by training), `bitset` in raw category space (used by
    /// scoring). Returns the right child's leaf id.
    #[allow(clippy::too_many_arguments)]
    pub fn split_categorical(
        &mut self,
        leaf: usize,
        inner_feature: usize,
        real_feature: usize,
        bitset_inner: Vec<u32>,
        bitset: Vec<u32>,
        left_output: f64,
        right_output: f64,
        left_count: u32,
        right_count: u32,
        gain: f64,
    ) -> usize {
        self.register_split(leaf, inner_feature, real_feature, gain);
        let cat_idx = self.cat_bitsets.len();
        self.cat_bitsets_inner.push(bitset_inner);
        self.cat_bitsets.push(bitset);
        self.decision.push(Decision::Categorical { cat_idx });
        self.finish_split(leaf, left_output, right_output, left_count, right_count)
    }

    fn register_split(
        &mut self,
        leaf: usize,
        inner_feature: usize,
        real_feature: usize,
        gain: f64,
    ) -> usize {
        let node = self.num_leaves - 1;
        let parent = self.leaf_parent[leaf];
        if parent >= 0 {
            let parent = parent as usize;
            if self.left_child[parent] == !(leaf as i32) {
                self.left_child[parent] = node as i32;
            } else {
                self.right_child[parent] = node as i32;
            }
        }
        self.split_feature_inner[node] = inner_feature as i32;
        self.split_feature[node] = real_feature as i32;
        self.split_gain[node] = gain;
        node
    }

    fn finish_split(
        &mut self,
        leaf: usize,
        left_output: f64,
        right_output: f64,
        left_count: u32,
        right_count: u32,
    ) -> usize {
        let node = self.num_leaves - 1;
        let right_leaf = self.num_leaves;

        self.left_child[node] = !(leaf as i32);
        self.right_child[node] = !(right_leaf as i32);
        self.leaf_parent[leaf] = node as i32;
        self.leaf_parent[right_leaf] = node as i32;
        self.leaf_value[leaf] = left_output;
        self.leaf_value[right_leaf] = right_output;
        self.leaf_count[leaf] = left_count;
        self.leaf_count[right_leaf] = right_count;
        self.leaf_depth[right_leaf] = self.leaf_depth[leaf] + 1;
        self.leaf_depth[leaf] += 1;

        self.num_leaves += 1;
        right_leaf
    }

    /// Leaf a feature row lands in.
    pub fn predict_leaf(&self, features: &[f64]) -> usize {
        if self.num_leaves == 1 {
            return 0;
        }
        let mut node = 0i32;
        loop {
            let idx = node as usize;
            let go_left = match &self.decision[idx] {
                Decision::Numerical {
                    missing_type,
                    default_left,
                } => {
                    let value = features[self.split_feature[idx] as usize];
                    let missing = match missing_type {
                        MissingType::None => false,
                        MissingType::Zero => value == 0.0 || value.is_nan(),
                        MissingType::NaN => value.is_nan(),
                    };
                    if missing {
                        *default_left
                    } else {
                        let value = if value.is_nan() { 0.0 } else { value };
                        value <= self.threshold[idx]
                    }
                }
                Decision::Categorical { cat_idx } => {
                    let value = features[self.split_feature[idx] as usize];
                    if value.is_nan() {
                        false
                    } else {
                        find_in_bitset(&self.cat_bitsets[*cat_idx], value as u32)
                    }
                }
            };
            let next = if go_left {
                self.left_child[idx]
            } else {
                self.right_child[idx]
            };
            if next < 0 {
                return !next as usize;
            }
            node = next;
        }
    }

    /// Score one row.
    #[inline]
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        self.leaf_value[self.predict_leaf(features)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::construct_bitset;

    #[test]
    fn single_leaf_tree() {
        let tree = Tree::new(8);
        assert_eq!(tree.num_leaves(), 1);
        assert_eq!(tree.predict_row(&[1.0]), 0.0);
    }

    #[test]
    fn split_reuses_leaf_id_for_left_child() {
        let mut tree = Tree::new(4);
        let right = tree.split(
            0,
            0,
            0,
            1,
            1.5,
            -1.0,
            1.0,
            4,
            4,
            8.0,
            MissingType::None,
            false,
        );
        assert_eq!(right, 1);
        assert_eq!(tree.num_leaves(), 2);
        assert_eq!(tree.next_leaf_id(), 2);
        assert_eq!(tree.leaf_depth(0), 1);
        assert_eq!(tree.leaf_depth(1), 1);
        assert_eq!(tree.predict_row(&[1.0]), -1.0);
        assert_eq!(tree.predict_row(&[2.0]), 1.0);
    }

    #[test]
    fn nested_splits_route_through_parent() {
        let mut tree = Tree::new(4);
        tree.split(0, 0, 0, 0, 0.5, 0.0, 2.0, 4, 4, 1.0, MissingType::None, false);
        // Split the left child (leaf 0) again on feature 1.
        let right = tree.split(0, 1, 1, 0, 10.0, -3.0, -1.0, 2, 2, 1.0, MissingType::None, false);
        assert_eq!(right, 2);
        assert_eq!(tree.leaf_depth(0), 2);
        assert_eq!(tree.leaf_depth(2), 2);
        assert_eq!(tree.leaf_depth(1), 1);
        assert_eq!(tree.predict_row(&[0.4, 5.0]), -3.0);
        assert_eq!(tree.predict_row(&[0.4, 15.0]), -1.0);
        assert_eq!(tree.predict_row(&[0.6, 5.0]), 2.0);
    }

    #[test]
    fn categorical_split_routes_by_category() {
        let mut tree = Tree::new(4);
        let inner = construct_bitset(&[0, 2]);
        let real = construct_bitset(&[10, 30]);
        tree.split_categorical(0, 0, 0, inner, real, -1.0, 1.0, 4, 4, 2.0);
        assert_eq!(tree.predict_row(&[10.0]), -1.0);
        assert_eq!(tree.predict_row(&[20.0]), 1.0);
        assert_eq!(tree.predict_row(&[30.0]), -1.0);
    }

    #[test]
    fn missing_values_follow_default_direction() {
        let mut tree = Tree::new(4);
        tree.split(0, 0, 0, 1, 1.5, -1.0, 1.0, 4, 4, 8.0, MissingType::NaN, true);
        assert_eq!(tree.predict_row(&[f64::NAN]), -1.0);
        let mut tree = Tree::new(4);
        tree.split(0, 0, 0, 1, 1.5, -1.0, 1.0, 4, 4, 8.0, MissingType::NaN, false);
        assert_eq!(tree.predict_row(&[f64::NAN]), 1.0);
    }

    #[test]
    fn shrink_scales_outputs() {
        let mut tree = Tree::new(4);
        tree.split(0, 0, 0, 0, 0.5, -2.0, 2.0, 4, 4, 1.0, MissingType::None, false);
        tree.shrink(0.1);
        assert!((tree.leaf_output(0) + 0.2).abs() < 1e-12);
        assert!((tree.shrinkage() - 0.1).abs() < 1e-12);
    }
}
