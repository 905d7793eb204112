//! Forced splits: a caller-supplied tree skeleton applied before greedy
//! growth.
//!
//! The skeleton is a JSON object `{feature, threshold, left?, right?}`
//! walked breadth-first. Before each application the regular search runs
//! for the current pair of leaves, so that if a forced split turns out
//! to have negative gain the greedy loop can resume from fully populated
//! candidates without redoing that work. The driver evaluates the
//! caller's thresholds against the live histograms instead of searching.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::data::Dataset;
use crate::tree::Tree;

use super::histogram::FeatureHistogram;
use super::learner::TreeLearner;
use super::split_info::SplitInfo;

/// What the forced pass did, for the greedy loop to pick up from.
pub(super) struct ForceSplitOutcome {
    pub applied: usize,
    pub left_leaf: usize,
    pub right_leaf: i32,
    pub cur_depth: u32,
    pub aborted: bool,
}

/// A skeleton node is actionable when it names both a feature and a
/// threshold.
fn forced_entry(value: &Value) -> Option<(usize, f64)> {
    let feature = value.get("feature")?.as_i64()?;
    let threshold = value.get("threshold")?.as_f64()?;
    if feature < 0 {
        return None;
    }
    Some((feature as usize, threshold))
}

impl TreeLearner {
    /// Apply the forced-split skeleton. Returns the number of splits
    /// performed and the leaf state the greedy loop continues from.
    pub(super) fn force_splits(
        &mut self,
        dataset: &Dataset,
        gradients: &[f32],
        hessians: &[f32],
        tree: &mut Tree,
        forced: &Value,
    ) -> ForceSplitOutcome {
        let mut outcome = ForceSplitOutcome {
            applied: 0,
            left_leaf: 0,
            right_leaf: -1,
            cur_depth: 1,
            aborted: false,
        };
        let mut queue: VecDeque<(&Value, usize)> = VecDeque::new();
        let mut force_split_map: HashMap<usize, SplitInfo> = HashMap::new();
        let mut left: Option<&Value> = Some(forced);
        let mut right: Option<&Value> = None;
        let mut left_smaller = true;
        queue.push_back((forced, 0));

        while !queue.is_empty() {
            // Populate best splits for the current leaves first; an abort
            // must leave the greedy loop a coherent candidate state.
            if self.before_find_best_split(tree, outcome.left_leaf, outcome.right_leaf) {
                self.find_best_splits(dataset, gradients, hessians);
            }

            if let Some(node) = left {
                if let Some((feature, threshold)) = forced_entry(node) {
                    if let Some(info) =
                        self.gather_forced(dataset, left_smaller, feature, threshold)
                    {
                        if info.gain >= 0.0 {
                            force_split_map.insert(outcome.left_leaf, info);
                        }
                    }
                }
            }
            if let Some(node) = right {
                if let Some((feature, threshold)) = forced_entry(node) {
                    if let Some(info) =
                        self.gather_forced(dataset, !left_smaller, feature, threshold)
                    {
                        if info.gain >= 0.0 {
                            force_split_map.insert(outcome.right_leaf as usize, info);
                        }
                    }
                }
            }

            let (subtree, current_leaf) = queue.pop_front().expect("loop guard");
            // The BFS order guarantees the parent evaluated this leaf;
            // a missing entry means its forced split was inadmissible.
            let Some(mut info) = force_split_map.remove(&current_leaf) else {
                outcome.aborted = true;
                break;
            };

            let right_leaf = self.apply_split(dataset, tree, current_leaf, &mut info);
            outcome.left_leaf = current_leaf;
            outcome.right_leaf = right_leaf as i32;
            left_smaller = self.seed_children(&info, current_leaf, right_leaf);

            left = subtree.get("left");
            right = subtree.get("right");
            if let Some(node) = left {
                if forced_entry(node).is_some() {
                    queue.push_back((node, outcome.left_leaf));
                }
            }
            if let Some(node) = right {
                if forced_entry(node).is_some() {
                    queue.push_back((node, right_leaf));
                }
            }

            outcome.applied += 1;
            outcome.cur_depth = outcome.cur_depth.max(tree.leaf_depth(outcome.left_leaf));
        }
        outcome
    }

    /// Evaluate a forced `(feature, threshold)` against the appropriate
    /// child histogram. Returns `None` when the feature is unknown to
    /// the dataset.
    fn gather_forced(
        &mut self,
        dataset: &Dataset,
        use_smaller: bool,
        real_feature: usize,
        threshold_value: f64,
    ) -> Option<SplitInfo> {
        let inner = dataset.inner_feature_index(real_feature);
        if inner < 0 {
            return None;
        }
        let inner = inner as usize;
        let threshold_bin = dataset.bin_threshold(inner, threshold_value);

        let (slot, sum_g, sum_h, count) = if use_smaller {
            (
                self.smaller_slot?,
                self.smaller_leaf_splits.sum_gradients(),
                self.smaller_leaf_splits.sum_hessians(),
                self.smaller_leaf_splits.num_data_in_leaf(),
            )
        } else {
            (
                self.larger_slot?,
                self.larger_leaf_splits.sum_gradients(),
                self.larger_leaf_splits.sum_hessians(),
                self.larger_leaf_splits.num_data_in_leaf(),
            )
        };

        let params = self.params.clone();
        let offset = dataset.bin_offsets()[inner];
        let n_bins = dataset.feature_num_bin(inner) as usize;
        let bank = self.pool.bank_mut(slot);
        let bins = &mut bank.entries[offset..offset + n_bins];
        let mut flag = bank.splittable[inner];
        let view = FeatureHistogram::new(bins, &mut flag);

        let mut info = SplitInfo::invalid();
        view.gather_info_for_threshold(
            dataset.feature_bin_mapper(inner),
            &params,
            threshold_bin,
            sum_g,
            sum_h,
            count,
            &mut info,
        );
        info.feature = real_feature as i32;
        Some(info)
    }
}
