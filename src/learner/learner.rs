//! Serial leaf-wise tree learner.
//!
//! One `train` call grows one tree: `before_train` resets per-tree
//! state, an optional forced-split pass applies a caller-supplied
//! skeleton, then the greedy loop repeatedly acquires histogram banks
//! for the two children of the last split (`before_find_best_split`),
//! searches every feature in parallel (`find_best_splits`), picks the
//! leaf with the best stored candidate and splits it.
//!
//! Bank acquisition follows the smaller/larger protocol: the parent's
//! bank (if still cached) is rebound to the larger child so the larger
//! histogram can be produced by subtracting the smaller child's freshly
//! built histogram, an O(bins) operation instead of an O(rows) scan.

use rayon::prelude::*;

use crate::bitset::construct_bitset;
use crate::config::Config;
use crate::data::{Dataset, HistLayout, TrainScratch};
use crate::error::{Error, Result};
use crate::partition::{DataPartition, SplitCondition};
use crate::tree::Tree;

use super::constraints::{ConstraintEntry, LeafConstraints};
use super::histogram::{
    calculate_splitted_leaf_output, FeatureHistogram, SplitParams, K_EPSILON,
};
use super::leaf_splits::LeafSplits;
use super::pool::{cache_size_for, HistogramBank, HistogramPool};
use super::sampler::FeatureSampler;
use super::split_info::{better_split, SplitInfo};

/// Hook for cost-aware gain adjustment. Implementations subtract a
/// penalty from candidate gains and may revise the stored candidates
/// when a split is committed.
pub trait SplitPenalty: Send + Sync {
    /// Penalty subtracted from one candidate's gain during search.
    fn delta_gain(
        &self,
        inner_feature: usize,
        real_feature: usize,
        leaf: i32,
        num_data_in_leaf: u32,
        split: &SplitInfo,
    ) -> f64;

    /// Called when `best_leaf`'s stored split is about to be applied.
    fn on_split_committed(&self, best_leaf: usize, best_split_per_leaf: &mut [SplitInfo]) {
        let _ = (best_leaf, best_split_per_leaf);
    }
}

/// Objectives that re-estimate leaf outputs after a tree is grown.
pub trait Objective: Send + Sync {
    /// Whether `renew_tree_output` should touch this objective's trees.
    fn is_renew_tree_output(&self) -> bool {
        false
    }

    /// New output for one leaf given the rows it holds. `bag_mapper`
    /// translates partition row ids back to dataset rows when training
    /// ran on a bagged subset.
    fn renew_leaf_output(
        &self,
        old_output: f64,
        residual_getter: &(dyn Fn(u32) -> f64 + Sync),
        row_indices: &[u32],
        bag_mapper: Option<&[u32]>,
    ) -> f64;
}

/// Histogram-based best-first tree learner.
pub struct TreeLearner {
    pub(super) config: Config,
    pub(super) params: SplitParams,
    pub(super) num_data: usize,
    pub(super) num_features: usize,
    pub(super) layout: HistLayout,
    pub(super) scratch: TrainScratch,
    pub(super) pool: HistogramPool,
    pub(super) partition: DataPartition,
    pub(super) constraints: LeafConstraints,
    pub(super) best_split_per_leaf: Vec<SplitInfo>,
    pub(super) smaller_leaf_splits: LeafSplits,
    pub(super) larger_leaf_splits: LeafSplits,
    pub(super) is_feature_used: Vec<bool>,
    pub(super) sampler: FeatureSampler,
    pub(super) ordered_gradients: Vec<f32>,
    pub(super) ordered_hessians: Vec<f32>,
    pub(super) constant_hessian: bool,
    pub(super) penalty: Option<Box<dyn SplitPenalty>>,
    /// Bank footprint in bytes, kept for pool resizing.
    pub(super) bank_bytes: usize,
    // Bank slots of the current split step.
    pub(super) smaller_slot: Option<usize>,
    pub(super) larger_slot: Option<usize>,
    pub(super) parent_available: bool,
}

impl TreeLearner {
    /// Build a learner bound to a dataset's shape.
    pub fn new(config: Config, dataset: &Dataset, constant_hessian: bool) -> Result<Self> {
        config.validate()?;
        let num_data = dataset.num_data();
        let num_features = dataset.num_features();
        let layout = dataset.choose_layout(config.force_col_wise, config.force_row_wise);
        let bank_bytes = dataset.histogram_bytes();
        let cache_size =
            cache_size_for(config.histogram_pool_size, config.num_leaves, bank_bytes);
        let pool = HistogramPool::new(
            cache_size,
            config.num_leaves,
            dataset.total_bins(),
            num_features,
        );
        let sampler = FeatureSampler::new(
            config.feature_fraction_seed,
            config.feature_fraction,
            config.feature_fraction_bynode,
            dataset.valid_feature_indices(),
            num_features,
        );
        log::info!(
            "training set: {} rows, {} used features",
            num_data,
            num_features
        );
        let params = SplitParams::from_config(&config);
        Ok(Self {
            partition: DataPartition::new(num_data, config.num_leaves),
            constraints: LeafConstraints::new(config.num_leaves),
            best_split_per_leaf: vec![SplitInfo::invalid(); config.num_leaves],
            smaller_leaf_splits: LeafSplits::new(num_data),
            larger_leaf_splits: LeafSplits::new(num_data),
            is_feature_used: vec![true; num_features],
            ordered_gradients: Vec::with_capacity(num_data),
            ordered_hessians: Vec::with_capacity(num_data),
            constant_hessian,
            penalty: None,
            bank_bytes,
            smaller_slot: None,
            larger_slot: None,
            parent_available: false,
            scratch: TrainScratch::new(),
            layout,
            pool,
            sampler,
            num_data,
            num_features,
            params,
            config,
        })
    }

    /// Install (or clear) the cost penalty hook.
    pub fn set_split_penalty(&mut self, penalty: Option<Box<dyn SplitPenalty>>) {
        self.penalty = penalty;
    }

    /// Swap in a new dataset with the same feature shape.
    pub fn reset_training_data(&mut self, dataset: &Dataset) -> Result<()> {
        if dataset.num_features() != self.num_features {
            return Err(Error::FeatureCountMismatch {
                expected: self.num_features,
                actual: dataset.num_features(),
            });
        }
        self.num_data = dataset.num_data();
        self.smaller_leaf_splits.reset_num_data(self.num_data);
        self.larger_leaf_splits.reset_num_data(self.num_data);
        self.partition.reset_num_data(self.num_data);
        self.scratch.invalidate();
        Ok(())
    }

    /// Apply a new configuration. A changed `num_leaves` resizes the
    /// candidate vector, the pool and the partition; other fields only
    /// refresh the regularisation snapshot.
    pub fn reset_config(&mut self, config: Config) -> Result<()> {
        config.validate()?;
        if config.num_leaves != self.config.num_leaves {
            self.best_split_per_leaf
                .resize(config.num_leaves, SplitInfo::invalid());
            let cache_size =
                cache_size_for(config.histogram_pool_size, config.num_leaves, self.bank_bytes);
            self.pool.resize(cache_size, config.num_leaves);
            self.partition.reset_leaves(config.num_leaves);
            self.constraints.resize(config.num_leaves);
        }
        self.sampler
            .reset_fractions(config.feature_fraction, config.feature_fraction_bynode);
        self.params = SplitParams::from_config(&config);
        self.config = config;
        Ok(())
    }

    /// Preconfigure a bagging subset for subsequent `train` calls.
    pub fn set_bagging_data(&mut self, used_indices: &[u32]) {
        self.partition.set_used_indices(used_indices);
    }

    /// Grow one tree from per-row gradients and hessians. The gradient
    /// slices are only borrowed for this call.
    pub fn train(
        &mut self,
        dataset: &Dataset,
        gradients: &[f32],
        hessians: &[f32],
        constant_hessian: bool,
        forced_splits: Option<&serde_json::Value>,
    ) -> Tree {
        assert_eq!(dataset.num_data(), self.num_data);
        assert_eq!(gradients.len(), self.num_data);
        assert_eq!(hessians.len(), self.num_data);
        self.constant_hessian = constant_hessian;

        self.before_train(dataset, gradients, hessians);

        let mut tree = Tree::new(self.config.num_leaves);
        let mut left_leaf = 0usize;
        let mut right_leaf = -1i32;
        let mut cur_depth = 1u32;

        let mut init_splits = 0usize;
        let mut aborted_last_force_split = false;
        if let Some(forced) = forced_splits {
            let outcome = self.force_splits(dataset, gradients, hessians, &mut tree, forced);
            init_splits = outcome.applied;
            left_leaf = outcome.left_leaf;
            right_leaf = outcome.right_leaf;
            cur_depth = cur_depth.max(outcome.cur_depth);
            aborted_last_force_split = outcome.aborted;
        }

        for _split in init_splits..self.config.num_leaves - 1 {
            if !aborted_last_force_split {
                if self.before_find_best_split(&tree, left_leaf, right_leaf) {
                    self.find_best_splits(dataset, gradients, hessians);
                }
            } else {
                // The forced driver already ran the search for this state.
                aborted_last_force_split = false;
            }

            let best_leaf = self.argmax_leaf();
            if self.best_split_per_leaf[best_leaf].gain <= 0.0 {
                log::warn!(
                    "no further splits with positive gain, best gain: {}",
                    self.best_split_per_leaf[best_leaf].gain
                );
                break;
            }
            let right = self.split(dataset, &mut tree, best_leaf);
            left_leaf = best_leaf;
            right_leaf = right as i32;
            cur_depth = cur_depth.max(tree.leaf_depth(left_leaf));
        }
        log::debug!(
            "trained a tree with {} leaves, max depth {}",
            tree.num_leaves(),
            cur_depth
        );
        tree
    }

    /// Re-score the leaves of an existing tree from fresh gradients
    /// without changing its shape.
    pub fn fit_by_existing_tree(
        &self,
        old_tree: &Tree,
        gradients: &[f32],
        hessians: &[f32],
    ) -> Tree {
        let mut tree = old_tree.clone();
        assert!(self.partition.num_leaves() >= tree.num_leaves());
        let decay = self.config.refit_decay_rate;
        let outputs: Vec<f64> = (0..tree.num_leaves())
            .into_par_iter()
            .map(|leaf| {
                let mut sum_grad = 0.0f64;
                let mut sum_hess = K_EPSILON;
                for &row in self.partition.leaf_indices(leaf) {
                    sum_grad += gradients[row as usize] as f64;
                    sum_hess += hessians[row as usize] as f64;
                }
                let output = calculate_splitted_leaf_output(
                    sum_grad,
                    sum_hess,
                    self.config.lambda_l1,
                    self.config.lambda_l2,
                    self.config.max_delta_step,
                );
                let renewed = output * tree.shrinkage();
                decay * tree.leaf_output(leaf) + (1.0 - decay) * renewed
            })
            .collect();
        for (leaf, output) in outputs.into_iter().enumerate() {
            tree.set_leaf_output(leaf, output);
        }
        tree
    }

    /// Variant that first re-partitions rows by their predicted leaf.
    pub fn fit_by_existing_tree_with_leaf_pred(
        &mut self,
        old_tree: &Tree,
        leaf_pred: &[i32],
        gradients: &[f32],
        hessians: &[f32],
    ) -> Tree {
        self.partition
            .reset_by_leaf_pred(leaf_pred, old_tree.num_leaves());
        self.fit_by_existing_tree(old_tree, gradients, hessians)
    }

    /// Let an objective re-estimate leaf outputs (single-machine path).
    pub fn renew_tree_output(
        &self,
        tree: &mut Tree,
        objective: &dyn Objective,
        residual_getter: &(dyn Fn(u32) -> f64 + Sync),
        total_num_data: usize,
        bag_indices: &[u32],
    ) {
        if !objective.is_renew_tree_output() {
            return;
        }
        assert!(tree.num_leaves() <= self.partition.num_leaves());
        let bag_mapper = if total_num_data != self.num_data {
            debug_assert_eq!(bag_indices.len(), self.num_data);
            Some(bag_indices)
        } else {
            None
        };
        let outputs: Vec<Option<f64>> = (0..tree.num_leaves())
            .into_par_iter()
            .map(|leaf| {
                let rows = self.partition.leaf_indices(leaf);
                if rows.is_empty() {
                    return None;
                }
                Some(objective.renew_leaf_output(
                    tree.leaf_output(leaf),
                    residual_getter,
                    rows,
                    bag_mapper,
                ))
            })
            .collect();
        for (leaf, output) in outputs.into_iter().enumerate() {
            if let Some(output) = output {
                tree.set_leaf_output(leaf, output);
            }
        }
    }

    // ------------------------------------------------------------------
    // Training internals
    // ------------------------------------------------------------------

    pub(super) fn before_train(
        &mut self,
        dataset: &Dataset,
        gradients: &[f32],
        hessians: &[f32],
    ) {
        self.pool.reset_map();

        if self.sampler.tree_level_enabled() {
            self.is_feature_used = self.sampler.sample_tree_level(dataset);
        } else {
            self.is_feature_used.clear();
            self.is_feature_used.resize(self.num_features, true);
        }
        dataset.init_train(&self.is_feature_used, self.layout, &mut self.scratch);

        self.partition.init();
        self.constraints.reset();
        for split in &mut self.best_split_per_leaf {
            split.reset();
        }

        if self.partition.leaf_count(0) == self.num_data {
            self.smaller_leaf_splits.init_full(gradients, hessians);
        } else {
            // Bagging subset: only part of the rows are in play.
            self.smaller_leaf_splits
                .init_from_partition(0, &self.partition, gradients, hessians);
        }
        self.larger_leaf_splits.init_unused();

        self.smaller_slot = None;
        self.larger_slot = None;
        self.parent_available = false;
    }

    /// Depth/count admission checks plus the bank acquisition dance.
    /// Returns false when both children are unsplittable; their stored
    /// candidates are invalidated so the argmax routes around them.
    pub(super) fn before_find_best_split(
        &mut self,
        tree: &Tree,
        left_leaf: usize,
        right_leaf: i32,
    ) -> bool {
        if self.config.max_depth > 0
            && tree.leaf_depth(left_leaf) >= self.config.max_depth as u32
        {
            self.best_split_per_leaf[left_leaf].reset();
            if right_leaf >= 0 {
                self.best_split_per_leaf[right_leaf as usize].reset();
            }
            return false;
        }
        let num_left = self.partition.leaf_count(left_leaf);
        let num_right = if right_leaf >= 0 {
            self.partition.leaf_count(right_leaf as usize)
        } else {
            0
        };
        let limit = self.config.min_data_in_leaf as usize * 2;
        if num_right < limit && num_left < limit {
            self.best_split_per_leaf[left_leaf].reset();
            if right_leaf >= 0 {
                self.best_split_per_leaf[right_leaf as usize].reset();
            }
            return false;
        }

        self.parent_available = false;
        if right_leaf < 0 {
            // Only the root exists.
            let (slot, _) = self.pool.get(left_leaf);
            self.smaller_slot = Some(slot);
            self.larger_slot = None;
        } else if num_left < num_right {
            // Parent data (bound to the left leaf id) follows the larger
            // right child; the smaller left child gets a fresh bank.
            let (slot, recovered) = self.pool.get(left_leaf);
            if recovered {
                self.parent_available = true;
            }
            self.pool.move_to(left_leaf, right_leaf as usize);
            let (small, _) = self.pool.get(left_leaf);
            self.smaller_slot = Some(small);
            self.larger_slot = Some(slot);
        } else {
            let (slot, recovered) = self.pool.get(left_leaf);
            if recovered {
                self.parent_available = true;
            }
            let (small, _) = self.pool.get(right_leaf as usize);
            self.smaller_slot = Some(small);
            self.larger_slot = Some(slot);
        }
        true
    }

    /// Construct the children's histograms and search every feature.
    pub(super) fn find_best_splits(
        &mut self,
        dataset: &Dataset,
        gradients: &[f32],
        hessians: &[f32],
    ) {
        let mut used = vec![false; self.num_features];
        if self.parent_available {
            let smaller = self.smaller_slot.expect("smaller bank not acquired");
            let larger = self.larger_slot.expect("parent implies a larger bank");
            let (smaller_bank, larger_bank) = self.pool.banks_pair_mut(smaller, larger);
            for inner in 0..self.num_features {
                if !self.is_feature_used[inner] {
                    continue;
                }
                // A feature that could not split the parent cannot split
                // either child.
                if !larger_bank.splittable[inner] {
                    smaller_bank.splittable[inner] = false;
                    continue;
                }
                used[inner] = true;
            }
        } else {
            used.copy_from_slice(&self.is_feature_used);
        }
        let use_subtract = self.parent_available;
        self.construct_histograms(dataset, gradients, hessians, &used, use_subtract);
        self.find_best_splits_from_histograms(dataset, &used, use_subtract);
    }

    fn construct_histograms(
        &mut self,
        dataset: &Dataset,
        gradients: &[f32],
        hessians: &[f32],
        used: &[bool],
        use_subtract: bool,
    ) {
        let smaller_leaf = self.smaller_leaf_splits.leaf_index() as usize;
        let rows = if self.smaller_leaf_splits.covers_all_data() {
            None
        } else {
            Some(self.partition.leaf_indices(smaller_leaf))
        };
        let slot = self.smaller_slot.expect("smaller bank not acquired");
        dataset.construct_histograms(
            used,
            rows,
            gradients,
            hessians,
            &mut self.ordered_gradients,
            &mut self.ordered_hessians,
            self.constant_hessian,
            self.layout,
            &self.scratch,
            &mut self.pool.bank_mut(slot).entries,
        );

        if self.larger_leaf_splits.in_use() && !use_subtract {
            let larger_leaf = self.larger_leaf_splits.leaf_index() as usize;
            let slot = self.larger_slot.expect("larger bank not acquired");
            let rows = Some(self.partition.leaf_indices(larger_leaf));
            dataset.construct_histograms(
                used,
                rows,
                gradients,
                hessians,
                &mut self.ordered_gradients,
                &mut self.ordered_hessians,
                self.constant_hessian,
                self.layout,
                &self.scratch,
                &mut self.pool.bank_mut(slot).entries,
            );
        }
    }

    /// Parallel per-feature search for both children, reduced with the
    /// deterministic candidate order.
    fn find_best_splits_from_histograms(
        &mut self,
        dataset: &Dataset,
        used: &[bool],
        use_subtract: bool,
    ) {
        let smaller_node_used = if self.sampler.node_level_enabled() {
            self.sampler.sample_node_level(dataset)
        } else {
            vec![true; self.num_features]
        };
        let larger_node_used = if self.sampler.node_level_enabled() {
            self.sampler.sample_node_level(dataset)
        } else {
            vec![true; self.num_features]
        };

        let smaller_leaf = self.smaller_leaf_splits.leaf_index() as usize;
        let larger_live = self.larger_leaf_splits.in_use();
        let larger_leaf = self.larger_leaf_splits.leaf_index();

        let smaller_sum_g = self.smaller_leaf_splits.sum_gradients();
        let smaller_sum_h = self.smaller_leaf_splits.sum_hessians();
        let smaller_count = self.smaller_leaf_splits.num_data_in_leaf();
        let smaller_constraint = self.constraints.get(smaller_leaf);
        let (larger_sum_g, larger_sum_h, larger_count, larger_constraint) = if larger_live {
            (
                self.larger_leaf_splits.sum_gradients(),
                self.larger_leaf_splits.sum_hessians(),
                self.larger_leaf_splits.num_data_in_leaf(),
                self.constraints.get(larger_leaf as usize),
            )
        } else {
            (0.0, 0.0, 0, ConstraintEntry::unbounded())
        };

        let n_bins: Vec<u32> = (0..self.num_features)
            .map(|inner| dataset.feature_num_bin(inner))
            .collect();

        let smaller_slot = self.smaller_slot.expect("smaller bank not acquired");
        let (small_views, large_views) = match self.larger_slot {
            Some(larger_slot) if larger_live => {
                let (small_bank, large_bank) = self.pool.banks_pair_mut(smaller_slot, larger_slot);
                let large = feature_views(large_bank, &n_bins)
                    .into_iter()
                    .map(Some)
                    .collect();
                (feature_views(small_bank, &n_bins), large)
            }
            _ => {
                let small = feature_views(self.pool.bank_mut(smaller_slot), &n_bins);
                let none: Vec<Option<FeatureHistogram<'_>>> =
                    (0..self.num_features).map(|_| None).collect();
                (small, none)
            }
        };

        let params = &self.params;
        let config = &self.config;
        let penalty = self.penalty.as_deref();

        let tasks: Vec<(usize, FeatureHistogram<'_>, Option<FeatureHistogram<'_>>)> = small_views
            .into_iter()
            .zip(large_views)
            .enumerate()
            .map(|(inner, (small, large))| (inner, small, large))
            .collect();

        let (smaller_best, larger_best) = tasks
            .into_par_iter()
            .map(|(inner, mut small, mut large)| {
                if !used[inner] {
                    return (SplitInfo::invalid(), SplitInfo::invalid());
                }
                let mapper = dataset.feature_bin_mapper(inner);
                let real = dataset.real_feature_index(inner);

                dataset.fix_histogram(inner, smaller_sum_g, smaller_sum_h, small.raw_mut());
                let mut small_out = SplitInfo::invalid();
                if smaller_node_used[inner] {
                    small.find_best_threshold(
                        mapper,
                        params,
                        config.monotone_type(real),
                        smaller_constraint,
                        smaller_sum_g,
                        smaller_sum_h,
                        smaller_count,
                        &mut small_out,
                    );
                    small_out.feature = real as i32;
                    if let Some(penalty) = penalty {
                        small_out.gain -= penalty.delta_gain(
                            inner,
                            real,
                            smaller_leaf as i32,
                            smaller_count,
                            &small_out,
                        );
                    }
                }

                let mut large_out = SplitInfo::invalid();
                if let Some(large) = large.as_mut() {
                    if use_subtract {
                        large.subtract(small.raw());
                    } else {
                        dataset.fix_histogram(inner, larger_sum_g, larger_sum_h, large.raw_mut());
                    }
                    if larger_node_used[inner] {
                        large.find_best_threshold(
                            mapper,
                            params,
                            config.monotone_type(real),
                            larger_constraint,
                            larger_sum_g,
                            larger_sum_h,
                            larger_count,
                            &mut large_out,
                        );
                        large_out.feature = real as i32;
                        if let Some(penalty) = penalty {
                            large_out.gain -= penalty.delta_gain(
                                inner,
                                real,
                                larger_leaf,
                                larger_count,
                                &large_out,
                            );
                        }
                    }
                }
                (small_out, large_out)
            })
            .reduce(
                || (SplitInfo::invalid(), SplitInfo::invalid()),
                |a, b| (better_split(a.0, b.0), better_split(a.1, b.1)),
            );

        self.best_split_per_leaf[smaller_leaf] = smaller_best;
        if larger_live {
            self.best_split_per_leaf[larger_leaf as usize] = larger_best;
        }
    }

    /// Leaf with the best stored candidate; ties go to the lowest id.
    fn argmax_leaf(&self) -> usize {
        let mut best = 0usize;
        for leaf in 1..self.best_split_per_leaf.len() {
            if self.best_split_per_leaf[leaf].is_better_than(&self.best_split_per_leaf[best]) {
                best = leaf;
            }
        }
        best
    }

    /// Apply the stored best split of `best_leaf`; returns the right
    /// child's leaf id.
    pub(super) fn split(
        &mut self,
        dataset: &Dataset,
        tree: &mut Tree,
        best_leaf: usize,
    ) -> usize {
        if let Some(penalty) = &self.penalty {
            penalty.on_split_committed(best_leaf, &mut self.best_split_per_leaf);
        }
        let mut info = self.best_split_per_leaf[best_leaf].clone();
        let inner = dataset.inner_feature_index(info.feature as usize);
        debug_assert!(inner >= 0);
        let is_numerical = !dataset.feature_bin_mapper(inner as usize).is_categorical();

        let right_leaf = self.apply_split(dataset, tree, best_leaf, &mut info);
        self.seed_children(&info, best_leaf, right_leaf);
        self.constraints.update(
            is_numerical,
            best_leaf,
            right_leaf,
            info.monotone_type,
            info.right_output,
            info.left_output,
        );
        right_leaf
    }

    /// Repartition rows and record the split on the tree. Overwrites the
    /// candidate's estimated child counts with the partition's counts.
    pub(super) fn apply_split(
        &mut self,
        dataset: &Dataset,
        tree: &mut Tree,
        leaf: usize,
        info: &mut SplitInfo,
    ) -> usize {
        let real = info.feature as usize;
        let inner = dataset.inner_feature_index(real);
        assert!(inner >= 0, "split feature was dropped from the dataset");
        let inner = inner as usize;
        let mapper = dataset.feature_bin_mapper(inner);
        let next_leaf_id = tree.next_leaf_id();

        if !mapper.is_categorical() {
            let threshold_real = dataset.real_threshold(inner, info.threshold);
            self.partition.split(
                leaf,
                dataset,
                inner,
                SplitCondition::Numerical {
                    max_bin: info.threshold,
                },
                info.default_left,
                next_leaf_id,
            );
            info.left_count = self.partition.leaf_count(leaf) as u32;
            info.right_count = self.partition.leaf_count(next_leaf_id) as u32;
            tree.split(
                leaf,
                inner,
                real,
                info.threshold,
                threshold_real,
                info.left_output,
                info.right_output,
                info.left_count,
                info.right_count,
                info.gain,
                mapper.missing_type(),
                info.default_left,
            )
        } else {
            let bitset_inner = construct_bitset(&info.cat_threshold);
            let categories: Vec<u32> = info
                .cat_threshold
                .iter()
                .map(|&bin| dataset.real_threshold(inner, bin) as u32)
                .collect();
            let bitset = construct_bitset(&categories);
            self.partition.split(
                leaf,
                dataset,
                inner,
                SplitCondition::Categorical {
                    bitset: &bitset_inner,
                },
                info.default_left,
                next_leaf_id,
            );
            info.left_count = self.partition.leaf_count(leaf) as u32;
            info.right_count = self.partition.leaf_count(next_leaf_id) as u32;
            tree.split_categorical(
                leaf,
                inner,
                real,
                bitset_inner,
                bitset,
                info.left_output,
                info.right_output,
                info.left_count,
                info.right_count,
                info.gain,
            )
        }
    }

    /// Seed the next iteration's smaller/larger slots from the split's
    /// children. Returns whether the left child is the smaller one.
    pub(super) fn seed_children(
        &mut self,
        info: &SplitInfo,
        left_leaf: usize,
        right_leaf: usize,
    ) -> bool {
        if info.left_count < info.right_count {
            assert!(info.left_count > 0, "smaller child must hold rows");
            self.smaller_leaf_splits.init_with_sums(
                left_leaf,
                &self.partition,
                info.left_sum_gradient,
                info.left_sum_hessian,
            );
            self.larger_leaf_splits.init_with_sums(
                right_leaf,
                &self.partition,
                info.right_sum_gradient,
                info.right_sum_hessian,
            );
            true
        } else {
            assert!(info.right_count > 0, "smaller child must hold rows");
            self.smaller_leaf_splits.init_with_sums(
                right_leaf,
                &self.partition,
                info.right_sum_gradient,
                info.right_sum_hessian,
            );
            self.larger_leaf_splits.init_with_sums(
                left_leaf,
                &self.partition,
                info.left_sum_gradient,
                info.left_sum_hessian,
            );
            false
        }
    }
}

/// Split a bank into one mutable per-feature view each; disjoint slices
/// let the feature loop run in parallel without locking.
fn feature_views<'a>(bank: &'a mut HistogramBank, n_bins: &[u32]) -> Vec<FeatureHistogram<'a>> {
    let mut views = Vec::with_capacity(n_bins.len());
    let mut bins_rest: &mut [crate::data::HistogramEntry] = &mut bank.entries;
    let mut flags_rest: &mut [bool] = &mut bank.splittable;
    for &nb in n_bins {
        let tail = std::mem::take(&mut bins_rest);
        let (bins, tail) = tail.split_at_mut(nb as usize);
        bins_rest = tail;
        let ftail = std::mem::take(&mut flags_rest);
        let (flag, ftail) = ftail.split_at_mut(1);
        flags_rest = ftail;
        views.push(FeatureHistogram::new(bins, &mut flag[0]));
    }
    views
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BinMapper, DatasetBuilder, MissingType};

    fn simple_dataset() -> Dataset {
        let mut builder = DatasetBuilder::new(16);
        builder.push_binned(
            vec![0, 0, 0, 0, 1, 1, 1, 1],
            BinMapper::numerical(vec![3.5, f64::INFINITY], MissingType::None, 0, 0),
        );
        builder.build().unwrap()
    }

    fn relaxed_config() -> Config {
        Config {
            num_leaves: 4,
            min_data_in_leaf: 1,
            min_sum_hessian_in_leaf: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn new_validates_config() {
        let dataset = simple_dataset();
        let config = Config {
            num_leaves: 1,
            ..Default::default()
        };
        assert!(TreeLearner::new(config, &dataset, true).is_err());
    }

    #[test]
    fn reset_training_data_rejects_shape_change() {
        let dataset = simple_dataset();
        let mut learner = TreeLearner::new(relaxed_config(), &dataset, true).unwrap();

        let mut builder = DatasetBuilder::new(16);
        builder.push_binned(
            vec![0, 1],
            BinMapper::numerical(vec![0.5, f64::INFINITY], MissingType::None, 0, 0),
        );
        builder.push_binned(
            vec![1, 0],
            BinMapper::numerical(vec![0.5, f64::INFINITY], MissingType::None, 0, 0),
        );
        let other = builder.build().unwrap();
        assert!(matches!(
            learner.reset_training_data(&other),
            Err(Error::FeatureCountMismatch { .. })
        ));
    }

    #[test]
    fn reset_config_resizes_leaf_state() {
        let dataset = simple_dataset();
        let mut learner = TreeLearner::new(relaxed_config(), &dataset, true).unwrap();
        let bigger = Config {
            num_leaves: 16,
            ..relaxed_config()
        };
        learner.reset_config(bigger).unwrap();
        assert_eq!(learner.best_split_per_leaf.len(), 16);
        assert_eq!(learner.partition.num_leaves(), 16);
    }

    #[test]
    fn before_train_seeds_root_stats() {
        let dataset = simple_dataset();
        let mut learner = TreeLearner::new(relaxed_config(), &dataset, true).unwrap();
        let grad = vec![1.0f32, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];
        let hess = vec![1.0f32; 8];
        learner.before_train(&dataset, &grad, &hess);
        assert_eq!(learner.smaller_leaf_splits.leaf_index(), 0);
        assert_eq!(learner.smaller_leaf_splits.num_data_in_leaf(), 8);
        assert_eq!(learner.smaller_leaf_splits.sum_gradients(), 0.0);
        assert!(!learner.larger_leaf_splits.in_use());
    }

    #[test]
    fn depth_limit_invalidates_candidates() {
        let dataset = simple_dataset();
        let config = Config {
            max_depth: 1,
            ..relaxed_config()
        };
        let mut learner = TreeLearner::new(config, &dataset, true).unwrap();
        let grad = vec![1.0f32, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];
        let hess = vec![1.0f32; 8];
        learner.before_train(&dataset, &grad, &hess);

        let mut tree = Tree::new(4);
        assert!(learner.before_find_best_split(&tree, 0, -1));
        learner.find_best_splits(&dataset, &grad, &hess);
        let best = learner.argmax_leaf();
        assert!(learner.best_split_per_leaf[best].gain > 0.0);
        let right = learner.split(&dataset, &mut tree, best);

        // Children sit at the depth cap: both are rejected up front.
        assert!(!learner.before_find_best_split(&tree, best, right as i32));
        assert!(learner.best_split_per_leaf[best].gain.is_infinite());
    }
}
