//! Training configuration.
//!
//! A read-only bundle of the options the tree learner consumes. Defaults
//! follow the conventional values for leaf-wise histogram boosting.

use crate::error::{Error, Result};

/// Configuration for one tree learner.
///
/// The learner snapshots regularization fields on every search, so
/// [`reset_config`](crate::learner::TreeLearner::reset_config) with an
/// unchanged `num_leaves` is cheap.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of leaves per tree.
    pub num_leaves: usize,
    /// Maximum tree depth. Zero or negative means unbounded.
    pub max_depth: i32,
    /// Minimum number of rows per child.
    pub min_data_in_leaf: u32,
    /// Minimum hessian sum per child.
    pub min_sum_hessian_in_leaf: f64,
    /// L1 regularization on leaf outputs.
    pub lambda_l1: f64,
    /// L2 regularization on leaf outputs.
    pub lambda_l2: f64,
    /// Minimum gain a split must clear beyond the parent's score.
    pub min_gain_to_split: f64,
    /// Cap on the magnitude of leaf outputs. Zero or negative disables it.
    pub max_delta_step: f64,
    /// Fraction of features sampled once per tree, in (0, 1].
    pub feature_fraction: f64,
    /// Fraction of features sampled independently per node, in (0, 1].
    pub feature_fraction_bynode: f64,
    /// Seed for the feature sampling RNG.
    pub feature_fraction_seed: u64,
    /// Histogram cache budget in MiB. Zero or negative sizes the cache to
    /// `num_leaves` banks.
    pub histogram_pool_size: f64,
    /// Force column-wise histogram construction.
    pub force_col_wise: bool,
    /// Force row-wise histogram construction.
    pub force_row_wise: bool,
    /// Blend factor between old and refreshed leaf outputs when refitting
    /// an existing tree structure.
    pub refit_decay_rate: f64,
    /// Maximum number of categories collected on one side of a
    /// categorical split.
    pub max_cat_threshold: usize,
    /// Categorical features with at most this many used categories are
    /// searched one-vs-rest instead of by sorted ratio.
    pub max_cat_to_onehot: usize,
    /// Per-feature monotone constraints (-1 decreasing, 0 none,
    /// +1 increasing), indexed by real feature. Missing entries mean
    /// unconstrained.
    pub monotone_constraints: Vec<i8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_leaves: 31,
            max_depth: -1,
            min_data_in_leaf: 20,
            min_sum_hessian_in_leaf: 1e-3,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            min_gain_to_split: 0.0,
            max_delta_step: 0.0,
            feature_fraction: 1.0,
            feature_fraction_bynode: 1.0,
            feature_fraction_seed: 2,
            histogram_pool_size: -1.0,
            force_col_wise: false,
            force_row_wise: false,
            refit_decay_rate: 0.9,
            max_cat_threshold: 32,
            max_cat_to_onehot: 4,
            monotone_constraints: Vec::new(),
        }
    }
}

impl Config {
    /// Validate field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.num_leaves < 2 {
            return Err(Error::InvalidConfig(format!(
                "num_leaves must be >= 2, got {}",
                self.num_leaves
            )));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "feature_fraction must be in (0, 1], got {}",
                self.feature_fraction
            )));
        }
        if !(self.feature_fraction_bynode > 0.0 && self.feature_fraction_bynode <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "feature_fraction_bynode must be in (0, 1], got {}",
                self.feature_fraction_bynode
            )));
        }
        if self.min_sum_hessian_in_leaf < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_sum_hessian_in_leaf must be >= 0, got {}",
                self.min_sum_hessian_in_leaf
            )));
        }
        if self.lambda_l1 < 0.0 || self.lambda_l2 < 0.0 {
            return Err(Error::InvalidConfig(
                "lambda_l1 and lambda_l2 must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.refit_decay_rate) {
            return Err(Error::InvalidConfig(format!(
                "refit_decay_rate must be in [0, 1], got {}",
                self.refit_decay_rate
            )));
        }
        if self.force_col_wise && self.force_row_wise {
            return Err(Error::InvalidConfig(
                "force_col_wise and force_row_wise are mutually exclusive".to_string(),
            ));
        }
        if self.max_cat_threshold == 0 {
            return Err(Error::InvalidConfig(
                "max_cat_threshold must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Monotone constraint for a real feature index.
    #[inline]
    pub fn monotone_type(&self, real_feature: usize) -> i8 {
        self.monotone_constraints
            .get(real_feature)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_single_leaf() {
        let config = Config {
            num_leaves: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_conflicting_layout_forces() {
        let config = Config {
            force_col_wise: true,
            force_row_wise: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn monotone_lookup_defaults_to_none() {
        let config = Config {
            monotone_constraints: vec![1, -1],
            ..Default::default()
        };
        assert_eq!(config.monotone_type(0), 1);
        assert_eq!(config.monotone_type(1), -1);
        assert_eq!(config.monotone_type(5), 0);
    }
}
