//! Per-feature histogram views and threshold search.
//!
//! A [`FeatureHistogram`] is a short-lived mutable view over one
//! feature's bins inside a pool bank, together with that feature's
//! splittable flag. Threshold search enumerates bin boundaries in both
//! directions so the missing-value mass can be placed on either side,
//! picks the direction with the higher gain, and records the candidate
//! under the deterministic tie-break (lower threshold, then missing
//! going right).
//!
//! # Gain semantics
//!
//! Leaf scores use L1 soft-thresholding of the gradient sum and L2
//! damping of the hessian sum; an optional `max_delta_step` caps the
//! output magnitude and switches the score to its output-parameterised
//! form. A split's recorded gain is the children's combined score minus
//! the parent's score and the `min_gain_to_split` margin. Child counts
//! during search are hessian-based estimates
//! (`round(hess * num_data / sum_hessians)`); the partition supplies the
//! authoritative counts later.

use crate::config::Config;
use crate::data::{BinMapper, BinType, HistogramEntry, MissingType};

use super::constraints::ConstraintEntry;
use super::split_info::SplitInfo;

/// Numeric guard mirrored into every hessian denominator.
pub(crate) const K_EPSILON: f64 = 1e-15;

/// Regularisation and admissibility parameters snapshot.
#[derive(Clone, Debug)]
pub struct SplitParams {
    pub lambda_l1: f64,
    pub lambda_l2: f64,
    pub max_delta_step: f64,
    pub min_gain_to_split: f64,
    pub min_data_in_leaf: u32,
    pub min_sum_hessian_in_leaf: f64,
    pub max_cat_threshold: usize,
    pub max_cat_to_onehot: usize,
}

impl SplitParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lambda_l1: config.lambda_l1,
            lambda_l2: config.lambda_l2,
            max_delta_step: config.max_delta_step,
            min_gain_to_split: config.min_gain_to_split,
            min_data_in_leaf: config.min_data_in_leaf,
            min_sum_hessian_in_leaf: config.min_sum_hessian_in_leaf,
            max_cat_threshold: config.max_cat_threshold,
            max_cat_to_onehot: config.max_cat_to_onehot,
        }
    }
}

/// L1 soft-thresholding of a gradient sum.
#[inline]
fn threshold_l1(s: f64, l1: f64) -> f64 {
    let reg = (s.abs() - l1).max(0.0);
    if s >= 0.0 {
        reg
    } else {
        -reg
    }
}

/// Optimal output of a leaf with the given sums.
#[inline]
pub fn calculate_splitted_leaf_output(
    sum_gradients: f64,
    sum_hessians: f64,
    lambda_l1: f64,
    lambda_l2: f64,
    max_delta_step: f64,
) -> f64 {
    let ret = -threshold_l1(sum_gradients, lambda_l1) / (sum_hessians + lambda_l2);
    if max_delta_step <= 0.0 {
        ret
    } else {
        ret.clamp(-max_delta_step, max_delta_step)
    }
}

#[inline]
fn constrained_output(
    sum_gradients: f64,
    sum_hessians: f64,
    params: &SplitParams,
    constraint: ConstraintEntry,
) -> f64 {
    constraint.clamp(calculate_splitted_leaf_output(
        sum_gradients,
        sum_hessians,
        params.lambda_l1,
        params.lambda_l2,
        params.max_delta_step,
    ))
}

/// Leaf score for a fixed output value.
#[inline]
fn gain_given_output(sum_gradients: f64, sum_hessians: f64, l1: f64, l2: f64, output: f64) -> f64 {
    let sg = threshold_l1(sum_gradients, l1);
    -(2.0 * sg * output + (sum_hessians + l2) * output * output)
}

/// Leaf score at its optimal output.
#[inline]
pub(crate) fn leaf_split_gain(
    sum_gradients: f64,
    sum_hessians: f64,
    l1: f64,
    l2: f64,
    max_delta_step: f64,
) -> f64 {
    if max_delta_step <= 0.0 {
        let sg = threshold_l1(sum_gradients, l1);
        sg * sg / (sum_hessians + l2)
    } else {
        let output =
            calculate_splitted_leaf_output(sum_gradients, sum_hessians, l1, l2, max_delta_step);
        gain_given_output(sum_gradients, sum_hessians, l1, l2, output)
    }
}

/// Combined children score of a candidate, `-inf` when a monotone
/// constraint rejects the implied outputs.
#[inline]
fn split_gains(
    left_gradients: f64,
    left_hessians: f64,
    right_gradients: f64,
    right_hessians: f64,
    params: &SplitParams,
    constraint: ConstraintEntry,
    monotone_type: i8,
) -> f64 {
    let left_output = constrained_output(left_gradients, left_hessians, params, constraint);
    let right_output = constrained_output(right_gradients, right_hessians, params, constraint);
    if monotone_type > 0 && left_output > right_output {
        return f64::NEG_INFINITY;
    }
    if monotone_type < 0 && left_output < right_output {
        return f64::NEG_INFINITY;
    }
    gain_given_output(
        left_gradients,
        left_hessians,
        params.lambda_l1,
        params.lambda_l2,
        left_output,
    ) + gain_given_output(
        right_gradients,
        right_hessians,
        params.lambda_l1,
        params.lambda_l2,
        right_output,
    )
}

/// Hessian-based row count estimate for one accumulated mass.
#[inline]
fn round_count(sum_hessians: f64, cnt_factor: f64) -> u32 {
    (sum_hessians * cnt_factor + 0.5) as u32
}

/// One surviving candidate inside a threshold scan.
struct Candidate {
    gain: f64,
    threshold: u32,
    default_left: bool,
    left_sum_gradient: f64,
    left_sum_hessian: f64,
    right_sum_gradient: f64,
    right_sum_hessian: f64,
    left_count: u32,
    right_count: u32,
    cat_bins: Vec<u32>,
}

impl Candidate {
    /// Tie-break: higher gain, then lower threshold, then missing right.
    fn better_than(&self, other: &Candidate) -> bool {
        if self.gain != other.gain {
            return self.gain > other.gain;
        }
        if self.threshold != other.threshold {
            return self.threshold < other.threshold;
        }
        !self.default_left && other.default_left
    }
}

/// Mutable view over one feature's histogram inside a bank.
pub struct FeatureHistogram<'a> {
    bins: &'a mut [HistogramEntry],
    splittable: &'a mut bool,
}

impl<'a> FeatureHistogram<'a> {
    pub fn new(bins: &'a mut [HistogramEntry], splittable: &'a mut bool) -> Self {
        Self { bins, splittable }
    }

    #[inline]
    pub fn raw(&self) -> &[HistogramEntry] {
        self.bins
    }

    #[inline]
    pub fn raw_mut(&mut self) -> &mut [HistogramEntry] {
        self.bins
    }

    #[inline]
    pub fn is_splittable(&self) -> bool {
        *self.splittable
    }

    #[inline]
    pub fn set_is_splittable(&mut self, value: bool) {
        *self.splittable = value;
    }

    /// Bin-wise subtraction: parent data in `self` minus the smaller
    /// child in `other` leaves the larger child's histogram.
    pub fn subtract(&mut self, other: &[HistogramEntry]) {
        debug_assert_eq!(self.bins.len(), other.len());
        for (dst, src) in self.bins.iter_mut().zip(other.iter()) {
            dst.sum_gradients -= src.sum_gradients;
            dst.sum_hessians -= src.sum_hessians;
        }
    }

    /// Search every admissible threshold of this feature and record the
    /// best candidate into `out`. Sets the splittable flag to whether
    /// any candidate passed the admissibility checks.
    #[allow(clippy::too_many_arguments)]
    pub fn find_best_threshold(
        &mut self,
        mapper: &BinMapper,
        params: &SplitParams,
        monotone_type: i8,
        constraint: ConstraintEntry,
        sum_gradients: f64,
        sum_hessians: f64,
        num_data: u32,
        out: &mut SplitInfo,
    ) {
        *self.splittable = false;
        let sum_hessians = sum_hessians + 2.0 * K_EPSILON;
        let best = match mapper.bin_type() {
            BinType::Numerical => self.search_numerical(
                mapper,
                params,
                monotone_type,
                constraint,
                sum_gradients,
                sum_hessians,
                num_data,
            ),
            BinType::Categorical => self.search_categorical(
                params,
                constraint,
                sum_gradients,
                sum_hessians,
                num_data,
            ),
        };

        let gain_shift = leaf_split_gain(
            sum_gradients,
            sum_hessians,
            params.lambda_l1,
            params.lambda_l2,
            params.max_delta_step,
        );
        let min_gain_shift = gain_shift + params.min_gain_to_split;

        if let Some(best) = best {
            *self.splittable = true;
            out.threshold = best.threshold;
            out.default_left = best.default_left;
            out.gain = best.gain - min_gain_shift;
            out.left_sum_gradient = best.left_sum_gradient;
            out.left_sum_hessian = best.left_sum_hessian;
            out.right_sum_gradient = best.right_sum_gradient;
            out.right_sum_hessian = best.right_sum_hessian;
            out.left_count = best.left_count;
            out.right_count = best.right_count;
            out.left_output =
                constrained_output(best.left_sum_gradient, best.left_sum_hessian, params, constraint);
            out.right_output = constrained_output(
                best.right_sum_gradient,
                best.right_sum_hessian,
                params,
                constraint,
            );
            out.monotone_type = if mapper.is_categorical() { 0 } else { monotone_type };
            out.cat_threshold = best.cat_bins;
        }
        if mapper.missing_type() == MissingType::NaN && self.bins.len() <= 2 {
            out.default_left = false;
        }
    }

    /// Two-direction numeric scan. The reverse pass accumulates the
    /// right side and sends the remainder (including missing) left; the
    /// forward pass mirrors it. The missing bin is skipped in both so
    /// its mass always travels with the remainder.
    #[allow(clippy::too_many_arguments)]
    fn search_numerical(
        &self,
        mapper: &BinMapper,
        params: &SplitParams,
        monotone_type: i8,
        constraint: ConstraintEntry,
        sum_gradients: f64,
        sum_hessians: f64,
        num_data: u32,
    ) -> Option<Candidate> {
        let num_bin = self.bins.len();
        if num_bin < 2 {
            return None;
        }
        let gain_shift = leaf_split_gain(
            sum_gradients,
            sum_hessians,
            params.lambda_l1,
            params.lambda_l2,
            params.max_delta_step,
        );
        let min_gain_shift = gain_shift + params.min_gain_to_split;
        let cnt_factor = num_data as f64 / sum_hessians;
        let missing = mapper.missing_type() != MissingType::None;
        let default_bin = mapper.default_bin() as usize;
        let mut best: Option<Candidate> = None;

        // Reverse pass: remainder (and missing) goes left.
        let mut sum_right_gradient = 0.0;
        let mut sum_right_hessian = K_EPSILON;
        let mut right_count = 0u32;
        for t in (0..num_bin - 1).rev() {
            let bin = t + 1;
            if !(missing && bin == default_bin) {
                let entry = self.bins[bin];
                sum_right_gradient += entry.sum_gradients;
                sum_right_hessian += entry.sum_hessians;
                right_count += round_count(entry.sum_hessians, cnt_factor);
            }
            if sum_right_hessian < params.min_sum_hessian_in_leaf + K_EPSILON {
                continue;
            }
            if right_count < params.min_data_in_leaf {
                continue;
            }
            let left_count = num_data.saturating_sub(right_count);
            if left_count < params.min_data_in_leaf {
                break;
            }
            let sum_left_hessian = sum_hessians - sum_right_hessian;
            if sum_left_hessian < params.min_sum_hessian_in_leaf + K_EPSILON {
                break;
            }
            let sum_left_gradient = sum_gradients - sum_right_gradient;
            let gain = split_gains(
                sum_left_gradient,
                sum_left_hessian,
                sum_right_gradient,
                sum_right_hessian,
                params,
                constraint,
                monotone_type,
            );
            if gain <= min_gain_shift {
                continue;
            }
            let candidate = Candidate {
                gain,
                threshold: t as u32,
                default_left: true,
                left_sum_gradient: sum_left_gradient,
                left_sum_hessian: sum_left_hessian,
                right_sum_gradient: sum_right_gradient,
                right_sum_hessian: sum_right_hessian,
                left_count,
                right_count,
                cat_bins: Vec::new(),
            };
            if best.as_ref().map_or(true, |b| candidate.better_than(b)) {
                best = Some(candidate);
            }
        }

        // Forward pass: remainder (and missing) goes right.
        if missing && num_bin > 2 {
            let mut sum_left_gradient = 0.0;
            let mut sum_left_hessian = K_EPSILON;
            let mut left_count = 0u32;
            for t in 0..num_bin - 1 {
                if t != default_bin {
                    let entry = self.bins[t];
                    sum_left_gradient += entry.sum_gradients;
                    sum_left_hessian += entry.sum_hessians;
                    left_count += round_count(entry.sum_hessians, cnt_factor);
                }
                if sum_left_hessian < params.min_sum_hessian_in_leaf + K_EPSILON {
                    continue;
                }
                if left_count < params.min_data_in_leaf {
                    continue;
                }
                let right_count = num_data.saturating_sub(left_count);
                if right_count < params.min_data_in_leaf {
                    break;
                }
                let sum_right_hessian = sum_hessians - sum_left_hessian;
                if sum_right_hessian < params.min_sum_hessian_in_leaf + K_EPSILON {
                    break;
                }
                let sum_right_gradient = sum_gradients - sum_left_gradient;
                let gain = split_gains(
                    sum_left_gradient,
                    sum_left_hessian,
                    sum_right_gradient,
                    sum_right_hessian,
                    params,
                    constraint,
                    monotone_type,
                );
                if gain <= min_gain_shift {
                    continue;
                }
                let candidate = Candidate {
                    gain,
                    threshold: t as u32,
                    default_left: false,
                    left_sum_gradient: sum_left_gradient,
                    left_sum_hessian: sum_left_hessian,
                    right_sum_gradient: sum_right_gradient,
                    right_sum_hessian: sum_right_hessian,
                    left_count,
                    right_count,
                    cat_bins: Vec::new(),
                };
                if best.as_ref().map_or(true, |b| candidate.better_than(b)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Categorical scan: one-vs-rest for small category counts, sorted
    /// gradient/hessian-ratio accumulation in both directions otherwise,
    /// capped at `max_cat_threshold` categories per side.
    fn search_categorical(
        &self,
        params: &SplitParams,
        constraint: ConstraintEntry,
        sum_gradients: f64,
        sum_hessians: f64,
        num_data: u32,
    ) -> Option<Candidate> {
        let gain_shift = leaf_split_gain(
            sum_gradients,
            sum_hessians,
            params.lambda_l1,
            params.lambda_l2,
            params.max_delta_step,
        );
        let min_gain_shift = gain_shift + params.min_gain_to_split;
        let cnt_factor = num_data as f64 / sum_hessians;

        let used: Vec<usize> = (0..self.bins.len())
            .filter(|&bin| round_count(self.bins[bin].sum_hessians, cnt_factor) > 0)
            .collect();
        if used.len() < 2 {
            return None;
        }

        let mut best: Option<Candidate> = None;
        let consider = |cat_bins: Vec<u32>,
                        sum_left_gradient: f64,
                        sum_left_hessian: f64,
                        left_count: u32,
                        best: &mut Option<Candidate>| {
            let sum_right_hessian = sum_hessians - sum_left_hessian;
            let sum_right_gradient = sum_gradients - sum_left_gradient;
            let right_count = num_data.saturating_sub(left_count);
            if sum_left_hessian < params.min_sum_hessian_in_leaf + K_EPSILON
                || sum_right_hessian < params.min_sum_hessian_in_leaf + K_EPSILON
                || left_count < params.min_data_in_leaf
                || right_count < params.min_data_in_leaf
            {
                return;
            }
            let gain = split_gains(
                sum_left_gradient,
                sum_left_hessian,
                sum_right_gradient,
                sum_right_hessian,
                params,
                constraint,
                0,
            );
            if gain <= min_gain_shift {
                return;
            }
            let threshold = cat_bins[0];
            let candidate = Candidate {
                gain,
                threshold,
                default_left: false,
                left_sum_gradient: sum_left_gradient,
                left_sum_hessian: sum_left_hessian,
                right_sum_gradient: sum_right_gradient,
                right_sum_hessian: sum_right_hessian,
                left_count,
                right_count,
                cat_bins,
            };
            if best.as_ref().map_or(true, |b| candidate.better_than(b)) {
                *best = Some(candidate);
            }
        };

        if used.len() <= params.max_cat_to_onehot {
            // One-vs-rest.
            for &bin in &used {
                let entry = self.bins[bin];
                consider(
                    vec![bin as u32],
                    entry.sum_gradients,
                    entry.sum_hessians + K_EPSILON,
                    round_count(entry.sum_hessians, cnt_factor),
                    &mut best,
                );
            }
        } else {
            // Sort by gradient/hessian ratio, scan prefixes from both ends.
            let mut sorted = used;
            sorted.sort_by(|&a, &b| {
                let ra = self.bins[a].sum_gradients / (self.bins[a].sum_hessians + params.lambda_l2);
                let rb = self.bins[b].sum_gradients / (self.bins[b].sum_hessians + params.lambda_l2);
                ra.total_cmp(&rb).then(a.cmp(&b))
            });
            let max_take = params.max_cat_threshold.min(sorted.len() - 1);
            for backward in [false, true] {
                let mut sum_left_gradient = 0.0;
                let mut sum_left_hessian = K_EPSILON;
                let mut left_count = 0u32;
                let mut cat_bins: Vec<u32> = Vec::with_capacity(max_take);
                for i in 0..max_take {
                    let bin = if backward {
                        sorted[sorted.len() - 1 - i]
                    } else {
                        sorted[i]
                    };
                    let entry = self.bins[bin];
                    sum_left_gradient += entry.sum_gradients;
                    sum_left_hessian += entry.sum_hessians;
                    left_count += round_count(entry.sum_hessians, cnt_factor);
                    cat_bins.push(bin as u32);
                    consider(
                        cat_bins.clone(),
                        sum_left_gradient,
                        sum_left_hessian,
                        left_count,
                        &mut best,
                    );
                }
            }
        }
        best
    }

    /// Evaluate a caller-chosen threshold without searching. Used by the
    /// forced-split driver; no constraint or monotone handling applies.
    /// For categorical features the threshold is the single category bin
    /// sent left.
    #[allow(clippy::too_many_arguments)]
    pub fn gather_info_for_threshold(
        &self,
        mapper: &BinMapper,
        params: &SplitParams,
        threshold: u32,
        sum_gradients: f64,
        sum_hessians: f64,
        num_data: u32,
        out: &mut SplitInfo,
    ) {
        let sum_hessians = sum_hessians + 2.0 * K_EPSILON;
        let gain_shift = leaf_split_gain(
            sum_gradients,
            sum_hessians,
            params.lambda_l1,
            params.lambda_l2,
            params.max_delta_step,
        );
        let cnt_factor = num_data as f64 / sum_hessians;
        let unbounded = ConstraintEntry::unbounded();

        let fill = |out: &mut SplitInfo,
                    gain: f64,
                    left_g: f64,
                    left_h: f64,
                    left_count: u32,
                    default_left: bool| {
            out.threshold = threshold;
            out.default_left = default_left;
            out.gain = gain - gain_shift;
            out.left_sum_gradient = left_g;
            out.left_sum_hessian = left_h;
            out.right_sum_gradient = sum_gradients - left_g;
            out.right_sum_hessian = sum_hessians - left_h;
            out.left_count = left_count;
            out.right_count = num_data.saturating_sub(left_count);
            out.left_output = constrained_output(left_g, left_h, params, unbounded);
            out.right_output = constrained_output(
                out.right_sum_gradient,
                out.right_sum_hessian,
                params,
                unbounded,
            );
        };

        match mapper.bin_type() {
            BinType::Categorical => {
                let entry = self.bins[threshold as usize];
                let left_g = entry.sum_gradients;
                let left_h = entry.sum_hessians + K_EPSILON;
                let left_count = round_count(entry.sum_hessians, cnt_factor);
                let gain = split_gains(
                    left_g,
                    left_h,
                    sum_gradients - left_g,
                    sum_hessians - left_h,
                    params,
                    unbounded,
                    0,
                );
                fill(out, gain, left_g, left_h, left_count, false);
                out.cat_threshold = vec![threshold];
            }
            BinType::Numerical => {
                let missing = mapper.missing_type() != MissingType::None;
                let default_bin = mapper.default_bin() as usize;
                let mut left_g = 0.0;
                let mut left_h = K_EPSILON;
                let mut left_count = 0u32;
                for bin in 0..=(threshold as usize).min(self.bins.len() - 1) {
                    if missing && bin == default_bin {
                        continue;
                    }
                    let entry = self.bins[bin];
                    left_g += entry.sum_gradients;
                    left_h += entry.sum_hessians;
                    left_count += round_count(entry.sum_hessians, cnt_factor);
                }
                if !missing {
                    let gain = split_gains(
                        left_g,
                        left_h,
                        sum_gradients - left_g,
                        sum_hessians - left_h,
                        params,
                        unbounded,
                        0,
                    );
                    fill(out, gain, left_g, left_h, left_count, true);
                    return;
                }
                let miss = self.bins[default_bin];
                let miss_count = round_count(miss.sum_hessians, cnt_factor);
                let with_left_g = left_g + miss.sum_gradients;
                let with_left_h = left_h + miss.sum_hessians;
                let gain_missing_left = split_gains(
                    with_left_g,
                    with_left_h,
                    sum_gradients - with_left_g,
                    sum_hessians - with_left_h,
                    params,
                    unbounded,
                    0,
                );
                let gain_missing_right = split_gains(
                    left_g,
                    left_h,
                    sum_gradients - left_g,
                    sum_hessians - left_h,
                    params,
                    unbounded,
                    0,
                );
                if gain_missing_left > gain_missing_right {
                    fill(
                        out,
                        gain_missing_left,
                        with_left_g,
                        with_left_h,
                        left_count + miss_count,
                        true,
                    );
                } else {
                    fill(out, gain_missing_right, left_g, left_h, left_count, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(g: f64, h: f64) -> HistogramEntry {
        HistogramEntry {
            sum_gradients: g,
            sum_hessians: h,
        }
    }

    fn relaxed_params() -> SplitParams {
        SplitParams {
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            max_delta_step: 0.0,
            min_gain_to_split: 0.0,
            min_data_in_leaf: 1,
            min_sum_hessian_in_leaf: 0.0,
            max_cat_threshold: 32,
            max_cat_to_onehot: 4,
        }
    }

    fn numeric_mapper(n_bins: usize) -> BinMapper {
        let mut bounds: Vec<f64> = (0..n_bins - 1).map(|b| b as f64 + 0.5).collect();
        bounds.push(f64::INFINITY);
        BinMapper::numerical(bounds, MissingType::None, 0, 0)
    }

    #[test]
    fn separable_gradients_split_at_boundary() {
        // Bins 0 with +4 gradient over 4 rows, bin 1 with -4 over 4 rows.
        let mut bins = vec![entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &numeric_mapper(2),
            &relaxed_params(),
            0,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut out,
        );
        assert!(view.is_splittable());
        assert_eq!(out.threshold, 0);
        assert!((out.gain - 8.0).abs() < 1e-9);
        assert!((out.left_output - (-1.0)).abs() < 1e-9);
        assert!((out.right_output - 1.0).abs() < 1e-9);
        assert_eq!(out.left_count, 4);
        assert_eq!(out.right_count, 4);
    }

    #[test]
    fn uniform_gradients_find_nothing() {
        let mut bins = vec![entry(2.0, 2.0), entry(2.0, 2.0), entry(2.0, 2.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &numeric_mapper(3),
            &relaxed_params(),
            0,
            ConstraintEntry::unbounded(),
            6.0,
            6.0,
            6,
            &mut out,
        );
        assert!(!view.is_splittable());
        assert!(out.gain <= 0.0 || out.gain.is_infinite());
    }

    #[test]
    fn min_data_in_leaf_blocks_unbalanced_splits() {
        let mut bins = vec![entry(3.0, 1.0), entry(-3.0, 7.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        let params = SplitParams {
            min_data_in_leaf: 2,
            ..relaxed_params()
        };
        view.find_best_threshold(
            &numeric_mapper(2),
            &params,
            0,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut out,
        );
        assert!(!view.is_splittable());
        assert_eq!(out.feature, -1);
    }

    #[test]
    fn min_hessian_blocks_light_children() {
        // Rows are balanced 4/4 but each side only carries 0.5 hessian
        // mass, below the 1.0 floor.
        let mut bins = vec![entry(3.0, 0.5), entry(-3.0, 0.5)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        let params = SplitParams {
            min_sum_hessian_in_leaf: 1.0,
            ..relaxed_params()
        };
        view.find_best_threshold(
            &numeric_mapper(2),
            &params,
            0,
            ConstraintEntry::unbounded(),
            0.0,
            1.0,
            8,
            &mut out,
        );
        assert!(!view.is_splittable());
    }

    #[test]
    fn monotone_increasing_rejects_decreasing_outputs() {
        // Left output would be +1, right -1: violates an increasing
        // constraint, so the only boundary dies.
        let mut bins = vec![entry(-4.0, 4.0), entry(4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &numeric_mapper(2),
            &relaxed_params(),
            1,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut out,
        );
        assert!(!view.is_splittable());

        // The mirrored gradient layout satisfies the constraint.
        let mut bins = vec![entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &numeric_mapper(2),
            &relaxed_params(),
            1,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut out,
        );
        assert!(view.is_splittable());
        assert_eq!(out.monotone_type, 1);
    }

    #[test]
    fn constraint_bounds_clamp_outputs() {
        let mut bins = vec![entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        let constraint = ConstraintEntry {
            min: -0.5,
            max: 0.5,
        };
        view.find_best_threshold(
            &numeric_mapper(2),
            &relaxed_params(),
            0,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut out,
        );
        let unclamped_gain = out.gain;
        let mut out2 = SplitInfo::invalid();
        let mut bins2 = vec![entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable2 = true;
        let mut view2 = FeatureHistogram::new(&mut bins2, &mut splittable2);
        view2.find_best_threshold(
            &numeric_mapper(2),
            &relaxed_params(),
            0,
            constraint,
            0.0,
            8.0,
            8,
            &mut out2,
        );
        assert!((out2.left_output + 0.5).abs() < 1e-9);
        assert!((out2.right_output - 0.5).abs() < 1e-9);
        assert!(out2.gain < unclamped_gain);
    }

    #[test]
    fn missing_direction_is_learned() {
        // Bin 0 is the zero/missing bin with strongly negative mass;
        // bins 1..3 separate cleanly. The missing mass should follow the
        // side that raises the gain.
        let mapper = BinMapper::numerical(
            vec![0.0, 1.5, f64::INFINITY],
            MissingType::Zero,
            0,
            0,
        );
        let mut bins = vec![entry(-6.0, 4.0), entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &mapper,
            &relaxed_params(),
            0,
            ConstraintEntry::unbounded(),
            -6.0,
            12.0,
            12,
            &mut out,
        );
        assert!(view.is_splittable());
        assert_eq!(out.threshold, 1);
        // Missing mass is negative, like the right side: goes right.
        assert!(!out.default_left);
        assert_eq!(out.right_count, 8);
    }

    #[test]
    fn subtract_leaves_sibling_histogram() {
        let mut parent = vec![entry(5.0, 6.0), entry(-2.0, 3.0)];
        let child = vec![entry(2.0, 2.0), entry(-1.0, 1.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut parent, &mut splittable);
        view.subtract(&child);
        assert_eq!(view.raw()[0], entry(3.0, 4.0));
        assert_eq!(view.raw()[1], entry(-1.0, 2.0));
    }

    #[test]
    fn categorical_groups_by_gradient_ratio() {
        // Categories 0 and 2 positive, 1 and 3 negative; one-hot is
        // bypassed by lowering max_cat_to_onehot.
        let mut bins = vec![
            entry(10.0, 10.0),
            entry(-10.0, 10.0),
            entry(10.0, 10.0),
            entry(-10.0, 10.0),
        ];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mapper = BinMapper::categorical(vec![0, 1, 2, 3], MissingType::None, 0, 0);
        let params = SplitParams {
            max_cat_to_onehot: 1,
            ..relaxed_params()
        };
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &mapper,
            &params,
            0,
            ConstraintEntry::unbounded(),
            0.0,
            40.0,
            40,
            &mut out,
        );
        assert!(view.is_splittable());
        assert!(out.is_categorical());
        let mut cats = out.cat_threshold.clone();
        cats.sort_unstable();
        assert!(cats == vec![1, 3] || cats == vec![0, 2]);
        assert_eq!(out.left_count, 20);
        assert_eq!(out.right_count, 20);
    }

    #[test]
    fn one_hot_categorical_isolates_best_category() {
        let mut bins = vec![entry(9.0, 3.0), entry(-1.0, 3.0), entry(-2.0, 3.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mapper = BinMapper::categorical(vec![0, 1, 2], MissingType::None, 0, 0);
        let mut out = SplitInfo::invalid();
        view.find_best_threshold(
            &mapper,
            &relaxed_params(),
            0,
            ConstraintEntry::unbounded(),
            6.0,
            9.0,
            9,
            &mut out,
        );
        assert!(out.is_categorical());
        assert_eq!(out.cat_threshold, vec![0]);
        assert!(!out.default_left);
    }

    #[test]
    fn gather_matches_search_on_the_chosen_threshold() {
        let mut bins = vec![entry(4.0, 4.0), entry(-4.0, 4.0)];
        let mut splittable = true;
        let mut view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mapper = numeric_mapper(2);
        let params = relaxed_params();
        let mut searched = SplitInfo::invalid();
        view.find_best_threshold(
            &mapper,
            &params,
            0,
            ConstraintEntry::unbounded(),
            0.0,
            8.0,
            8,
            &mut searched,
        );
        let mut gathered = SplitInfo::invalid();
        view.gather_info_for_threshold(&mapper, &params, 0, 0.0, 8.0, 8, &mut gathered);
        assert!((searched.gain - gathered.gain).abs() < 1e-9);
        assert!((searched.left_output - gathered.left_output).abs() < 1e-9);
        assert_eq!(searched.left_count, gathered.left_count);
    }

    #[test]
    fn gather_reports_negative_gain_for_bad_thresholds() {
        // All mass on one side: splitting is worthless and the gathered
        // gain must not be positive.
        let mut bins = vec![entry(2.0, 4.0), entry(2.0, 4.0), entry(2.0, 4.0)];
        let mut splittable = true;
        let view = FeatureHistogram::new(&mut bins, &mut splittable);
        let mut out = SplitInfo::invalid();
        view.gather_info_for_threshold(
            &numeric_mapper(3),
            &relaxed_params(),
            1,
            6.0,
            12.0,
            12,
            &mut out,
        );
        assert!(out.gain <= 1e-9);
    }
}
