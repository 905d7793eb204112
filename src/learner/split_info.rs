//! Split candidate records.

/// Everything known about one candidate split of one leaf.
///
/// `feature` is a *real* feature index; `threshold` is a bin id on that
/// feature. Child sums and counts are estimates from the histogram until
/// the partition overwrites the counts with authoritative values at split
/// time. Categorical candidates carry the left-going bins in
/// `cat_threshold` and leave `threshold` at zero.
#[derive(Clone, Debug)]
pub struct SplitInfo {
    /// Real feature index, -1 while invalid.
    pub feature: i32,
    /// Bin threshold: bins `<= threshold` go left (numerical).
    pub threshold: u32,
    /// Gain over the unsplit leaf. `-inf` marks an unusable candidate.
    pub gain: f64,
    pub left_output: f64,
    pub right_output: f64,
    pub left_sum_gradient: f64,
    pub left_sum_hessian: f64,
    pub right_sum_gradient: f64,
    pub right_sum_hessian: f64,
    pub left_count: u32,
    pub right_count: u32,
    /// Where rows with a missing value go.
    pub default_left: bool,
    /// Monotone constraint of the split feature at search time.
    pub monotone_type: i8,
    /// Left-going bins of a categorical split.
    pub cat_threshold: Vec<u32>,
}

impl Default for SplitInfo {
    fn default() -> Self {
        Self::invalid()
    }
}

impl SplitInfo {
    /// An unusable candidate; loses every comparison.
    pub fn invalid() -> Self {
        Self {
            feature: -1,
            threshold: 0,
            gain: f64::NEG_INFINITY,
            left_output: 0.0,
            right_output: 0.0,
            left_sum_gradient: 0.0,
            left_sum_hessian: 0.0,
            right_sum_gradient: 0.0,
            right_sum_hessian: 0.0,
            left_count: 0,
            right_count: 0,
            default_left: true,
            monotone_type: 0,
            cat_threshold: Vec::new(),
        }
    }

    /// Reset in place to the invalid state.
    pub fn reset(&mut self) {
        *self = Self::invalid();
    }

    #[inline]
    pub fn is_categorical(&self) -> bool {
        !self.cat_threshold.is_empty()
    }

    /// Total order used by every reduction: higher gain wins; exact gain
    /// ties prefer the lower real feature index, then the lower threshold.
    /// NaN gains are treated as `-inf`.
    pub fn is_better_than(&self, other: &SplitInfo) -> bool {
        let own = if self.gain.is_nan() {
            f64::NEG_INFINITY
        } else {
            self.gain
        };
        let theirs = if other.gain.is_nan() {
            f64::NEG_INFINITY
        } else {
            other.gain
        };
        if own != theirs {
            return own > theirs;
        }
        if self.feature == -1 || other.feature == -1 {
            return other.feature == -1 && self.feature != -1;
        }
        if self.feature != other.feature {
            return self.feature < other.feature;
        }
        self.threshold < other.threshold
    }
}

/// Reduction step: keep the better of two candidates.
pub fn better_split(a: SplitInfo, b: SplitInfo) -> SplitInfo {
    if b.is_better_than(&a) {
        b
    } else {
        a
    }
}
