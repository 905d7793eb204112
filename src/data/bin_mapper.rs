//! Mapping between feature values and discrete bins.
//!
//! A [`BinMapper`] describes one feature's discretisation: bin boundaries
//! for numerical features, category lookup tables for categorical ones,
//! and how missing values are routed.

use std::collections::HashMap;

/// How missing values are handled for a feature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingType {
    /// The feature has no missing values.
    #[default]
    None,
    /// Zeros are treated as missing.
    Zero,
    /// NaN values get a dedicated bin (the last bin).
    NaN,
}

/// Numerical vs categorical feature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BinType {
    /// Ordered bins with upper-bound thresholds.
    #[default]
    Numerical,
    /// Unordered category bins.
    Categorical,
}

/// Per-feature bin mapping.
///
/// For numerical features a value maps to the first bin whose upper bound
/// is not exceeded. For categorical features values are category ids with
/// an explicit lookup table.
#[derive(Clone, Debug)]
pub struct BinMapper {
    /// Upper bound per bin (numerical only). The last non-missing bin's
    /// bound is `f64::INFINITY`.
    bin_upper_bounds: Box<[f64]>,
    /// Category value -> bin (categorical only).
    cat_to_bin: Option<HashMap<i32, u32>>,
    /// Bin -> category value (categorical only).
    bin_to_cat: Option<Box<[i32]>>,
    /// Number of bins, including a dedicated missing bin if present.
    n_bins: u32,
    missing_type: MissingType,
    /// Bin that missing values land in. Only meaningful when
    /// `missing_type != None`.
    default_bin: u32,
    /// Bin holding the most rows; reconstructed from leaf totals during
    /// histogram fixing.
    most_freq_bin: u32,
    bin_type: BinType,
}

impl BinMapper {
    /// Numerical mapper from bin upper bounds.
    pub fn numerical(
        bin_upper_bounds: Vec<f64>,
        missing_type: MissingType,
        default_bin: u32,
        most_freq_bin: u32,
    ) -> Self {
        let n_bins = bin_upper_bounds.len() as u32;
        debug_assert!(missing_type == MissingType::None || default_bin < n_bins);
        Self {
            bin_upper_bounds: bin_upper_bounds.into_boxed_slice(),
            cat_to_bin: None,
            bin_to_cat: None,
            n_bins,
            missing_type,
            default_bin,
            most_freq_bin,
            bin_type: BinType::Numerical,
        }
    }

    /// Categorical mapper from the list of category values, in bin order.
    pub fn categorical(
        categories: Vec<i32>,
        missing_type: MissingType,
        default_bin: u32,
        most_freq_bin: u32,
    ) -> Self {
        let n_bins = categories.len() as u32;
        let cat_to_bin = categories
            .iter()
            .enumerate()
            .map(|(bin, &cat)| (cat, bin as u32))
            .collect();
        Self {
            bin_upper_bounds: Box::new([]),
            cat_to_bin: Some(cat_to_bin),
            bin_to_cat: Some(categories.into_boxed_slice()),
            n_bins,
            missing_type,
            default_bin,
            most_freq_bin,
            bin_type: BinType::Categorical,
        }
    }

    #[inline]
    pub fn n_bins(&self) -> u32 {
        self.n_bins
    }

    #[inline]
    pub fn bin_type(&self) -> BinType {
        self.bin_type
    }

    #[inline]
    pub fn is_categorical(&self) -> bool {
        self.bin_type == BinType::Categorical
    }

    #[inline]
    pub fn missing_type(&self) -> MissingType {
        self.missing_type
    }

    #[inline]
    pub fn default_bin(&self) -> u32 {
        self.default_bin
    }

    #[inline]
    pub fn most_freq_bin(&self) -> u32 {
        self.most_freq_bin
    }

    /// A trivial feature has at most one bin and can never split.
    #[inline]
    pub fn is_trivial(&self) -> bool {
        self.n_bins <= 1
    }

    /// Map a raw value to its bin.
    pub fn value_to_bin(&self, value: f64) -> u32 {
        if value.is_nan() {
            return match self.missing_type {
                MissingType::NaN => self.n_bins - 1,
                _ => self.default_bin,
            };
        }
        if value == 0.0 && self.missing_type == MissingType::Zero {
            return self.default_bin;
        }
        if self.is_categorical() {
            let cat = value as i32;
            return self
                .cat_to_bin
                .as_ref()
                .and_then(|m| m.get(&cat).copied())
                .unwrap_or(0);
        }
        self.search_bin(value)
    }

    /// Binary search over upper bounds. The NaN bin, if present, is
    /// excluded from the searchable range.
    fn search_bin(&self, value: f64) -> u32 {
        let bounds = &self.bin_upper_bounds;
        let mut lo = 0usize;
        let mut hi = bounds.len().saturating_sub(1);
        if self.missing_type == MissingType::NaN {
            hi = hi.saturating_sub(1);
        }
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if value <= bounds[mid] {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo as u32
    }

    /// Decode a bin back into a tree-facing value: the bin's upper bound
    /// for numerical features, the category value for categorical ones.
    pub fn bin_to_value(&self, bin: u32) -> f64 {
        if self.is_categorical() {
            self.bin_to_cat
                .as_ref()
                .map(|cats| cats[bin as usize] as f64)
                .unwrap_or(0.0)
        } else {
            self.bin_upper_bounds[bin as usize]
        }
    }
}
