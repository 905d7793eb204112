//! Pre-binned training dataset.
//!
//! The learner never sees raw feature values: every feature is discretised
//! into integer bins up front, and the dataset exposes exactly the surface
//! the learner consumes — feature index translation, threshold decoding,
//! and histogram construction over a row subset.
//!
//! Two feature index spaces coexist. The *real* index is the caller's
//! column number; the *inner* index is dense over the features that
//! survived binning (trivial single-bin features are dropped).
//!
//! # Histogram construction
//!
//! Histograms accumulate `(sum_gradients, sum_hessians)` per bin in `f64`.
//! Gradients are pre-gathered into partition order ("ordered gradients")
//! so the hot loop reads them sequentially, and the column-wise layout is
//! feature-parallel: each feature owns a disjoint slice of the output
//! bank, handed out by splitting the bank up front.

use rayon::prelude::*;

use super::bin_mapper::{BinMapper, MissingType};

/// One histogram bin: gradient and hessian sums.
///
/// `f64` accumulation is deliberate — the subtraction trick produces small
/// differences of large sums, which `f32` cannot hold accurately.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistogramEntry {
    pub sum_gradients: f64,
    pub sum_hessians: f64,
}

/// Size of one histogram entry in bytes, used for pool sizing.
pub const HIST_ENTRY_SIZE: usize = std::mem::size_of::<HistogramEntry>();

/// Bin storage for one feature, width chosen from the bin count.
#[derive(Clone, Debug)]
enum BinColumn {
    U8(Box<[u8]>),
    U16(Box<[u16]>),
}

impl BinColumn {
    #[inline]
    fn get(&self, row: usize) -> u32 {
        match self {
            BinColumn::U8(bins) => bins[row] as u32,
            BinColumn::U16(bins) => bins[row] as u32,
        }
    }

    fn from_bins(bins: &[u32], n_bins: u32) -> Self {
        if n_bins <= u8::MAX as u32 + 1 {
            BinColumn::U8(bins.iter().map(|&b| b as u8).collect())
        } else {
            BinColumn::U16(bins.iter().map(|&b| b as u16).collect())
        }
    }
}

/// A kept (inner) feature: its bins plus the mapper describing them.
#[derive(Clone, Debug)]
struct FeatureColumn {
    bins: BinColumn,
    mapper: BinMapper,
}

/// Histogram construction layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistLayout {
    /// One pass per feature over its bin column (feature-parallel).
    ColWise,
    /// One pass over rows touching every feature (needs the row-major
    /// mirror from [`Dataset::init_train`]).
    RowWise,
}

/// Reusable per-learner scratch for histogram construction.
///
/// Holds the row-major bin mirror for the row-wise layout. Built once per
/// dataset binding, reused across trees.
#[derive(Debug, Default)]
pub struct TrainScratch {
    row_bins: Vec<u16>,
    built: bool,
}

impl TrainScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any built state, e.g. when the dataset changes.
    pub fn invalidate(&mut self) {
        self.row_bins.clear();
        self.built = false;
    }
}

/// Pre-binned dataset consumed by the tree learner.
#[derive(Clone, Debug)]
pub struct Dataset {
    n_rows: usize,
    features: Vec<FeatureColumn>,
    /// Real index per inner feature.
    inner_to_real: Vec<usize>,
    /// Inner index per real feature, -1 for dropped features.
    real_to_inner: Vec<i32>,
    /// Offset of each inner feature's bins inside a histogram bank.
    bin_offsets: Vec<usize>,
    total_bins: usize,
}

impl Dataset {
    pub(crate) fn from_parts(
        n_rows: usize,
        kept: Vec<(usize, Vec<u32>, BinMapper)>,
        num_total_features: usize,
    ) -> Self {
        let mut features = Vec::with_capacity(kept.len());
        let mut inner_to_real = Vec::with_capacity(kept.len());
        let mut real_to_inner = vec![-1i32; num_total_features];
        let mut bin_offsets = Vec::with_capacity(kept.len());
        let mut total_bins = 0usize;

        for (inner, (real, bins, mapper)) in kept.into_iter().enumerate() {
            real_to_inner[real] = inner as i32;
            inner_to_real.push(real);
            bin_offsets.push(total_bins);
            total_bins += mapper.n_bins() as usize;
            features.push(FeatureColumn {
                bins: BinColumn::from_bins(&bins, mapper.n_bins()),
                mapper,
            });
        }

        Self {
            n_rows,
            features,
            inner_to_real,
            real_to_inner,
            bin_offsets,
            total_bins,
        }
    }

    /// Number of rows.
    #[inline]
    pub fn num_data(&self) -> usize {
        self.n_rows
    }

    /// Number of kept (inner) features.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Real indices of the kept features.
    pub fn valid_feature_indices(&self) -> Vec<usize> {
        self.inner_to_real.clone()
    }

    /// Translate a real feature index to its inner index, or -1 if the
    /// feature was dropped during binning.
    #[inline]
    pub fn inner_feature_index(&self, real: usize) -> i32 {
        self.real_to_inner.get(real).copied().unwrap_or(-1)
    }

    /// Translate an inner feature index back to the caller's space.
    #[inline]
    pub fn real_feature_index(&self, inner: usize) -> usize {
        self.inner_to_real[inner]
    }

    /// Bin count of an inner feature.
    #[inline]
    pub fn feature_num_bin(&self, inner: usize) -> u32 {
        self.features[inner].mapper.n_bins()
    }

    /// Bin mapper of an inner feature.
    #[inline]
    pub fn feature_bin_mapper(&self, inner: usize) -> &BinMapper {
        &self.features[inner].mapper
    }

    /// Map a raw threshold value onto the feature's bin space.
    #[inline]
    pub fn bin_threshold(&self, inner: usize, value: f64) -> u32 {
        self.features[inner].mapper.value_to_bin(value)
    }

    /// Decode a bin threshold into the tree-facing raw value.
    #[inline]
    pub fn real_threshold(&self, inner: usize, bin: u32) -> f64 {
        self.features[inner].mapper.bin_to_value(bin)
    }

    /// Bin of `row` for an inner feature.
    #[inline]
    pub fn bin(&self, row: usize, inner: usize) -> u32 {
        self.features[inner].bins.get(row)
    }

    /// Per-feature offsets into a histogram bank.
    #[inline]
    pub fn bin_offsets(&self) -> &[usize] {
        &self.bin_offsets
    }

    /// Total bins across all inner features (bank length).
    #[inline]
    pub fn total_bins(&self) -> usize {
        self.total_bins
    }

    /// Histogram bank footprint in bytes, used to size the pool.
    #[inline]
    pub fn histogram_bytes(&self) -> usize {
        self.total_bins * HIST_ENTRY_SIZE
    }

    /// Choose the histogram layout. Force flags win; otherwise column-wise
    /// is kept unless the feature count is large enough that a single row
    /// pass beats many column passes.
    pub fn choose_layout(&self, force_col_wise: bool, force_row_wise: bool) -> HistLayout {
        if force_col_wise {
            return HistLayout::ColWise;
        }
        if force_row_wise {
            return HistLayout::RowWise;
        }
        if self.num_features() >= 256 {
            HistLayout::RowWise
        } else {
            HistLayout::ColWise
        }
    }

    /// Per-tree preparation: materialise the row-major mirror when the
    /// row-wise layout is in use.
    pub fn init_train(
        &self,
        _used_features: &[bool],
        layout: HistLayout,
        scratch: &mut TrainScratch,
    ) {
        if layout != HistLayout::RowWise || scratch.built {
            return;
        }
        let n_features = self.num_features();
        scratch.row_bins.resize(self.n_rows * n_features, 0);
        for (inner, feature) in self.features.iter().enumerate() {
            for row in 0..self.n_rows {
                scratch.row_bins[row * n_features + inner] = feature.bins.get(row) as u16;
            }
        }
        scratch.built = true;
    }

    /// Populate bin histograms for the enabled features over a row subset.
    ///
    /// `rows == None` means all rows (the full-data root). Gradients are
    /// gathered into `ordered_gradients` / `ordered_hessians` in partition
    /// order first; with a constant hessian the hessian gather is skipped
    /// and `hessians[0]` is added per row.
    ///
    /// Only the enabled features' bank regions are written (zeroed, then
    /// accumulated); disabled regions are left untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn construct_histograms(
        &self,
        used_features: &[bool],
        rows: Option<&[u32]>,
        gradients: &[f32],
        hessians: &[f32],
        ordered_gradients: &mut Vec<f32>,
        ordered_hessians: &mut Vec<f32>,
        constant_hessian: bool,
        layout: HistLayout,
        scratch: &TrainScratch,
        out: &mut [HistogramEntry],
    ) {
        debug_assert_eq!(out.len(), self.total_bins);
        let hess_const = if constant_hessian {
            hessians.first().copied().unwrap_or(1.0)
        } else {
            0.0
        };

        // Gather gradients into partition order once, shared by every
        // feature pass.
        let (grad, hess): (&[f32], &[f32]) = match rows {
            None => (gradients, hessians),
            Some(rows) => {
                ordered_gradients.clear();
                ordered_gradients.extend(rows.iter().map(|&r| gradients[r as usize]));
                if !constant_hessian {
                    ordered_hessians.clear();
                    ordered_hessians.extend(rows.iter().map(|&r| hessians[r as usize]));
                }
                (&ordered_gradients[..], &ordered_hessians[..])
            }
        };

        match layout {
            HistLayout::ColWise => self.construct_col_wise(
                used_features,
                rows,
                grad,
                hess,
                constant_hessian,
                hess_const,
                out,
            ),
            HistLayout::RowWise => self.construct_row_wise(
                used_features,
                rows,
                grad,
                hess,
                constant_hessian,
                hess_const,
                scratch,
                out,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn construct_col_wise(
        &self,
        used_features: &[bool],
        rows: Option<&[u32]>,
        grad: &[f32],
        hess: &[f32],
        constant_hessian: bool,
        hess_const: f32,
        out: &mut [HistogramEntry],
    ) {
        // Hand each enabled feature its disjoint bank slice.
        let mut tasks: Vec<(usize, &mut [HistogramEntry])> = Vec::new();
        let mut rest: &mut [HistogramEntry] = out;
        for (inner, feature) in self.features.iter().enumerate() {
            let n_bins = feature.mapper.n_bins() as usize;
            let tail = std::mem::take(&mut rest);
            let (slice, tail) = tail.split_at_mut(n_bins);
            rest = tail;
            if used_features[inner] {
                tasks.push((inner, slice));
            }
        }

        let n_rows = rows.map_or(self.n_rows, |r| r.len());
        let parallel = n_rows >= 1024 && tasks.len() >= 4 && rayon::current_num_threads() > 1;

        let build = |(inner, slice): &mut (usize, &mut [HistogramEntry])| {
            slice.fill(HistogramEntry::default());
            let column = &self.features[*inner].bins;
            match rows {
                None => {
                    for row in 0..self.n_rows {
                        let bin = column.get(row) as usize;
                        let h = if constant_hessian { hess_const } else { hess[row] };
                        let entry = &mut slice[bin];
                        entry.sum_gradients += grad[row] as f64;
                        entry.sum_hessians += h as f64;
                    }
                }
                Some(rows) => {
                    for (i, &row) in rows.iter().enumerate() {
                        let bin = column.get(row as usize) as usize;
                        let h = if constant_hessian { hess_const } else { hess[i] };
                        let entry = &mut slice[bin];
                        entry.sum_gradients += grad[i] as f64;
                        entry.sum_hessians += h as f64;
                    }
                }
            }
        };

        if parallel {
            tasks.par_iter_mut().for_each(build);
        } else {
            tasks.iter_mut().for_each(build);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn construct_row_wise(
        &self,
        used_features: &[bool],
        rows: Option<&[u32]>,
        grad: &[f32],
        hess: &[f32],
        constant_hessian: bool,
        hess_const: f32,
        scratch: &TrainScratch,
        out: &mut [HistogramEntry],
    ) {
        debug_assert!(
            scratch.built,
            "init_train must run before row-wise construction"
        );
        let n_features = self.num_features();

        for (inner, &used) in used_features.iter().enumerate() {
            if used {
                let offset = self.bin_offsets[inner];
                let n_bins = self.features[inner].mapper.n_bins() as usize;
                out[offset..offset + n_bins].fill(HistogramEntry::default());
            }
        }

        let mut add_row = |row: usize, g: f32, h: f32| {
            let row_bins = &scratch.row_bins[row * n_features..(row + 1) * n_features];
            for (inner, &bin) in row_bins.iter().enumerate() {
                if !used_features[inner] {
                    continue;
                }
                let entry = &mut out[self.bin_offsets[inner] + bin as usize];
                entry.sum_gradients += g as f64;
                entry.sum_hessians += h as f64;
            }
        };

        match rows {
            None => {
                for row in 0..self.n_rows {
                    let h = if constant_hessian { hess_const } else { hess[row] };
                    add_row(row, grad[row], h);
                }
            }
            Some(rows) => {
                for (i, &row) in rows.iter().enumerate() {
                    let h = if constant_hessian { hess_const } else { hess[i] };
                    add_row(row as usize, grad[i], h);
                }
            }
        }
    }

    /// Reconstruct the most frequent bin of a feature's histogram so the
    /// bank sums to the leaf totals.
    pub fn fix_histogram(
        &self,
        inner: usize,
        sum_gradients: f64,
        sum_hessians: f64,
        hist: &mut [HistogramEntry],
    ) {
        let mfb = self.features[inner].mapper.most_freq_bin() as usize;
        let mut rest_grad = 0.0;
        let mut rest_hess = 0.0;
        for (bin, entry) in hist.iter().enumerate() {
            if bin != mfb {
                rest_grad += entry.sum_gradients;
                rest_hess += entry.sum_hessians;
            }
        }
        hist[mfb] = HistogramEntry {
            sum_gradients: sum_gradients - rest_grad,
            sum_hessians: sum_hessians - rest_hess,
        };
    }

    /// Whether `bin` is the missing bin of an inner feature.
    #[inline]
    pub fn is_missing_bin(&self, inner: usize, bin: u32) -> bool {
        let mapper = &self.features[inner].mapper;
        mapper.missing_type() != MissingType::None && bin == mapper.default_bin()
    }
}
