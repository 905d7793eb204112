//! Dataset construction.
//!
//! Features are added column by column, binned eagerly, and assembled into
//! a [`Dataset`]. Numerical features get quantile-style cut points capped
//! at `max_bin`; exact boundaries are used when the distinct value count
//! fits. Trivial features (a single bin) are dropped from the inner index
//! space at build time.

use thiserror::Error;

use super::bin_mapper::{BinMapper, MissingType};
use super::dataset::Dataset;

/// Errors raised while assembling a dataset.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dataset has no features")]
    Empty,
    #[error("feature {feature} has {actual} rows, expected {expected}")]
    RowCountMismatch {
        feature: usize,
        expected: usize,
        actual: usize,
    },
}

/// Incremental builder for [`Dataset`].
pub struct DatasetBuilder {
    max_bin: usize,
    n_rows: Option<usize>,
    /// Per real feature: assigned bins plus the mapper.
    pending: Vec<(Vec<u32>, BinMapper)>,
}

impl DatasetBuilder {
    /// Create a builder; `max_bin` caps the bin count per numerical
    /// feature (a dedicated NaN bin may be added on top).
    pub fn new(max_bin: usize) -> Self {
        Self {
            max_bin: max_bin.max(2),
            n_rows: None,
            pending: Vec::new(),
        }
    }

    /// Add a numerical feature from raw values.
    pub fn push_numerical(&mut self, values: &[f64], missing_type: MissingType) -> &mut Self {
        let has_nan = values.iter().any(|v| v.is_nan());
        let missing_type = match missing_type {
            MissingType::NaN if !has_nan => MissingType::None,
            other => other,
        };

        let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        finite.sort_unstable_by(|a, b| a.total_cmp(b));
        finite.dedup();

        let nan_bin = missing_type == MissingType::NaN;
        let budget = if nan_bin { self.max_bin - 1 } else { self.max_bin };

        let mut bounds = if finite.len() <= budget {
            // Exact boundaries: midpoints between consecutive distinct values.
            let mut bounds: Vec<f64> = finite
                .windows(2)
                .map(|pair| (pair[0] + pair[1]) / 2.0)
                .collect();
            bounds.push(f64::INFINITY);
            bounds
        } else {
            quantile_bounds(&finite, budget)
        };

        if nan_bin {
            bounds.push(f64::NAN);
        }
        let n_bins = bounds.len() as u32;

        let default_bin = match missing_type {
            MissingType::NaN => n_bins - 1,
            MissingType::Zero => {
                // Bin holding zero, located with a neutral mapper.
                BinMapper::numerical(bounds.clone(), MissingType::None, 0, 0).value_to_bin(0.0)
            }
            MissingType::None => 0,
        };

        let mapper = BinMapper::numerical(bounds, missing_type, default_bin, 0);
        let bins: Vec<u32> = values.iter().map(|&v| mapper.value_to_bin(v)).collect();
        let most_freq = most_frequent_bin(&bins, n_bins);
        let mapper = BinMapper::numerical(
            bounds_of(&mapper),
            missing_type,
            default_bin,
            most_freq,
        );
        self.push_raw(bins, mapper)
    }

    /// Add a categorical feature; values are category ids.
    pub fn push_categorical(&mut self, values: &[f64]) -> &mut Self {
        let mut categories: Vec<i32> = values
            .iter()
            .filter(|v| !v.is_nan())
            .map(|&v| v as i32)
            .collect();
        categories.sort_unstable();
        categories.dedup();

        let mapper = BinMapper::categorical(categories.clone(), MissingType::None, 0, 0);
        let bins: Vec<u32> = values.iter().map(|&v| mapper.value_to_bin(v)).collect();
        let most_freq = most_frequent_bin(&bins, mapper.n_bins());
        let mapper = BinMapper::categorical(categories, MissingType::None, 0, most_freq);
        self.push_raw(bins, mapper)
    }

    /// Add a pre-binned feature with an explicit mapper. Intended for
    /// tests and callers that bin externally.
    pub fn push_binned(&mut self, bins: Vec<u32>, mapper: BinMapper) -> &mut Self {
        self.push_raw(bins, mapper)
    }

    fn push_raw(&mut self, bins: Vec<u32>, mapper: BinMapper) -> &mut Self {
        if self.n_rows.is_none() {
            self.n_rows = Some(bins.len());
        }
        self.pending.push((bins, mapper));
        self
    }

    /// Assemble the dataset, dropping trivial features.
    pub fn build(self) -> Result<Dataset, BuildError> {
        let n_rows = self.n_rows.ok_or(BuildError::Empty)?;
        let num_total = self.pending.len();
        let mut kept = Vec::with_capacity(num_total);
        for (real, (bins, mapper)) in self.pending.into_iter().enumerate() {
            if bins.len() != n_rows {
                return Err(BuildError::RowCountMismatch {
                    feature: real,
                    expected: n_rows,
                    actual: bins.len(),
                });
            }
            if mapper.is_trivial() {
                continue;
            }
            kept.push((real, bins, mapper));
        }
        Ok(Dataset::from_parts(n_rows, kept, num_total))
    }
}

/// Cut points at equal row-count steps over the sorted distinct values.
fn quantile_bounds(sorted: &[f64], n_bins: usize) -> Vec<f64> {
    let n = sorted.len();
    let mut bounds: Vec<f64> = (1..n_bins)
        .map(|k| {
            let pos = k * n / n_bins;
            let hi = pos.min(n - 1);
            (sorted[hi.saturating_sub(1)] + sorted[hi]) / 2.0
        })
        .collect();
    bounds.dedup();
    bounds.push(f64::INFINITY);
    bounds
}

fn most_frequent_bin(bins: &[u32], n_bins: u32) -> u32 {
    let mut counts = vec![0u32; n_bins as usize];
    for &b in bins {
        counts[b as usize] += 1;
    }
    counts
        .iter()
        .enumerate()
        .max_by_key(|&(bin, &count)| (count, std::cmp::Reverse(bin)))
        .map(|(bin, _)| bin as u32)
        .unwrap_or(0)
}

fn bounds_of(mapper: &BinMapper) -> Vec<f64> {
    (0..mapper.n_bins()).map(|b| mapper.bin_to_value(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BinType;

    #[test]
    fn exact_bounds_for_few_distinct_values() {
        let mut builder = DatasetBuilder::new(255);
        builder.push_numerical(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0], MissingType::None);
        let dataset = builder.build().unwrap();
        assert_eq!(dataset.num_features(), 1);
        assert_eq!(dataset.feature_num_bin(0), 3);
        assert_eq!(dataset.bin(0, 0), 0);
        assert_eq!(dataset.bin(2, 0), 1);
        assert_eq!(dataset.bin(5, 0), 2);
    }

    #[test]
    fn trivial_feature_is_dropped() {
        let mut builder = DatasetBuilder::new(255);
        builder.push_numerical(&[5.0; 8], MissingType::None);
        builder.push_numerical(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0], MissingType::None);
        let dataset = builder.build().unwrap();
        assert_eq!(dataset.num_features(), 1);
        assert_eq!(dataset.inner_feature_index(0), -1);
        assert_eq!(dataset.inner_feature_index(1), 0);
        assert_eq!(dataset.real_feature_index(0), 1);
        assert_eq!(dataset.valid_feature_indices(), vec![1]);
    }

    #[test]
    fn nan_values_get_their_own_bin() {
        let mut builder = DatasetBuilder::new(255);
        builder.push_numerical(&[0.0, 1.0, f64::NAN, 2.0], MissingType::NaN);
        let dataset = builder.build().unwrap();
        let mapper = dataset.feature_bin_mapper(0);
        assert_eq!(mapper.missing_type(), MissingType::NaN);
        assert_eq!(mapper.default_bin(), mapper.n_bins() - 1);
        assert_eq!(dataset.bin(2, 0), mapper.default_bin());
    }

    #[test]
    fn categorical_feature_bins_by_category() {
        let mut builder = DatasetBuilder::new(255);
        builder.push_categorical(&[3.0, 1.0, 3.0, 7.0]);
        let dataset = builder.build().unwrap();
        let mapper = dataset.feature_bin_mapper(0);
        assert_eq!(mapper.bin_type(), BinType::Categorical);
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(dataset.bin(0, 0), 1); // category 3
        assert_eq!(dataset.bin(1, 0), 0); // category 1
        assert_eq!(dataset.bin(3, 0), 2); // category 7
        assert_eq!(mapper.most_freq_bin(), 1);
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let mut builder = DatasetBuilder::new(255);
        builder.push_numerical(&[0.0, 1.0], MissingType::None);
        builder.push_numerical(&[0.0, 1.0, 2.0], MissingType::None);
        assert!(builder.build().is_err());
    }
}
