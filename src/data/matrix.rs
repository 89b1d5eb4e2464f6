// ---------------------------------------------------------------------------
// IntensityMatrix – samples × detected features
// ---------------------------------------------------------------------------

/// Engine output: one row per sample, one column per detected m/z feature,
/// plus the leading identifier column.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityMatrix {
    /// Header of the identifier column.
    pub id_column: String,
    pub row_ids: Vec<String>,
    /// Feature column headers (e.g. `mz_2034.55`).
    pub features: Vec<String>,
    /// Row-major values; every row has `features.len()` entries.
    pub values: Vec<Vec<f64>>,
}

/// Headline numbers shown above the charts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatrixSummary {
    pub samples: usize,
    pub features: usize,
    pub total_intensity: f64,
    /// Mean of the per-feature means.
    pub mean_intensity: f64,
}

/// Equal-width bins over the flattened intensities.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub start: f64,
    pub bin_width: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn bin_center(&self, i: usize) -> f64 {
        self.start + (i as f64 + 0.5) * self.bin_width
    }
}

/// Describe-style statistics for one feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStats {
    pub feature: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Linear-interpolated quantile of sorted data (pandas' default).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl IntensityMatrix {
    pub fn n_samples(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(move |r| r.get(col).copied())
    }

    /// All finite values, row by row.
    pub fn flattened(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied().filter(|v| v.is_finite())
    }

    /// Per-feature sums (NaN cells skipped).
    pub fn column_totals(&self) -> Vec<f64> {
        (0..self.n_features())
            .map(|c| self.column(c).filter(|v| v.is_finite()).sum())
            .collect()
    }

    pub fn summary(&self) -> MatrixSummary {
        let totals = self.column_totals();
        let means: Vec<f64> = (0..self.n_features())
            .filter_map(|c| {
                let (sum, n) = self
                    .column(c)
                    .filter(|v| v.is_finite())
                    .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (n > 0).then(|| sum / n as f64)
            })
            .collect();
        MatrixSummary {
            samples: self.n_samples(),
            features: self.n_features(),
            total_intensity: totals.iter().sum(),
            mean_intensity: if means.is_empty() {
                0.0
            } else {
                means.iter().sum::<f64>() / means.len() as f64
            },
        }
    }

    /// Indices of the `n` features with the largest total intensity,
    /// largest first.
    pub fn top_features(&self, n: usize) -> Vec<usize> {
        let totals = self.column_totals();
        let mut idx: Vec<usize> = (0..totals.len()).collect();
        idx.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]).then(a.cmp(&b)));
        idx.truncate(n);
        idx
    }

    pub fn histogram(&self, bins: usize) -> Option<Histogram> {
        let bins = bins.max(1);
        let (min, max) = self
            .flattened()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if !min.is_finite() {
            return None;
        }
        let span = max - min;
        let bin_width = if span > 0.0 { span / bins as f64 } else { 1.0 };
        let mut counts = vec![0usize; bins];
        for v in self.flattened() {
            let i = (((v - min) / bin_width) as usize).min(bins - 1);
            counts[i] += 1;
        }
        Some(Histogram {
            start: min,
            bin_width,
            counts,
        })
    }

    /// m/z of a feature column, parsed from headers like `mz_2034.5` or `2034.5`.
    pub fn feature_mz(&self, col: usize) -> Option<f64> {
        let name = self.features.get(col)?;
        let digits = name
            .trim()
            .trim_start_matches(|c: char| !c.is_ascii_digit() && c != '.');
        digits.parse().ok()
    }

    /// Mean intensity per feature plotted against m/z, sorted by m/z. Stand-in
    /// for the averaged spectrum when the engine did not write one.
    pub fn mean_profile(&self) -> Vec<[f64; 2]> {
        let n = self.n_samples().max(1) as f64;
        let totals = self.column_totals();
        let mut points: Vec<[f64; 2]> = (0..self.n_features())
            .filter_map(|c| Some([self.feature_mz(c)?, totals[c] / n]))
            .collect();
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        points
    }

    pub fn describe(&self) -> Vec<FeatureStats> {
        (0..self.n_features())
            .map(|c| {
                let mut vals: Vec<f64> = self.column(c).filter(|v| v.is_finite()).collect();
                vals.sort_by(|a, b| a.total_cmp(b));
                let count = vals.len();
                let mean = if count > 0 {
                    vals.iter().sum::<f64>() / count as f64
                } else {
                    f64::NAN
                };
                // sample standard deviation (ddof = 1)
                let std = if count > 1 {
                    (vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64)
                        .sqrt()
                } else {
                    f64::NAN
                };
                FeatureStats {
                    feature: self.features[c].clone(),
                    count,
                    mean,
                    std,
                    min: vals.first().copied().unwrap_or(f64::NAN),
                    q25: quantile(&vals, 0.25),
                    median: quantile(&vals, 0.5),
                    q75: quantile(&vals, 0.75),
                    max: vals.last().copied().unwrap_or(f64::NAN),
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn small() -> IntensityMatrix {
        IntensityMatrix {
            id_column: "sample".into(),
            row_ids: vec!["a".into(), "b".into()],
            features: vec!["mz_3000".into(), "mz_1000".into(), "mz_2000.5".into()],
            values: vec![vec![1.0, 10.0, 4.0], vec![3.0, 20.0, f64::NAN]],
        }
    }

    #[test]
    fn summary_counts_and_intensities() {
        let s = small().summary();
        assert_eq!(s.samples, 2);
        assert_eq!(s.features, 3);
        assert_eq!(s.total_intensity, 38.0);
        // column means 2, 15, 4
        assert!((s.mean_intensity - 7.0).abs() < 1e-12);
    }

    #[test]
    fn top_features_by_total_intensity() {
        let m = small();
        assert_eq!(m.top_features(2), vec![1, 0]); // ties keep column order
        assert_eq!(m.top_features(50).len(), 3);
    }

    #[test]
    fn histogram_covers_all_finite_values() {
        let h = small().histogram(4).unwrap();
        assert_eq!(h.counts.iter().sum::<usize>(), 5);
        assert_eq!(h.start, 1.0);
        assert_eq!(*h.counts.last().unwrap(), 1); // 20.0 lands in the last bin
    }

    #[test]
    fn histogram_of_empty_matrix_is_none() {
        let mut m = small();
        m.values.clear();
        m.row_ids.clear();
        assert!(m.histogram(10).is_none());
    }

    #[test]
    fn feature_mz_and_mean_profile() {
        let m = small();
        assert_eq!(m.feature_mz(2), Some(2000.5));
        let profile = m.mean_profile();
        assert_eq!(profile[0], [1000.0, 15.0]);
        assert_eq!(profile[2], [3000.0, 2.0]);
    }

    #[test]
    fn describe_matches_pandas_conventions() {
        let stats = small().describe();
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].mean, 2.0);
        assert!((stats[0].std - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats[0].q25, 1.5);
        assert_eq!(stats[2].count, 1);
        assert!(stats[2].std.is_nan());
    }
}
