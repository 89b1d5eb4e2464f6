use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::data::model::SampleRecord;
use crate::data::spectrum::parse_spectrum;

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Valid range, default and UI step of one numeric knob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub step: f64,
}

impl Bound {
    /// Clamp into `[min, max]`. NaN falls back to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Round to the nearest step (anchored at `min`), then clamp.
    pub fn snap(&self, value: f64) -> f64 {
        let v = self.clamp(value);
        let steps = ((v - self.min) / self.step).round();
        self.clamp(self.min + steps * self.step)
    }

    pub fn range(&self) -> RangeInclusive<f64> {
        self.min..=self.max
    }
}

pub const HALF_WINDOW: Bound = Bound { min: 10.0, max: 200.0, default: 90.0, step: 10.0 };
pub const SNR: Bound = Bound { min: 1.0, max: 10.0, default: 2.0, step: 0.5 };
pub const TOLERANCE: Bound = Bound { min: 0.001, max: 0.02, default: 0.008, step: 0.001 };
pub const ITERATIONS: Bound = Bound { min: 50.0, max: 200.0, default: 100.0, step: 10.0 };

// ---------------------------------------------------------------------------
// ProcessingParameters
// ---------------------------------------------------------------------------

/// The four user-tunable knobs handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessingParameters {
    pub half_window_size: u32,
    #[serde(rename = "SNR")]
    pub snr: f64,
    pub tolerance: f64,
    pub iterations: u32,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            half_window_size: HALF_WINDOW.default as u32,
            snr: SNR.default,
            tolerance: TOLERANCE.default,
            iterations: ITERATIONS.default as u32,
        }
    }
}

impl ProcessingParameters {
    /// Build from arbitrary user input; out-of-range values are clamped.
    pub fn clamped(half_window_size: f64, snr: f64, tolerance: f64, iterations: f64) -> Self {
        Self {
            half_window_size: HALF_WINDOW.clamp(half_window_size).round() as u32,
            snr: SNR.clamp(snr),
            tolerance: TOLERANCE.clamp(tolerance),
            iterations: ITERATIONS.clamp(iterations).round() as u32,
        }
    }

    /// Re-clamp in place (after deserialising or UI edits).
    pub fn clamp(&mut self) {
        *self = Self::clamped(
            self.half_window_size as f64,
            self.snr,
            self.tolerance,
            self.iterations as f64,
        );
    }

    /// `(parameter, value)` rows for the parameters table and its CSV export.
    pub fn table(&self) -> Vec<(&'static str, String)> {
        vec![
            ("halfWindowSize", self.half_window_size.to_string()),
            ("SNR", format!("{}", self.snr)),
            ("tolerance", format!("{}", self.tolerance)),
            ("iterations", self.iterations.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Manual vs. estimated parameters
// ---------------------------------------------------------------------------

/// Derive parameters from the uploaded spectra.
pub trait ParameterEstimator {
    fn estimate(&self, samples: &[SampleRecord]) -> ProcessingParameters;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    Manual,
    Auto,
}

/// Holds the user's manual values and the mode flag. In `Auto` mode the
/// manual values are kept but ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterConfig {
    pub mode: ParameterMode,
    pub manual: ProcessingParameters,
}

impl ParameterConfig {
    pub fn new(mode: ParameterMode, mut manual: ProcessingParameters) -> Self {
        manual.clamp();
        Self { mode, manual }
    }

    /// The parameters a run must use.
    pub fn resolve(
        &self,
        samples: &[SampleRecord],
        estimator: &dyn ParameterEstimator,
    ) -> ProcessingParameters {
        match self.mode {
            ParameterMode::Manual => self.manual,
            ParameterMode::Auto => {
                let mut p = estimator.estimate(samples);
                p.clamp();
                log::info!("Estimated parameters: {p:?}");
                p
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Heuristic estimator
// ---------------------------------------------------------------------------

/// Scales the defaults by simple properties of the raw spectra: point count
/// drives the window sizes, the median adjacent m/z spacing drives the
/// alignment tolerance, and the robust noise level drives the SNR threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectrumHeuristics;

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

impl ParameterEstimator for SpectrumHeuristics {
    fn estimate(&self, samples: &[SampleRecord]) -> ProcessingParameters {
        let spectra: Vec<_> = samples
            .iter()
            .filter_map(|s| match parse_spectrum(s) {
                Ok(sp) if sp.len() > 2 => Some(sp),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Skipping sample in parameter estimation: {e:#}");
                    None
                }
            })
            .collect();
        if spectra.is_empty() {
            return ProcessingParameters::default();
        }

        let mut points: Vec<f64> = spectra.iter().map(|s| s.len() as f64).collect();
        let points = median(&mut points).unwrap_or(0.0);

        let mut rel_spacing: Vec<f64> = spectra
            .iter()
            .flat_map(|s| {
                s.mz.windows(2)
                    .filter(|w| w[0] > 0.0)
                    .map(|w| (w[1] - w[0]).abs() / w[0])
            })
            .collect();
        let rel_spacing = median(&mut rel_spacing);

        let mut noise_ratio: Vec<f64> = spectra
            .iter()
            .filter_map(|s| {
                let mut y = s.intensity.clone();
                let med = median(&mut y)?;
                let mut dev: Vec<f64> = y.iter().map(|v| (v - med).abs()).collect();
                let mad = median(&mut dev)?;
                (med > 0.0).then_some(mad / med)
            })
            .collect();
        let noise_ratio = median(&mut noise_ratio).unwrap_or(0.0);

        ProcessingParameters {
            half_window_size: HALF_WINDOW.snap(points / 200.0).round() as u32,
            snr: SNR.snap(SNR.default * (1.0 + noise_ratio.min(2.0))),
            tolerance: rel_spacing
                .map(|r| TOLERANCE.snap(r * 20.0))
                .unwrap_or(TOLERANCE.default),
            iterations: ITERATIONS.snap(points / 180.0).round() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn defaults_match_bounds() {
        let p = ProcessingParameters::default();
        assert_eq!(p.half_window_size, 90);
        assert_eq!(p.snr, 2.0);
        assert_eq!(p.tolerance, 0.008);
        assert_eq!(p.iterations, 100);
    }

    #[test]
    fn out_of_range_input_is_clamped_not_rejected() {
        let p = ProcessingParameters::clamped(5.0, 50.0, -1.0, 1000.0);
        assert_eq!(p.half_window_size, 10);
        assert_eq!(p.snr, 10.0);
        assert_eq!(p.tolerance, 0.001);
        assert_eq!(p.iterations, 200);
    }

    #[test]
    fn nan_falls_back_to_default() {
        let p = ProcessingParameters::clamped(f64::NAN, f64::NAN, f64::NAN, f64::NAN);
        assert_eq!(p, ProcessingParameters::default());
    }

    #[test]
    fn manual_mode_ignores_estimator() {
        struct Fixed;
        impl ParameterEstimator for Fixed {
            fn estimate(&self, _: &[SampleRecord]) -> ProcessingParameters {
                ProcessingParameters::clamped(200.0, 10.0, 0.02, 200.0)
            }
        }
        let manual = ProcessingParameters::clamped(40.0, 3.0, 0.005, 60.0);
        let cfg = ParameterConfig::new(ParameterMode::Manual, manual);
        assert_eq!(cfg.resolve(&[], &Fixed), manual);

        let auto = ParameterConfig::new(ParameterMode::Auto, manual);
        assert_eq!(auto.resolve(&[], &Fixed).half_window_size, 200);
    }

    #[test]
    fn heuristics_follow_point_count() {
        let body: String = (0..18_000)
            .map(|i| format!("{} {}\n", 2000.0 + i as f64 * 0.5, 100 + (i % 7)))
            .collect();
        let samples = vec![SampleRecord::new("s.txt", body.into_bytes())];
        let p = SpectrumHeuristics.estimate(&samples);
        assert_eq!(p.half_window_size, 90);
        assert_eq!(p.iterations, 100);
        assert!(TOLERANCE.range().contains(&p.tolerance));
        assert!(SNR.range().contains(&p.snr));
    }

    #[test]
    fn heuristics_without_usable_spectra_use_defaults() {
        let samples = vec![SampleRecord::new("bad.txt", b"no numbers".to_vec())];
        assert_eq!(
            SpectrumHeuristics.estimate(&samples),
            ProcessingParameters::default()
        );
    }

    #[test]
    fn parameter_table_names_match_engine_variables() {
        let names: Vec<_> = ProcessingParameters::default()
            .table()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["halfWindowSize", "SNR", "tolerance", "iterations"]);
    }

    proptest! {
        #[test]
        fn clamped_values_stay_within_bounds(
            hw in proptest::num::f64::ANY,
            snr in proptest::num::f64::ANY,
            tol in proptest::num::f64::ANY,
            it in proptest::num::f64::ANY,
        ) {
            let p = ProcessingParameters::clamped(hw, snr, tol, it);
            prop_assert!(HALF_WINDOW.range().contains(&(p.half_window_size as f64)));
            prop_assert!(SNR.range().contains(&p.snr));
            prop_assert!(TOLERANCE.range().contains(&p.tolerance));
            prop_assert!(ITERATIONS.range().contains(&(p.iterations as f64)));
        }
    }
}
