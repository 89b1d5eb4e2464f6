use std::collections::HashSet;

use crate::data::labels::LabelTable;
use crate::data::model::SampleRecord;
use crate::params::ProcessingParameters;

use super::invoker::ScratchInput;

// Scratch-directory layout shared with the R scripts.
pub const SPECTRA_DIR: &str = "spectra";
pub const LABELS_FILE: &str = "labels.csv";
pub const TEMPLATE_FILE: &str = "template_features.csv";
pub const MATRIX_FILE: &str = "peak_intensity.csv";
pub const SPECTRUM_FILE: &str = "spectrum_data.csv";

const COMMON: &str = include_str!("scripts/common.R");
const BUILD_TEMPLATE: &str = include_str!("scripts/build_template.R");
const APPLY_TEMPLATE: &str = include_str!("scripts/apply_template.R");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Phase 1: detect and bin peaks on the training set, freeze the m/z list.
    BuildTemplate,
    /// Phase 2: measure new spectra at the frozen m/z positions.
    ApplyTemplate,
}

impl Phase {
    /// Files read back from the scratch directory after a successful run.
    pub fn outputs(&self) -> &'static [&'static str] {
        match self {
            Phase::BuildTemplate => &[MATRIX_FILE, SPECTRUM_FILE, TEMPLATE_FILE],
            Phase::ApplyTemplate => &[MATRIX_FILE, SPECTRUM_FILE],
        }
    }
}

/// Full script body for `phase` with the parameters bound as R variables.
pub fn render(phase: Phase, params: &ProcessingParameters) -> String {
    let body = match phase {
        Phase::BuildTemplate => BUILD_TEMPLATE,
        Phase::ApplyTemplate => APPLY_TEMPLATE,
    };
    format!(
        "# generated by rusty-maldi {version}\n\
         halfWindowSize <- {hw}\n\
         SNR <- {snr}\n\
         tolerance <- {tol}\n\
         iterations <- {it}\n\n\
         {COMMON}\n{body}",
        version = env!("CARGO_PKG_VERSION"),
        hw = params.half_window_size,
        snr = params.snr,
        tol = params.tolerance,
        it = params.iterations,
    )
}

/// Spectra as `spectra/<name>` inputs. Later duplicates of a name are dropped.
pub fn sample_inputs(samples: &[SampleRecord]) -> Vec<ScratchInput> {
    let mut seen = HashSet::new();
    samples
        .iter()
        .filter(|s| {
            let fresh = seen.insert(s.name.as_str());
            if !fresh {
                log::warn!("Duplicate sample name '{}' ignored", s.name);
            }
            fresh
        })
        .map(|s| ScratchInput::new(format!("{SPECTRA_DIR}/{}", s.name), s.content.clone()))
        .collect()
}

/// The validated label table as `labels.csv` (`file,group`).
pub fn labels_input(labels: &LabelTable) -> anyhow::Result<ScratchInput> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["file", "group"])?;
    for row in &labels.rows {
        writer.write_record([&row.file, &row.group])?;
    }
    Ok(ScratchInput::new(LABELS_FILE, writer.into_inner().map_err(|e| e.into_error())?))
}

/// The frozen template m/z positions as `template_features.csv` (`mz`).
pub fn template_input(features: &[f64]) -> anyhow::Result<ScratchInput> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["mz"])?;
    for mz in features {
        writer.write_record([mz.to_string()])?;
    }
    Ok(ScratchInput::new(TEMPLATE_FILE, writer.into_inner().map_err(|e| e.into_error())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::labels::LabelRow;

    #[test]
    fn parameters_are_bound_before_the_body() {
        let params = ProcessingParameters::clamped(40.0, 3.5, 0.004, 120.0);
        let script = render(Phase::BuildTemplate, &params);
        let header = script.find("halfWindowSize <- 40").unwrap();
        assert!(script.contains("SNR <- 3.5"));
        assert!(script.contains("tolerance <- 0.004"));
        assert!(script.contains("iterations <- 120"));
        assert!(header < script.find("detectPeaks").unwrap());
        assert!(script.contains("template_features.csv"));
    }

    #[test]
    fn apply_script_reads_the_template() {
        let script = render(Phase::ApplyTemplate, &ProcessingParameters::default());
        assert!(script.contains("read.csv(\"template_features.csv\")"));
        assert!(!script.contains("labels.csv"));
    }

    #[test]
    fn duplicate_sample_names_are_written_once() {
        let samples = vec![
            SampleRecord::new("a.txt", b"1".to_vec()),
            SampleRecord::new("a.txt", b"2".to_vec()),
            SampleRecord::new("b.txt", b"3".to_vec()),
        ];
        let inputs = sample_inputs(&samples);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].path.to_str(), Some("spectra/a.txt"));
        assert_eq!(inputs[0].content, b"1");
    }

    #[test]
    fn label_and_template_csv_layout() {
        let labels = LabelTable {
            rows: vec![LabelRow {
                file: "a.txt".into(),
                group: "case, severe".into(),
            }],
        };
        let input = labels_input(&labels).unwrap();
        assert_eq!(
            String::from_utf8(input.content).unwrap(),
            "file,group\na.txt,\"case, severe\"\n"
        );

        let input = template_input(&[2000.5, 3001.0]).unwrap();
        assert_eq!(String::from_utf8(input.content).unwrap(), "mz\n2000.5\n3001\n");
    }
}
