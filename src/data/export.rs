use anyhow::Result;

use super::matrix::IntensityMatrix;
use super::spectrum::Spectrum;
use crate::params::ProcessingParameters;

// ---------------------------------------------------------------------------
// CSV exports (downloadable artefacts)
// ---------------------------------------------------------------------------

pub const PARAMETERS_FILE: &str = "processing_parameters.csv";
pub const SPECTRUM_FILE: &str = "spectrum_data.csv";
pub const TEMPLATE_FILE: &str = "template.json";

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Identifier column first, then one column per feature. NaN cells are empty.
pub fn matrix_csv(matrix: &IntensityMatrix) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![matrix.id_column.as_str()];
    header.extend(matrix.features.iter().map(String::as_str));
    writer.write_record(&header)?;

    for (id, row) in matrix.row_ids.iter().zip(&matrix.values) {
        let mut record = vec![id.clone()];
        record.extend(row.iter().map(|v| {
            if v.is_nan() {
                String::new()
            } else {
                v.to_string()
            }
        }));
        writer.write_record(&record)?;
    }
    finish(writer)
}

/// `parameter,value` rows.
pub fn parameters_csv(params: &ProcessingParameters) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["parameter", "value"])?;
    for (name, value) in params.table() {
        writer.write_record([name, value.as_str()])?;
    }
    finish(writer)
}

/// `mz,intensity` rows.
pub fn spectrum_csv(spectrum: &Spectrum) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["mz", "intensity"])?;
    for (mz, y) in spectrum.mz.iter().zip(&spectrum.intensity) {
        writer.write_record([mz.to_string(), y.to_string()])?;
    }
    finish(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::{matrix_from_csv, spectrum_from_csv};
    use crate::data::matrix::tests::small;

    #[test]
    fn matrix_export_is_readable_by_the_loader() {
        let m = small();
        let bytes = matrix_csv(&m).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("sample,mz_3000,mz_1000,mz_2000.5\na,1,10,4\nb,3,20,\n"));

        let back = matrix_from_csv(bytes.as_slice()).unwrap();
        assert_eq!(back.row_ids, m.row_ids);
        assert_eq!(back.values[0], m.values[0]);
        assert!(back.values[1][2].is_nan());
    }

    #[test]
    fn parameters_table() {
        let text = String::from_utf8(parameters_csv(&ProcessingParameters::default()).unwrap())
            .unwrap();
        assert_eq!(
            text,
            "parameter,value\nhalfWindowSize,90\nSNR,2\ntolerance,0.008\niterations,100\n"
        );
    }

    #[test]
    fn spectrum_table() {
        let sp = Spectrum {
            mz: vec![1000.0, 1000.5],
            intensity: vec![1.25, 0.0],
        };
        let bytes = spectrum_csv(&sp).unwrap();
        assert_eq!(spectrum_from_csv(bytes.as_slice()).unwrap(), sp);
    }
}
