use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::matrix::IntensityMatrix;
use super::spectrum::Spectrum;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a previously exported intensity matrix. Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row; first column is the sample identifier,
///                every other column one m/z feature
/// * `.parquet` – same layout; identifier column of any type, numeric features
pub fn load_matrix_file(path: &Path) -> Result<IntensityMatrix> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => {
            let file = std::fs::File::open(path).context("opening CSV")?;
            matrix_from_csv(file)
        }
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV loaders (engine outputs)
// ---------------------------------------------------------------------------

/// Numeric cell; empty, `NA` and `NaN` cells become NaN.
fn parse_cell(s: &str, row: usize, col: &str) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    s.parse::<f64>()
        .with_context(|| format!("Row {row}, column '{col}': '{s}' is not a number"))
}

pub fn matrix_from_csv<R: Read>(input: R) -> Result<IntensityMatrix> {
    let mut reader = csv::Reader::from_reader(input);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let Some((id_column, features)) = headers.split_first() else {
        bail!("CSV has no columns");
    };

    let mut row_ids = Vec::new();
    let mut values = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: expected {} fields, found {}",
                headers.len(),
                record.len()
            );
        }
        row_ids.push(record.get(0).unwrap_or("").to_string());
        let row = features
            .iter()
            .enumerate()
            .map(|(i, col)| parse_cell(record.get(i + 1).unwrap_or(""), row_no, col))
            .collect::<Result<Vec<f64>>>()?;
        values.push(row);
    }

    Ok(IntensityMatrix {
        id_column: id_column.clone(),
        row_ids,
        features: features.to_vec(),
        values,
    })
}

/// `mz,intensity` table written by the engine (averaged spectrum).
pub fn spectrum_from_csv<R: Read>(input: R) -> Result<Spectrum> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let mz_idx = headers
        .iter()
        .position(|h| h == "mz")
        .context("CSV missing 'mz' column")?;
    let y_idx = headers
        .iter()
        .position(|h| h == "intensity")
        .context("CSV missing 'intensity' column")?;

    let mut spectrum = Spectrum::default();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        spectrum
            .mz
            .push(parse_cell(record.get(mz_idx).unwrap_or(""), row_no, "mz")?);
        spectrum
            .intensity
            .push(parse_cell(record.get(y_idx).unwrap_or(""), row_no, "intensity")?);
    }
    Ok(spectrum)
}

/// Single `mz` column of template feature positions.
pub fn template_features_from_csv<R: Read>(input: R) -> Result<Vec<f64>> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let idx = headers
        .iter()
        .position(|h| h == "mz")
        .context("CSV missing 'mz' column")?;

    let mut features = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let mz = parse_cell(record.get(idx).unwrap_or(""), row_no, "mz")?;
        if mz.is_finite() {
            features.push(mz);
        }
    }
    Ok(features)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load an intensity matrix from Parquet.
///
/// Expected schema:
/// - first column: sample identifier (string, integer, float or bool)
/// - remaining columns: Float64 / Float32 / Int64 / Int32 intensities
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path) -> Result<IntensityMatrix> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let schema = builder.schema().clone();
    let fields = schema.fields();
    if fields.is_empty() {
        bail!("Parquet file has no columns");
    }
    let id_column = fields[0].name().clone();
    let features: Vec<String> = fields.iter().skip(1).map(|f| f.name().clone()).collect();

    let reader = builder.build().context("building parquet reader")?;

    let mut row_ids = Vec::new();
    let mut values = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let ids = batch.column(0);

        for row in 0..batch.num_rows() {
            row_ids.push(extract_id(ids, row));
            let cells = (1..batch.num_columns())
                .map(|c| {
                    extract_f64(batch.column(c), row)
                        .with_context(|| format!("Row {row}: column '{}'", features[c - 1]))
                })
                .collect::<Result<Vec<f64>>>()?;
            values.push(cells);
        }
    }

    Ok(IntensityMatrix {
        id_column,
        row_ids,
        features,
        values,
    })
}

// -- Parquet / Arrow helpers --

/// Read one numeric cell; nulls become NaN.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        return Ok(f64::NAN);
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        Ok(arr.value(row))
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        Ok(arr.value(row) as f64)
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        Ok(arr.value(row) as f64)
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        Ok(arr.value(row) as f64)
    } else {
        bail!("expected a numeric column, got {:?}", col.data_type())
    }
}

/// Render the identifier cell as text.
fn extract_id(col: &Arc<dyn Array>, row: usize) -> String {
    if col.is_null(row) {
        return String::new();
    }
    match col.data_type() {
        DataType::Utf8 => col.as_string::<i32>().value(row).to_string(),
        DataType::LargeUtf8 => col.as_string::<i64>().value(row).to_string(),
        DataType::Boolean => col
            .as_any()
            .downcast_ref::<BooleanArray>()
            .map(|a| a.value(row).to_string())
            .unwrap_or_default(),
        _ => match extract_f64(col, row) {
            Ok(v) => format!("{v}"),
            Err(_) => format!("{:?}", col.data_type()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::array::StringArray;
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    #[test]
    fn matrix_csv_roundtrips_identifier_and_features() {
        let csv = "sample,mz_2000.1,mz_3000.2\nA,1.5,NA\nB,2,3\n";
        let m = matrix_from_csv(csv.as_bytes()).unwrap();
        assert_eq!(m.id_column, "sample");
        assert_eq!(m.row_ids, vec!["A", "B"]);
        assert_eq!(m.features, vec!["mz_2000.1", "mz_3000.2"]);
        assert_eq!(m.values[1], vec![2.0, 3.0]);
        assert!(m.values[0][1].is_nan());
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        let csv = "sample,mz_1\nA,abc\n";
        let err = matrix_from_csv(csv.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("not a number"));
    }

    #[test]
    fn spectrum_and_template_tables() {
        let sp = spectrum_from_csv("\"mz\",\"intensity\"\n1000,5\n1001,6\n".as_bytes()).unwrap();
        assert_eq!(sp.mz, vec![1000.0, 1001.0]);
        assert_eq!(sp.intensity, vec![5.0, 6.0]);

        let t = template_features_from_csv("\"mz\"\n2000.5\nNA\n3000\n".as_bytes()).unwrap();
        assert_eq!(t, vec![2000.5, 3000.0]);
    }

    #[test]
    fn unsupported_extension() {
        assert!(load_matrix_file(Path::new("result.xlsx")).is_err());
    }

    #[test]
    fn parquet_matrix_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("sample", DataType::Utf8, false),
            Field::new("mz_1000", DataType::Float64, true),
            Field::new("mz_2000", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["A", "B"])),
                Arc::new(Float64Array::from(vec![Some(1.0), None])),
                Arc::new(Int64Array::from(vec![7, 8])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let m = load_matrix_file(&path).unwrap();
        assert_eq!(m.id_column, "sample");
        assert_eq!(m.row_ids, vec!["A", "B"]);
        assert_eq!(m.features, vec!["mz_1000", "mz_2000"]);
        assert_eq!(m.values[0], vec![1.0, 7.0]);
        assert!(m.values[1][0].is_nan());
    }
}
