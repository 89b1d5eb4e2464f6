/// Data layer: intake, validation, engine results and exports.
///
/// Architecture:
/// ```text
///  .zip / loose .txt + .xlsx
///        │
///        ▼
///   ┌──────────┐
///   │ archive   │  classify entries → SampleRecord[], LabelSource?
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ labels    │  workbook → RawTable → LabelTable {file, group}
///   └──────────┘
///        │        (engine runs here, see `crate::engine`)
///        ▼
///   ┌──────────────┐
///   │ loader/matrix │  peak_intensity.csv → IntensityMatrix, stats
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ filter    │  row cap + m/z search → TableView
///   └──────────┘
/// ```

pub mod archive;
pub mod demo;
pub mod export;
pub mod filter;
pub mod labels;
pub mod loader;
pub mod matrix;
pub mod model;
pub mod spectrum;
