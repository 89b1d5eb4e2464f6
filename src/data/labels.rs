use std::collections::HashSet;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::model::{LabelSource, SampleRecord};
use crate::error::{SchemaError, TableParseError};

pub const FILE_COLUMN: &str = "file";
pub const GROUP_COLUMN: &str = "group";

// ---------------------------------------------------------------------------
// RawTable – the first worksheet as untyped text cells
// ---------------------------------------------------------------------------

/// Header row plus data rows, every cell rendered as text. Used for the
/// preview and as the input of [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn head(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

/// Read the first worksheet of an `.xlsx` / `.xls` workbook.
pub fn parse_label_table(source: &LabelSource) -> Result<RawTable, TableParseError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(source.content.as_slice()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(TableParseError::NoWorksheet)??;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(TableParseError::NoHeader)?
        .iter()
        .map(cell_text)
        .collect();

    let rows: Vec<Vec<String>> = rows
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.trim().is_empty()))
        .collect();

    log::debug!(
        "Label table '{}': {} columns, {} rows",
        source.name,
        headers.len(),
        rows.len()
    );
    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// LabelTable – validated, statically shaped
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    pub file: String,
    pub group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    pub rows: Vec<LabelRow>,
}

impl LabelTable {
    pub fn sample_count(&self) -> usize {
        self.rows.len()
    }

    /// Distinct group labels in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|r| r.group.as_str())
            .filter(|g| seen.insert(*g))
            .collect()
    }
}

/// Check for the `file` and `group` columns and lift every row into a
/// [`LabelRow`]. Additional columns are ignored.
pub fn validate(table: &RawTable) -> Result<LabelTable, SchemaError> {
    let file_idx = table.column_index(FILE_COLUMN);
    let group_idx = table.column_index(GROUP_COLUMN);

    let (file_idx, group_idx) = match (file_idx, group_idx) {
        (Some(f), Some(g)) => (f, g),
        (f, g) => {
            let mut missing = Vec::new();
            if f.is_none() {
                missing.push(FILE_COLUMN.to_string());
            }
            if g.is_none() {
                missing.push(GROUP_COLUMN.to_string());
            }
            return Err(SchemaError::MissingColumns(missing));
        }
    };

    let mut rows = Vec::with_capacity(table.rows.len());
    for (i, raw) in table.rows.iter().enumerate() {
        let cell = |idx: usize, column: &'static str| -> Result<String, SchemaError> {
            let value = raw.get(idx).map(|s| s.trim()).unwrap_or("");
            if value.is_empty() {
                // 1-based, counting the header as row 1
                return Err(SchemaError::EmptyCell { row: i + 2, column });
            }
            Ok(value.to_string())
        };
        rows.push(LabelRow {
            file: cell(file_idx, FILE_COLUMN)?,
            group: cell(group_idx, GROUP_COLUMN)?,
        });
    }
    Ok(LabelTable { rows })
}

// ---------------------------------------------------------------------------
// Cross-check against the extracted spectra
// ---------------------------------------------------------------------------

/// Non-blocking inconsistencies between the label table and the spectra.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Consistency {
    pub label_rows: usize,
    pub samples: usize,
    /// `file` values that name no extracted spectrum.
    pub unresolved_files: Vec<String>,
    /// Spectra with no label row.
    pub unlabelled_samples: Vec<String>,
}

impl Consistency {
    pub fn is_clean(&self) -> bool {
        self.label_rows == self.samples
            && self.unresolved_files.is_empty()
            && self.unlabelled_samples.is_empty()
    }

    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.label_rows != self.samples {
            out.push(format!(
                "label table has {} rows but {} spectra were uploaded",
                self.label_rows, self.samples
            ));
        }
        if !self.unresolved_files.is_empty() {
            out.push(format!(
                "labelled files not found in upload: {}",
                self.unresolved_files.join(", ")
            ));
        }
        if !self.unlabelled_samples.is_empty() {
            out.push(format!(
                "spectra without a label row: {}",
                self.unlabelled_samples.join(", ")
            ));
        }
        out
    }
}

/// Label `file` values may be written with or without the `.txt` suffix.
fn sample_key(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower.strip_suffix(".txt").map(str::to_string).unwrap_or(lower)
}

pub fn cross_check(table: &LabelTable, samples: &[SampleRecord]) -> Consistency {
    let sample_keys: HashSet<String> = samples.iter().map(|s| sample_key(&s.name)).collect();
    let label_keys: HashSet<String> = table.rows.iter().map(|r| sample_key(&r.file)).collect();

    Consistency {
        label_rows: table.rows.len(),
        samples: samples.len(),
        unresolved_files: table
            .rows
            .iter()
            .filter(|r| !sample_keys.contains(&sample_key(&r.file)))
            .map(|r| r.file.clone())
            .collect(),
        unlabelled_samples: samples
            .iter()
            .filter(|s| !label_keys.contains(&sample_key(&s.name)))
            .map(|s| s.name.clone())
            .collect(),
    }
}
