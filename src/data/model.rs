use std::fmt;

// ---------------------------------------------------------------------------
// SampleRecord – one raw spectrum file taken from an upload
// ---------------------------------------------------------------------------

/// A raw sample file: base name (path stripped) plus its undecoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    pub name: String,
    pub content: Vec<u8>,
}

impl SampleRecord {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

// ---------------------------------------------------------------------------
// LabelSource – the spreadsheet bytes before parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSource {
    pub name: String,
    pub content: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Dataset – which side of the two-phase workflow a matrix belongs to
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Training,
    Validation,
}

impl Dataset {
    /// File name used when exporting this dataset's intensity matrix.
    pub fn export_file_name(&self) -> &'static str {
        match self {
            Dataset::Training => "peak_intensity_train.csv",
            Dataset::Validation => "peak_intensity_validation.csv",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Training => write!(f, "Training set"),
            Dataset::Validation => write!(f, "Validation set"),
        }
    }
}
