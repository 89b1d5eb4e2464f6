use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Intake errors (archive / spreadsheet)
// ---------------------------------------------------------------------------

/// The uploaded bytes are not a readable zip container.
#[derive(Debug, Error)]
#[error("not a valid zip archive: {0}")]
pub struct ArchiveFormatError(#[from] pub zip::result::ZipError);

/// The spreadsheet bytes could not be read as a workbook.
#[derive(Debug, Error)]
pub enum TableParseError {
    #[error("cannot read spreadsheet: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("spreadsheet contains no worksheet")]
    NoWorksheet,
    #[error("spreadsheet has no header row")]
    NoHeader,
}

/// The label table is readable but does not have the required shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("label table is missing required column(s): {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("label table row {row} has an empty '{column}' cell")]
    EmptyCell { row: usize, column: &'static str },
}

/// Which category of entry an upload lacks. Non-fatal at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntry {
    /// No `.txt` spectra.
    Samples,
    /// No `.xlsx` / `.xls` label spreadsheet.
    LabelTable,
}

impl fmt::Display for MissingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntry::Samples => write!(f, "no .txt spectra found in upload"),
            MissingEntry::LabelTable => {
                write!(f, "no label spreadsheet (.xlsx/.xls) found in upload")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Hard failure to start the engine subprocess. Only surfaced through
/// `Invoker::try_run`; `Invoker::run` folds it into a `RunOutcome`.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot prepare scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("cannot start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// The engine ran but did not produce a usable result.
/// `stderr` is carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine failed with status {status}: {stderr}")]
pub struct EngineFailure {
    pub stderr: String,
    pub status: i32,
}

// ---------------------------------------------------------------------------
// Workflow gating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PreconditionError {
    #[error("no training template yet: complete phase 1 first")]
    NoTemplate,
    #[error("a training template already exists: discard it before building a new one")]
    TemplateExists,
}

/// Everything that can stop a phase-1 or phase-2 run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Archive(#[from] ArchiveFormatError),
    #[error("{0}")]
    Missing(MissingEntry),
    #[error(transparent)]
    TableParse(#[from] TableParseError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Engine(#[from] EngineFailure),
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("run cancelled")]
    Cancelled,
}

impl From<MissingEntry> for WorkflowError {
    fn from(m: MissingEntry) -> Self {
        WorkflowError::Missing(m)
    }
}

impl WorkflowError {
    /// Blocking-but-non-fatal conditions are shown as warnings, not errors.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            WorkflowError::Missing(_) | WorkflowError::Precondition(_) | WorkflowError::Cancelled
        )
    }
}
