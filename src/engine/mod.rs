/// External processing engine: script generation and subprocess control.
///
/// ```text
///  ProcessingParameters ─┐
///                        ▼
///                 ┌──────────┐
///                 │  script   │  render phase-1 / phase-2 R script
///                 └──────────┘
///                        │  + spectra/, labels.csv, template_features.csv
///                        ▼
///                 ┌──────────┐
///                 │ invoker   │  scratch dir → Rscript → (stdout, stderr, status)
///                 └──────────┘
/// ```

pub mod invoker;
pub mod script;

pub use invoker::{CancelToken, EngineRun, Invoker, RunEnd, RunOutcome, ScratchInput};
