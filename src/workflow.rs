//! Two-phase processing pipeline.
//!
//! ```text
//!  phase 1:  IntakeContents ─ prepare_training ─▶ TrainingInput
//!                         PhaseJob::build_template ─▶ execute (worker thread)
//!                         complete ─▶ Session::establish(Template)
//!
//!  phase 2:  Session::require_template ─▶ PhaseJob::apply_template
//!                         execute ─▶ complete (session untouched)
//! ```
//!
//! `execute` owns everything it needs and is safe to run off the UI thread.
//! Only `complete` touches the [`Session`].

use std::io::Cursor;

use crate::data::archive::IntakeContents;
use crate::data::labels::{self, Consistency, LabelTable};
use crate::data::loader;
use crate::data::matrix::IntensityMatrix;
use crate::data::model::SampleRecord;
use crate::data::spectrum::Spectrum;
use crate::engine::script::{self, Phase};
use crate::engine::{CancelToken, EngineRun, Invoker, RunEnd, ScratchInput};
use crate::error::{EngineFailure, MissingEntry, WorkflowError};
use crate::params::{ParameterConfig, ParameterEstimator, ProcessingParameters};
use crate::session::{Session, Template};

// ---------------------------------------------------------------------------
// Phase-1 intake
// ---------------------------------------------------------------------------

/// A training upload that passed label validation.
#[derive(Debug, Clone)]
pub struct TrainingInput {
    pub samples: Vec<SampleRecord>,
    pub labels: LabelTable,
    pub consistency: Consistency,
}

/// Require spectra and a label spreadsheet, parse and validate the labels,
/// and cross-check them against the spectra. Mismatches are logged and
/// returned in [`Consistency`], they never block.
pub fn prepare_training(contents: &IntakeContents) -> Result<TrainingInput, WorkflowError> {
    if contents.samples.is_empty() {
        return Err(MissingEntry::Samples.into());
    }
    let source = contents
        .label_source
        .as_ref()
        .ok_or(MissingEntry::LabelTable)?;

    let raw = labels::parse_label_table(source)?;
    let table = labels::validate(&raw)?;
    let consistency = labels::cross_check(&table, &contents.samples);
    for warning in consistency.warnings() {
        log::warn!("{warning}");
    }

    Ok(TrainingInput {
        samples: contents.samples.clone(),
        labels: table,
        consistency,
    })
}

// ---------------------------------------------------------------------------
// Prepared engine job
// ---------------------------------------------------------------------------

/// Everything one engine run needs. Built on the UI thread after the
/// precondition checks, then moved to a worker.
#[derive(Debug, Clone)]
pub struct PhaseJob {
    pub phase: Phase,
    pub params: ProcessingParameters,
    pub samples: usize,
    groups: Vec<String>,
    script: String,
    inputs: Vec<ScratchInput>,
}

/// Raw result of [`PhaseJob::execute`], interpreted by [`complete`].
#[derive(Debug, Clone)]
pub struct JobResult {
    pub phase: Phase,
    pub params: ProcessingParameters,
    pub samples: usize,
    groups: Vec<String>,
    pub run: EngineRun,
}

impl PhaseJob {
    /// Phase 1. Rejected while a template exists.
    pub fn build_template(
        session: &Session,
        training: &TrainingInput,
        config: &ParameterConfig,
        estimator: &dyn ParameterEstimator,
    ) -> Result<Self, WorkflowError> {
        session.ensure_can_build()?;
        let params = config.resolve(&training.samples, estimator);
        log::info!(
            "Phase 1: {} spectra, {} groups, parameters {:?}",
            training.samples.len(),
            training.labels.groups().len(),
            params
        );

        let mut inputs = script::sample_inputs(&training.samples);
        inputs.push(script::labels_input(&training.labels).map_err(internal)?);

        Ok(Self {
            phase: Phase::BuildTemplate,
            params,
            samples: training.samples.len(),
            groups: training
                .labels
                .groups()
                .into_iter()
                .map(str::to_string)
                .collect(),
            script: script::render(Phase::BuildTemplate, &params),
            inputs,
        })
    }

    /// Phase 2. Uses the template's frozen parameters; rejected without a
    /// template, before the upload is even looked at.
    pub fn apply_template(session: &Session, samples: &[SampleRecord]) -> Result<Self, WorkflowError> {
        let template = session.require_template()?;
        if samples.is_empty() {
            return Err(MissingEntry::Samples.into());
        }
        log::info!(
            "Phase 2: {} spectra against {} template features",
            samples.len(),
            template.features.len()
        );

        let mut inputs = script::sample_inputs(samples);
        inputs.push(script::template_input(&template.features).map_err(internal)?);

        Ok(Self {
            phase: Phase::ApplyTemplate,
            params: template.parameters,
            samples: samples.len(),
            groups: template.groups.clone(),
            script: script::render(Phase::ApplyTemplate, &template.parameters),
            inputs,
        })
    }

    /// Run the engine. Blocks until it exits, times out or is cancelled.
    pub fn execute(self, invoker: &Invoker, cancel: &CancelToken) -> JobResult {
        let run = invoker.run(&self.script, &self.inputs, self.phase.outputs(), cancel);
        JobResult {
            phase: self.phase,
            params: self.params,
            samples: self.samples,
            groups: self.groups,
            run,
        }
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Parsed engine outputs of a successful phase.
#[derive(Debug, Clone)]
pub struct PhaseOutput {
    pub phase: Phase,
    pub matrix: IntensityMatrix,
    /// Averaged spectrum, if the engine wrote a readable one.
    pub spectrum: Option<Spectrum>,
    pub params: ProcessingParameters,
    pub stdout: String,
}

/// Interpret a finished run. A phase-1 success establishes the template;
/// anything short of exit 0 with readable outputs leaves the session as it
/// was.
pub fn complete(session: &mut Session, result: JobResult) -> Result<PhaseOutput, WorkflowError> {
    let JobResult {
        phase,
        params,
        samples,
        groups,
        run,
    } = result;
    let EngineRun { outcome, artifacts } = run;

    if outcome.end == RunEnd::Cancelled {
        log::info!("{phase:?} run cancelled");
        return Err(WorkflowError::Cancelled);
    }
    if !outcome.success() {
        log::error!("{phase:?} engine failure (status {}): {}", outcome.status, outcome.stderr);
        return Err(EngineFailure {
            stderr: outcome.stderr,
            status: outcome.status,
        }
        .into());
    }

    let artifact = |name: &str| -> Result<&[u8], WorkflowError> {
        artifacts
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| bad_output(&outcome.stderr, format!("engine wrote no {name}")))
    };

    let matrix = loader::matrix_from_csv(Cursor::new(artifact(script::MATRIX_FILE)?))
        .map_err(|e| bad_output(&outcome.stderr, format!("{}: {e:#}", script::MATRIX_FILE)))?;

    let spectrum = match artifacts.get(script::SPECTRUM_FILE) {
        Some(bytes) => match loader::spectrum_from_csv(Cursor::new(bytes.as_slice())) {
            Ok(sp) => Some(sp),
            Err(e) => {
                log::warn!("Ignoring unreadable {}: {e:#}", script::SPECTRUM_FILE);
                None
            }
        },
        None => None,
    };

    if phase == Phase::BuildTemplate {
        let features = loader::template_features_from_csv(Cursor::new(artifact(script::TEMPLATE_FILE)?))
            .map_err(|e| bad_output(&outcome.stderr, format!("{}: {e:#}", script::TEMPLATE_FILE)))?;
        session.establish(Template::new(features, params, samples, groups))?;
    }

    log::info!(
        "{phase:?} finished: {} samples x {} features",
        matrix.n_samples(),
        matrix.n_features()
    );
    Ok(PhaseOutput {
        phase,
        matrix,
        spectrum,
        params,
        stdout: outcome.stdout,
    })
}

/// Exit status 0 but the outputs are unusable.
fn bad_output(stderr: &str, what: String) -> WorkflowError {
    let stderr = if stderr.is_empty() {
        what
    } else {
        format!("{what}\n{stderr}")
    };
    EngineFailure { stderr, status: 0 }.into()
}

fn internal(e: anyhow::Error) -> WorkflowError {
    EngineFailure {
        stderr: format!("cannot prepare engine inputs: {e:#}"),
        status: -1,
    }
    .into()
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use proptest::prelude::*;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::data::labels::tests::xlsx;
    use crate::data::model::LabelSource;
    use crate::error::{PreconditionError, SchemaError};
    use crate::params::{ParameterMode, SpectrumHeuristics};

    /// Phase 1 start to finish on the calling thread.
    fn run_phase1(
        session: &mut Session,
        contents: &IntakeContents,
        config: &ParameterConfig,
        estimator: &dyn ParameterEstimator,
        invoker: &Invoker,
        cancel: &CancelToken,
    ) -> Result<PhaseOutput, WorkflowError> {
        session.ensure_can_build()?;
        let training = prepare_training(contents)?;
        let job = PhaseJob::build_template(session, &training, config, estimator)?;
        complete(session, job.execute(invoker, cancel))
    }

    /// Phase 2 start to finish on the calling thread.
    fn run_phase2(
        session: &mut Session,
        contents: &IntakeContents,
        invoker: &Invoker,
        cancel: &CancelToken,
    ) -> Result<PhaseOutput, WorkflowError> {
        let job = PhaseJob::apply_template(session, &contents.samples)?;
        complete(session, job.execute(invoker, cancel))
    }

    /// Stand-in engine: a shell script that ignores the generated R script
    /// and writes fixed outputs into the scratch directory.
    fn fake_engine(body: &str) -> (NamedTempFile, Invoker) {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{body}").unwrap();
        let invoker = Invoker::new("sh")
            .with_args([file.path().to_string_lossy().into_owned()])
            .with_timeout(Duration::from_secs(10));
        (file, invoker)
    }

    const SUCCESS: &str = r#"
printf 'sample,mz_2000.00,mz_3000.00\na.txt,1,2\nb.txt,3,4\n' > peak_intensity.csv
printf 'mz,intensity\n2000,1.5\n3000,2.5\n' > spectrum_data.csv
if [ ! -f template_features.csv ]; then printf 'mz\n3000\n2000\n' > template_features.csv; fi
echo done
"#;

    const FAILURE: &str = "echo 'Error in library(MALDIquant): no package' >&2; exit 1";

    const EXIT_ZERO_NO_OUTPUT: &str = "exit 0";

    fn training_upload(label_headers: &[&str]) -> IntakeContents {
        IntakeContents {
            samples: vec![
                SampleRecord::new("a.txt", b"2000 1\n3000 2\n".to_vec()),
                SampleRecord::new("b.txt", b"2000 3\n3000 4\n".to_vec()),
            ],
            label_source: Some(LabelSource {
                name: "labels.xlsx".into(),
                content: xlsx(&[label_headers, &["a.txt", "control"], &["b.txt", "case"]]),
            }),
        }
    }

    fn validation_upload() -> IntakeContents {
        IntakeContents {
            samples: vec![SampleRecord::new("v.txt", b"2000 1\n".to_vec())],
            label_source: None,
        }
    }

    fn manual() -> ParameterConfig {
        ParameterConfig::new(ParameterMode::Manual, ProcessingParameters::default())
    }

    fn phase1(session: &mut Session, contents: &IntakeContents, invoker: &Invoker) -> Result<PhaseOutput, WorkflowError> {
        run_phase1(
            session,
            contents,
            &manual(),
            &SpectrumHeuristics,
            invoker,
            &CancelToken::new(),
        )
    }

    #[test]
    fn phase_one_success_establishes_template() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();

        let out = phase1(&mut session, &training_upload(&["file", "group"]), &invoker).unwrap();
        assert_eq!(out.matrix.n_samples(), 2);
        assert_eq!(out.matrix.n_features(), 2);
        assert_eq!(out.spectrum.unwrap().len(), 2);
        assert_eq!(out.stdout.trim(), "done");

        let template = session.template().unwrap();
        assert_eq!(template.features, vec![2000.0, 3000.0]);
        assert_eq!(template.training_samples, 2);
        assert_eq!(template.groups, vec!["control", "case"]);
        assert_eq!(template.parameters, ProcessingParameters::default());
    }

    #[test]
    fn missing_group_column_blocks_before_the_engine() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();

        let err = phase1(&mut session, &training_upload(&["file", "label"]), &invoker).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Schema(SchemaError::MissingColumns(ref cols)) if cols == &["group"]
        ));
        assert!(!session.has_template());
    }

    #[test]
    fn missing_label_spreadsheet_is_a_warning() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();
        let mut upload = training_upload(&["file", "group"]);
        upload.label_source = None;

        let err = phase1(&mut session, &upload, &invoker).unwrap_err();
        assert!(matches!(err, WorkflowError::Missing(MissingEntry::LabelTable)));
        assert!(err.is_warning());
    }

    #[test]
    fn engine_failure_carries_stderr_and_keeps_state() {
        let (_script, invoker) = fake_engine(FAILURE);
        let mut session = Session::new();

        let err = phase1(&mut session, &training_upload(&["file", "group"]), &invoker).unwrap_err();
        match err {
            WorkflowError::Engine(f) => {
                assert_eq!(f.status, 1);
                assert!(f.stderr.contains("Error in library(MALDIquant)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.has_template());
    }

    #[test]
    fn exit_zero_without_outputs_is_a_failure() {
        let (_script, invoker) = fake_engine(EXIT_ZERO_NO_OUTPUT);
        let mut session = Session::new();

        let err = phase1(&mut session, &training_upload(&["file", "group"]), &invoker).unwrap_err();
        match err {
            WorkflowError::Engine(f) => assert!(f.stderr.contains("peak_intensity.csv")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.has_template());
    }

    #[test]
    fn phase_two_before_template_is_rejected() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();

        let err = run_phase2(&mut session, &validation_upload(), &invoker, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Precondition(PreconditionError::NoTemplate)
        ));
        assert!(!session.has_template());
    }

    #[test]
    fn phase_two_uses_frozen_template_and_leaves_it_unchanged() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();
        phase1(&mut session, &training_upload(&["file", "group"]), &invoker).unwrap();
        let before = session.template().cloned();

        let out = run_phase2(&mut session, &validation_upload(), &invoker, &CancelToken::new())
            .unwrap();
        assert_eq!(out.phase, Phase::ApplyTemplate);
        assert_eq!(out.params, ProcessingParameters::default());
        assert_eq!(session.template().cloned(), before);
    }

    #[test]
    fn second_phase_one_needs_explicit_discard() {
        let (_script, invoker) = fake_engine(SUCCESS);
        let mut session = Session::new();
        let upload = training_upload(&["file", "group"]);
        phase1(&mut session, &upload, &invoker).unwrap();

        let err = phase1(&mut session, &upload, &invoker).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Precondition(PreconditionError::TemplateExists)
        ));

        session.discard_template();
        assert!(phase1(&mut session, &upload, &invoker).is_ok());
    }

    #[test]
    fn cancelled_run_reports_cancelled() {
        let (_script, invoker) = fake_engine("sleep 5");
        let mut session = Session::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = run_phase1(
            &mut session,
            &training_upload(&["file", "group"]),
            &manual(),
            &SpectrumHeuristics,
            &invoker,
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Cancelled));
        assert!(!session.has_template());
    }

    // Engine-free model of the gating: phase 2 is only ever admitted after a
    // phase-1 success that was not followed by a discard.
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Phase1Success,
        Phase1Failure,
        Phase2,
        Discard,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Phase1Success),
            Just(Op::Phase1Failure),
            Just(Op::Phase2),
            Just(Op::Discard),
        ]
    }

    fn finished(phase: Phase, ok: bool, template: bool) -> JobResult {
        let mut artifacts = std::collections::BTreeMap::new();
        if ok {
            artifacts.insert(script::MATRIX_FILE.to_string(), b"sample,mz_1\na,1\n".to_vec());
            if template {
                artifacts.insert(script::TEMPLATE_FILE.to_string(), b"mz\n1\n".to_vec());
            }
        }
        JobResult {
            phase,
            params: ProcessingParameters::default(),
            samples: 1,
            groups: vec!["g".into()],
            run: EngineRun {
                outcome: crate::engine::RunOutcome {
                    stdout: String::new(),
                    stderr: if ok { String::new() } else { "boom".into() },
                    status: if ok { 0 } else { 1 },
                    end: RunEnd::Exited,
                },
                artifacts,
            },
        }
    }

    proptest! {
        #[test]
        fn phase_two_admitted_only_with_live_template(ops in proptest::collection::vec(op(), 0..24)) {
            let mut session = Session::new();
            let mut expect_template = false;
            let samples = vec![SampleRecord::new("v.txt", vec![])];

            for op in ops {
                match op {
                    Op::Phase1Success => {
                        let res = session
                            .ensure_can_build()
                            .map_err(WorkflowError::from)
                            .and_then(|_| complete(&mut session, finished(Phase::BuildTemplate, true, true)));
                        prop_assert_eq!(res.is_ok(), !expect_template);
                        expect_template = true;
                    }
                    Op::Phase1Failure => {
                        if session.ensure_can_build().is_ok() {
                            let res = complete(&mut session, finished(Phase::BuildTemplate, false, false));
                            prop_assert!(res.is_err());
                        }
                    }
                    Op::Phase2 => {
                        let admitted = PhaseJob::apply_template(&session, &samples).is_ok();
                        prop_assert_eq!(admitted, expect_template);
                    }
                    Op::Discard => {
                        session.discard_template();
                        expect_template = false;
                    }
                }
                prop_assert_eq!(session.has_template(), expect_template);
            }
        }
    }
}
