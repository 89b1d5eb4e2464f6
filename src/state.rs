use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;

use crate::color::ColorMap;
use crate::config::AppConfig;
use crate::data::archive::{self, IntakeContents};
use crate::data::demo;
use crate::data::filter::TableQuery;
use crate::data::labels::{self, RawTable};
use crate::data::matrix::IntensityMatrix;
use crate::data::model::Dataset;
use crate::data::spectrum::{self, Spectrum};
use crate::engine::script::Phase;
use crate::engine::{CancelToken, Invoker};
use crate::error::{MissingEntry, WorkflowError};
use crate::params::{ParameterConfig, ProcessingParameters, SpectrumHeuristics};
use crate::session::Session;
use crate::workflow::{self, JobResult, PhaseJob, TrainingInput};

/// Rows of the label spreadsheet shown before validation.
pub const LABEL_PREVIEW_ROWS: usize = 10;

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub level: Level,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

/// One intake (archive or loose files) and what was learned from it.
#[derive(Debug)]
pub struct Upload {
    /// Archive name or "N files".
    pub origin: String,
    pub contents: IntakeContents,
    /// First rows of the spreadsheet, shown whether or not it validates.
    pub label_preview: Option<RawTable>,
    /// Outcome of label validation (training uploads only).
    pub training: Option<Result<TrainingInput, WorkflowError>>,
}

impl Upload {
    fn new(origin: String, contents: IntakeContents, is_training: bool) -> Self {
        let label_preview = contents.label_source.as_ref().and_then(|src| {
            match labels::parse_label_table(src) {
                Ok(raw) => Some(RawTable {
                    headers: raw.headers.clone(),
                    rows: raw.head(LABEL_PREVIEW_ROWS).to_vec(),
                }),
                Err(e) => {
                    log::warn!("Label table preview unavailable: {e}");
                    None
                }
            }
        });
        let training = is_training.then(|| workflow::prepare_training(&contents));
        Self {
            origin,
            contents,
            label_preview,
            training,
        }
    }

    pub fn training_input(&self) -> Option<&TrainingInput> {
        self.training.as_ref().and_then(|r| r.as_ref().ok())
    }

    pub fn group_colors(&self) -> Option<ColorMap> {
        self.training_input()
            .map(|t| ColorMap::new(&t.labels.groups()))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOrigin {
    Engine,
    Demo,
    File(String),
}

/// What the results and visualisation tabs show.
#[derive(Debug, Clone)]
pub struct Results {
    pub origin: ResultOrigin,
    pub train: Option<IntensityMatrix>,
    pub validation: Option<IntensityMatrix>,
    pub spectrum: Option<Spectrum>,
    pub params: Option<ProcessingParameters>,
}

impl Results {
    fn empty(origin: ResultOrigin) -> Self {
        Self {
            origin,
            train: None,
            validation: None,
            spectrum: None,
            params: None,
        }
    }

    pub fn matrix(&self, dataset: Dataset) -> Option<&IntensityMatrix> {
        match dataset {
            Dataset::Training => self.train.as_ref(),
            Dataset::Validation => self.validation.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Background engine job
// ---------------------------------------------------------------------------

pub struct RunningJob {
    pub phase: Phase,
    pub started: Instant,
    cancel: CancelToken,
    rx: Receiver<JobResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Upload,
    Results,
    Visualization,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: AppConfig,
    pub invoker: Invoker,
    /// Preflight result; `None` while the probe is still running.
    pub engine_available: Option<bool>,
    preflight: Option<Receiver<bool>>,

    pub session: Session,
    pub params: ParameterConfig,
    pub tab: Tab,

    pub training: Option<Upload>,
    pub validation: Option<Upload>,
    pub results: Option<Results>,

    /// Table view controls.
    pub table_dataset: Dataset,
    pub table_query: TableQuery,
    /// Index into the training samples for the raw spectrum preview.
    pub preview_sample: usize,

    pub notices: Vec<Notice>,
    /// stdout/stderr of the last engine run.
    pub engine_log: Option<String>,
    pub job: Option<RunningJob>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let invoker = Invoker::from_config(&config.engine);
        let params = config.parameter_config();
        let table_query = TableQuery::new(config.preview.default_rows);
        let mut state = Self {
            config,
            invoker,
            engine_available: None,
            preflight: None,
            session: Session::new(),
            params,
            tab: Tab::default(),
            training: None,
            validation: None,
            results: None,
            table_dataset: Dataset::Training,
            table_query,
            preview_sample: 0,
            notices: Vec::new(),
            engine_log: None,
            job: None,
        };
        state.start_preflight();
        state
    }

    // ---- notices ----

    pub fn notify(&mut self, level: Level, text: impl Into<String>) {
        self.notices.push(Notice {
            level,
            text: text.into(),
        });
    }

    fn report(&mut self, err: &WorkflowError) {
        let (level, text) = describe(err);
        self.notify(level, text);
    }

    // ---- preflight ----

    /// Probe the engine in the background so the first frame is not held up
    /// by the version query.
    pub fn start_preflight(&mut self) {
        let invoker = self.invoker.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(invoker.check_available());
        });
        self.engine_available = None;
        self.preflight = Some(rx);
    }

    // ---- intake ----

    pub fn load_training_archive(&mut self, name: String, bytes: &[u8]) {
        self.load_archive(name, bytes, true);
    }

    pub fn load_validation_archive(&mut self, name: String, bytes: &[u8]) {
        self.load_archive(name, bytes, false);
    }

    fn load_archive(&mut self, name: String, bytes: &[u8], is_training: bool) {
        self.notices.clear();
        match archive::ingest_archive(bytes) {
            Ok(contents) => self.set_upload(name, contents, is_training),
            Err(e) => {
                let err = WorkflowError::from(e);
                self.report(&err);
                if is_training {
                    self.training = None;
                } else {
                    self.validation = None;
                }
            }
        }
    }

    /// Loose `.txt` / spreadsheet files picked individually.
    pub fn load_files(&mut self, files: Vec<(String, Vec<u8>)>, is_training: bool) {
        self.notices.clear();
        let origin = format!("{} files", files.len());
        let contents = archive::ingest_files(files);
        self.set_upload(origin, contents, is_training);
    }

    fn set_upload(&mut self, origin: String, contents: IntakeContents, is_training: bool) {
        for missing in contents.missing() {
            // a validation upload has no spreadsheet by design
            if is_training || missing == MissingEntry::Samples {
                self.notify(Level::Warning, missing.to_string());
            }
        }
        let dupes = contents.duplicate_names();
        if !dupes.is_empty() {
            let text = format!(
                "Spectra with the same file name in different folders; only the first copy is processed: {}",
                dupes.join(", ")
            );
            log::warn!("{text}");
            self.notify(Level::Warning, text);
        }
        let upload = Upload::new(origin, contents, is_training);
        if let Some(Err(e)) = &upload.training {
            if !matches!(e, WorkflowError::Missing(_)) {
                let text = e.to_string();
                log::error!("{text}");
                self.notify(Level::Error, text);
            }
        }
        if let Some(input) = upload.training_input() {
            let warnings = input.consistency.warnings();
            for w in warnings {
                self.notify(Level::Warning, w);
            }
        }
        if is_training {
            self.preview_sample = 0;
            self.training = Some(upload);
        } else {
            self.validation = Some(upload);
        }
    }

    /// Spectrum of the selected training sample, for the raw preview plot.
    pub fn preview_spectrum(&self) -> Option<(String, Spectrum)> {
        let sample = self
            .training
            .as_ref()?
            .contents
            .samples
            .get(self.preview_sample)?;
        match spectrum::parse_spectrum(sample) {
            Ok(sp) => Some((sample.name.clone(), sp)),
            Err(e) => {
                log::debug!("No preview for '{}': {e:#}", sample.name);
                None
            }
        }
    }

    // ---- phases ----

    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    pub fn start_phase1(&mut self) {
        if self.is_running() {
            return;
        }
        self.notices.clear();
        if let Err(e) = self.session.ensure_can_build() {
            self.report(&WorkflowError::from(e));
            return;
        }
        let prepared = match self.training.as_ref().and_then(|u| u.training.as_ref()) {
            Some(Ok(input)) => {
                PhaseJob::build_template(&self.session, input, &self.params, &SpectrumHeuristics)
                    .map_err(|e| describe(&e))
            }
            Some(Err(e)) => Err(describe(e)),
            None => Err(describe(&MissingEntry::Samples.into())),
        };
        match prepared {
            Ok(job) => self.spawn(job),
            Err((level, text)) => self.notify(level, text),
        }
    }

    pub fn start_phase2(&mut self) {
        if self.is_running() {
            return;
        }
        self.notices.clear();
        let samples = self
            .validation
            .as_ref()
            .map(|u| u.contents.samples.as_slice())
            .unwrap_or(&[]);
        match PhaseJob::apply_template(&self.session, samples) {
            Ok(job) => self.spawn(job),
            Err(e) => self.report(&e),
        }
    }

    fn spawn(&mut self, job: PhaseJob) {
        let phase = job.phase;
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let invoker = self.invoker.clone();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = tx.send(job.execute(&invoker, &token));
        });
        log::info!("{phase:?} started");
        self.notify(Level::Info, format!("{} running…", phase_label(phase)));
        self.job = Some(RunningJob {
            phase,
            started: Instant::now(),
            cancel,
            rx,
        });
    }

    pub fn cancel_job(&self) {
        if let Some(job) = &self.job {
            job.cancel.cancel();
        }
    }

    /// Collect finished background work. Called once per frame.
    pub fn poll(&mut self) {
        let probe = self.preflight.as_ref().map(|rx| rx.try_recv());
        match probe {
            Some(Ok(ok)) => {
                self.engine_available = Some(ok);
                self.preflight = None;
            }
            Some(Err(TryRecvError::Disconnected)) => {
                self.engine_available = Some(false);
                self.preflight = None;
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        let polled = self.job.as_ref().map(|j| j.rx.try_recv());
        match polled {
            Some(Ok(result)) => {
                self.job = None;
                self.finish(result);
            }
            Some(Err(TryRecvError::Disconnected)) => {
                self.job = None;
                self.notify(Level::Error, "engine worker stopped unexpectedly");
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }
    }

    fn finish(&mut self, result: JobResult) {
        self.notices.clear();
        let log_text = [&result.run.outcome.stdout, &result.run.outcome.stderr]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.engine_log = (!log_text.is_empty()).then_some(log_text);

        match workflow::complete(&mut self.session, result) {
            Ok(out) => {
                let phase = out.phase;
                if !matches!(&self.results, Some(r) if r.origin == ResultOrigin::Engine) {
                    self.results = Some(Results::empty(ResultOrigin::Engine));
                }
                let results = self
                    .results
                    .get_or_insert_with(|| Results::empty(ResultOrigin::Engine));
                match phase {
                    Phase::BuildTemplate => {
                        results.train = Some(out.matrix);
                        results.validation = None;
                        results.params = Some(out.params);
                    }
                    Phase::ApplyTemplate => {
                        results.validation = Some(out.matrix);
                        results.params.get_or_insert(out.params);
                    }
                }
                if out.spectrum.is_some() || phase == Phase::BuildTemplate {
                    results.spectrum = out.spectrum;
                }
                self.reset_table(match phase {
                    Phase::BuildTemplate => Dataset::Training,
                    Phase::ApplyTemplate => Dataset::Validation,
                });
                self.notify(Level::Info, format!("{} completed", phase_label(phase)));
                self.tab = Tab::Results;
            }
            Err(e) => self.report(&e),
        }
    }

    pub fn discard_template(&mut self) {
        if self.is_running() {
            return;
        }
        self.notices.clear();
        if self.session.discard_template().is_some() {
            self.notify(Level::Info, "Template discarded; phase 1 can be run again");
        }
    }

    // ---- other result sources ----

    /// Synthetic results for exploring the dashboard. The session is not
    /// touched.
    pub fn load_demo(&mut self) {
        self.notices.clear();
        let data = demo::generate(10, 5);
        self.results = Some(Results {
            origin: ResultOrigin::Demo,
            train: Some(data.train),
            validation: data.validation,
            spectrum: Some(data.spectrum),
            params: Some(data.params),
        });
        self.reset_table(Dataset::Training);
        self.notify(Level::Info, "Demo data loaded");
        self.tab = Tab::Results;
    }

    pub fn open_result_file(&mut self, path: &Path) {
        self.notices.clear();
        match crate::data::loader::load_matrix_file(path) {
            Ok(matrix) => {
                log::info!(
                    "Loaded {} samples x {} features from {}",
                    matrix.n_samples(),
                    matrix.n_features(),
                    path.display()
                );
                let mut results = Results::empty(ResultOrigin::File(path.display().to_string()));
                results.train = Some(matrix);
                self.results = Some(results);
                self.reset_table(Dataset::Training);
                self.tab = Tab::Results;
            }
            Err(e) => {
                log::error!("Failed to load file: {e:#}");
                self.notify(Level::Error, format!("Error: {e:#}"));
            }
        }
    }

    fn reset_table(&mut self, dataset: Dataset) {
        self.table_dataset = dataset;
        self.table_query = TableQuery::new(self.config.preview.default_rows);
    }

    /// Matrix shown in the table view, falling back to training data.
    pub fn table_matrix(&self) -> Option<&IntensityMatrix> {
        let results = self.results.as_ref()?;
        results
            .matrix(self.table_dataset)
            .or_else(|| results.matrix(Dataset::Training))
    }
}

/// Log a workflow error and turn it into notice level and text.
fn describe(err: &WorkflowError) -> (Level, String) {
    if err.is_warning() {
        log::warn!("{err}");
        (Level::Warning, err.to_string())
    } else {
        log::error!("{err}");
        (Level::Error, err.to_string())
    }
}

pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::BuildTemplate => "Phase 1 (build template)",
        Phase::ApplyTemplate => "Phase 2 (apply template)",
    }
}
