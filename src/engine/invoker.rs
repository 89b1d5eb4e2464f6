use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::error::LaunchError;

/// Name of the generated script inside the scratch directory.
pub const SCRIPT_NAME: &str = "process.R";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag checked by a running job; setting it kills the subprocess.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

/// How a run ended. Every variant still produces the same three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    Exited,
    TimedOut,
    Cancelled,
    LaunchFailed,
}

/// Captured stdout, stderr and exit status of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
    pub end: RunEnd,
}

impl RunOutcome {
    fn synthetic(stderr: String, end: RunEnd) -> Self {
        Self {
            stdout: String::new(),
            stderr,
            status: 1,
            end,
        }
    }

    pub fn success(&self) -> bool {
        self.end == RunEnd::Exited && self.status == 0
    }
}

/// A run's outcome plus any requested output files read back from the
/// scratch directory before it was removed.
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub outcome: RunOutcome,
    pub artifacts: BTreeMap<String, Vec<u8>>,
}

/// A file to place in the scratch directory before the script starts.
#[derive(Debug, Clone)]
pub struct ScratchInput {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

impl ScratchInput {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Invoker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Invoker {
    program: String,
    args: Vec<String>,
    version_arg: String,
    timeout: Duration,
    preflight_timeout: Duration,
    scratch_root: Option<PathBuf>,
}

impl Invoker {
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_config(&EngineConfig {
            interpreter: program.into(),
            ..EngineConfig::default()
        })
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        let invoker = Self {
            program: cfg.interpreter.clone(),
            args: Vec::new(),
            version_arg: cfg.version_arg.clone(),
            timeout: Duration::ZERO,
            preflight_timeout: Duration::from_secs(cfg.preflight_timeout_secs),
            scratch_root: None,
        }
        .with_args(cfg.args.iter().cloned())
        .with_timeout(Duration::from_secs(cfg.timeout_secs));
        match &cfg.scratch_root {
            Some(root) => invoker.with_scratch_root(root.clone()),
            None => invoker,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Advisory check that the interpreter answers its version query within
    /// the preflight timeout.
    pub fn check_available(&self) -> bool {
        let child = Command::new(&self.program)
            .arg(&self.version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Engine '{}' not found: {e}", self.program);
                return false;
            }
        };
        match wait_until(&mut child, deadline_after(self.preflight_timeout), None) {
            Wait::Exited(status) => status.success(),
            Wait::TimedOut | Wait::Cancelled | Wait::Failed(_) => false,
        }
    }

    /// Run `script` with the inputs in a fresh scratch directory and never
    /// fail: launch errors, timeouts and cancellation are all reported
    /// through the returned [`RunOutcome`].
    pub fn run(
        &self,
        script: &str,
        inputs: &[ScratchInput],
        collect: &[&str],
        cancel: &CancelToken,
    ) -> EngineRun {
        match self.try_run(script, inputs, collect, cancel) {
            Ok(run) => run,
            Err(e) => {
                log::error!("Engine launch failed: {e}");
                EngineRun {
                    outcome: RunOutcome::synthetic(
                        format!("failed to run engine script: {e}"),
                        RunEnd::LaunchFailed,
                    ),
                    artifacts: BTreeMap::new(),
                }
            }
        }
    }

    /// Like [`Invoker::run`] but hard launch failures come back as `Err`.
    ///
    /// The scratch directory is owned by a [`TempDir`] and removed when this
    /// function returns, whichever way the run ended.
    pub fn try_run(
        &self,
        script: &str,
        inputs: &[ScratchInput],
        collect: &[&str],
        cancel: &CancelToken,
    ) -> Result<EngineRun, LaunchError> {
        let scratch = self.scratch_dir().map_err(LaunchError::Scratch)?;
        let dir = scratch.path();
        log::debug!("Engine scratch directory: {}", dir.display());

        for input in inputs {
            write_input(dir, input).map_err(LaunchError::Scratch)?;
        }
        let script_path = dir.join(SCRIPT_NAME);
        std::fs::write(&script_path, script).map_err(LaunchError::Scratch)?;

        log::debug!("Running: {} {}", self.program, script_path.display());
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(&script_path)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let started = Instant::now();
        let deadline = deadline_after(self.timeout);
        // Drain threads are detached on every early return: a grandchild may
        // still hold the pipes open after the interpreter is gone.
        let outcome = match wait_until(&mut child, deadline, Some(cancel)) {
            Wait::Exited(status) => match wait_drained(stdout, stderr, deadline, cancel) {
                Drained::Done { stdout, stderr } => RunOutcome {
                    stdout,
                    stderr,
                    status: status.code().unwrap_or(1),
                    end: RunEnd::Exited,
                },
                Drained::TimedOut => {
                    log::warn!("Engine output pipes still open after the interpreter exited");
                    self.timed_out(started)
                }
                Drained::Cancelled => cancelled(started),
            },
            Wait::TimedOut => self.timed_out(started),
            Wait::Cancelled => cancelled(started),
            Wait::Failed(e) => RunOutcome::synthetic(
                format!("failed to run engine script: {e}"),
                RunEnd::LaunchFailed,
            ),
        };

        let mut artifacts = BTreeMap::new();
        if outcome.end == RunEnd::Exited {
            for name in collect {
                match std::fs::read(dir.join(name)) {
                    Ok(bytes) => {
                        artifacts.insert(name.to_string(), bytes);
                    }
                    Err(e) => log::debug!("Output '{name}' not collected: {e}"),
                }
            }
        }

        log::info!(
            "Engine run finished: status {} ({:?}) in {:?}",
            outcome.status,
            outcome.end,
            started.elapsed()
        );
        Ok(EngineRun { outcome, artifacts })
    }

    fn timed_out(&self, started: Instant) -> RunOutcome {
        log::warn!("Engine run timed out after {:?}", started.elapsed());
        RunOutcome::synthetic(timeout_message(self.timeout), RunEnd::TimedOut)
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rusty-maldi-");
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

fn cancelled(started: Instant) -> RunOutcome {
    log::info!("Engine run cancelled after {:?}", started.elapsed());
    RunOutcome::synthetic("processing cancelled".to_string(), RunEnd::Cancelled)
}

pub fn timeout_message(timeout: Duration) -> String {
    let secs = timeout.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("processing timed out (exceeded {} minutes)", secs / 60)
    } else {
        format!("processing timed out (exceeded {secs} seconds)")
    }
}

fn write_input(dir: &Path, input: &ScratchInput) -> std::io::Result<()> {
    if !input
        .path
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("refusing scratch path '{}'", input.path.display()),
        ));
    }
    let target = dir.join(&input.path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, &input.content)
}

// ---------------------------------------------------------------------------
// Child process helpers
// ---------------------------------------------------------------------------

/// `None` when the timeout is too large to represent: no deadline.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

enum Wait {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
    Failed(std::io::Error),
}

/// Poll `child` until it exits, the timeout elapses or `cancel` is set.
/// The child is killed and reaped in the latter two cases.
fn wait_until(child: &mut Child, deadline: Option<Instant>, cancel: Option<&CancelToken>) -> Wait {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Wait::Exited(status),
            Ok(None) => {}
            Err(e) => {
                kill(child);
                return Wait::Failed(e);
            }
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            kill(child);
            return Wait::Cancelled;
        }
        if expired(deadline) {
            kill(child);
            return Wait::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("kill: {e}");
    }
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

enum Drained {
    Done { stdout: String, stderr: String },
    TimedOut,
    Cancelled,
}

/// Wait for both drain threads under the same deadline and cancel flag as
/// the interpreter itself.
fn wait_drained(
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    deadline: Option<Instant>,
    cancel: &CancelToken,
) -> Drained {
    loop {
        let finished = [&stdout, &stderr]
            .into_iter()
            .all(|h| h.as_ref().map_or(true, JoinHandle::is_finished));
        if finished {
            return Drained::Done {
                stdout: join_drain(stdout),
                stderr: join_drain(stderr),
            };
        }
        if cancel.is_cancelled() {
            return Drained::Cancelled;
        }
        if expired(deadline) {
            return Drained::TimedOut;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> Invoker {
        Invoker::new("sh")
    }

    #[test]
    fn captures_stdout_stderr_and_status() {
        let run = sh().run(
            "echo out; echo err >&2; exit 3",
            &[],
            &[],
            &CancelToken::new(),
        );
        assert_eq!(run.outcome.stdout.trim(), "out");
        assert_eq!(run.outcome.stderr.trim(), "err");
        assert_eq!(run.outcome.status, 3);
        assert_eq!(run.outcome.end, RunEnd::Exited);
        assert!(!run.outcome.success());
    }

    #[test]
    fn inputs_are_visible_and_outputs_collected() {
        let inputs = vec![ScratchInput::new("spectra/a.txt", "1 2\n")];
        let run = sh().run(
            "cat spectra/a.txt > copy.txt",
            &inputs,
            &["copy.txt", "absent.csv"],
            &CancelToken::new(),
        );
        assert!(run.outcome.success());
        assert_eq!(run.artifacts.get("copy.txt").unwrap(), b"1 2\n");
        assert!(!run.artifacts.contains_key("absent.csv"));
    }

    #[test]
    fn timeout_yields_synthetic_result_promptly() {
        let invoker = sh().with_timeout(Duration::from_secs(1));
        let started = Instant::now();
        let run = invoker.run("echo early; sleep 30", &[], &[], &CancelToken::new());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(run.outcome.stdout, "");
        assert!(!run.outcome.stderr.is_empty());
        assert_eq!(run.outcome.status, 1);
        assert_eq!(run.outcome.end, RunEnd::TimedOut);
    }

    #[test]
    fn timeout_message_uses_minutes_for_the_default() {
        assert_eq!(
            timeout_message(Duration::from_secs(600)),
            "processing timed out (exceeded 10 minutes)"
        );
    }

    #[test]
    fn missing_interpreter_is_folded_into_the_outcome() {
        let invoker = Invoker::new("definitely-not-an-interpreter-xyz");
        let run = invoker.run("", &[], &[], &CancelToken::new());
        assert_eq!(run.outcome.stdout, "");
        assert!(run.outcome.stderr.starts_with("failed to run engine script"));
        assert_eq!(run.outcome.status, 1);
        assert_eq!(run.outcome.end, RunEnd::LaunchFailed);

        let err = invoker.try_run("", &[], &[], &CancelToken::new());
        assert!(matches!(err, Err(LaunchError::Spawn { .. })));
    }

    #[test]
    fn cancellation_kills_the_run() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            remote.cancel();
        });
        let started = Instant::now();
        let run = sh().run("sleep 30", &[], &[], &cancel);
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(run.outcome.end, RunEnd::Cancelled);
        assert_ne!(run.outcome.status, 0);
    }

    #[test]
    fn background_child_holding_the_pipes_cannot_outlast_the_timeout() {
        let invoker = sh().with_timeout(Duration::from_secs(1));
        let started = Instant::now();
        let run = invoker.run("sleep 8 & echo bye", &[], &[], &CancelToken::new());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(run.outcome.end, RunEnd::TimedOut);
        assert_eq!(run.outcome.stdout, "");
        assert_ne!(run.outcome.status, 0);
    }

    #[test]
    fn cancellation_reaches_a_run_whose_interpreter_already_exited() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            remote.cancel();
        });
        let started = Instant::now();
        let run = sh().run("sleep 8 & exit 0", &[], &[], &cancel);
        handle.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(run.outcome.end, RunEnd::Cancelled);
    }

    #[test]
    fn huge_timeout_means_no_deadline() {
        let invoker = sh().with_timeout(Duration::MAX);
        let run = invoker.run("echo ok", &[], &[], &CancelToken::new());
        assert!(run.outcome.success());
        assert_eq!(run.outcome.stdout.trim(), "ok");

        let patient = Invoker::from_config(&EngineConfig {
            interpreter: "true".into(),
            preflight_timeout_secs: u64::MAX,
            timeout_secs: u64::MAX,
            ..EngineConfig::default()
        });
        assert!(patient.check_available());
    }

    #[test]
    fn scratch_directory_is_removed_on_every_path() {
        let root = tempfile::tempdir().unwrap();
        let invoker = sh()
            .with_scratch_root(root.path())
            .with_timeout(Duration::from_secs(1));
        let cancel = CancelToken::new();

        invoker.run("exit 0", &[], &[], &cancel);
        invoker.run("exit 7", &[], &[], &cancel);
        invoker.run("sleep 30", &[], &[], &cancel);

        let leftovers: Vec<_> = std::fs::read_dir(root.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "scratch dirs left behind: {leftovers:?}");
    }

    #[test]
    fn scratch_inputs_cannot_escape() {
        let inputs = vec![ScratchInput::new("../evil.txt", "x")];
        let err = sh().try_run("exit 0", &inputs, &[], &CancelToken::new());
        assert!(matches!(err, Err(LaunchError::Scratch(_))));
    }

    #[test]
    fn preflight_reports_reachability() {
        let ok = Invoker::from_config(&EngineConfig {
            interpreter: "true".into(),
            ..EngineConfig::default()
        });
        assert!(ok.check_available());
        assert!(!Invoker::new("definitely-not-an-interpreter-xyz").check_available());
    }
}
