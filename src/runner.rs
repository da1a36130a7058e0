use crate::config::{Settings, StatePaths};
use crate::shared::errors::{io_error, RelayError};
use crate::shared::ids::RunId;
use crate::shared::logging::{record_event, RuntimeEvent};
use crate::shared::time::now_utc;
use crate::store::{RunDocument, RunStore};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

pub mod completion;
pub mod invocation;
pub mod output_log;

pub use completion::{apply_exit, apply_spawn_failure, classify_exit, ExitDisposition};
pub use invocation::{
    build_invocation, load_invocation, save_invocation, shell_quote, WorkerConfig,
    WorkerInvocation, RUN_ID_ENV,
};
pub use output_log::{read_log, read_log_tail, RunLogWriter, StreamKind};

pub const SUPERVISE_VERB: &str = "__supervise";

/// Locked attempts at recording an exit before the document is written unlocked.
const SETTLE_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    supervisor: Option<JoinHandle<()>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn into_run_id(self) -> RunId {
        self.run_id
    }

    pub fn wait(mut self) -> RunId {
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.join();
        }
        self.run_id
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    store: RunStore,
    summary_tail_lines: usize,
}

impl ProcessRunner {
    pub fn new(store: RunStore, settings: &Settings) -> Self {
        Self {
            store,
            summary_tail_lines: settings.summary_tail_lines,
        }
    }

    fn paths(&self) -> &StatePaths {
        self.store.paths()
    }

    pub fn start(
        &self,
        worker: &WorkerConfig,
        input: &str,
        working_directory: &Path,
    ) -> Result<RunHandle, RelayError> {
        let (document, invocation) = self.prepare(worker, input, working_directory)?;
        let run_id = document.run_id.clone();
        let cwd = working_directory.to_path_buf();
        let runner = self.clone();
        let supervised_id = run_id.clone();

        let supervisor = thread::Builder::new()
            .name(format!("run-{run_id}"))
            .spawn(move || {
                if let Err(err) = runner.supervise(&supervised_id, &invocation, &cwd) {
                    runner.log_supervision_error(&supervised_id, &err);
                }
            });
        let supervisor = match supervisor {
            Ok(handle) => Some(handle),
            Err(err) => {
                self.record_spawn_failure(&run_id, &format!("supervisor thread: {err}"))?;
                None
            }
        };
        Ok(RunHandle { run_id, supervisor })
    }

    pub fn start_detached(
        &self,
        worker: &WorkerConfig,
        input: &str,
        working_directory: &Path,
        supervisor_exe: &Path,
    ) -> Result<RunId, RelayError> {
        let (document, _) = self.prepare(worker, input, working_directory)?;
        let run_id = document.run_id;
        let spawned = Command::new(supervisor_exe)
            .arg("--state-root")
            .arg(&self.paths().root)
            .arg(SUPERVISE_VERB)
            .arg(run_id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => record_event(
                self.paths(),
                RuntimeEvent::RunSupervisorSpawned,
                run_id.as_str(),
                &format!("pid={}", child.id()),
            ),
            Err(err) => {
                self.record_spawn_failure(&run_id, &format!("detached supervisor: {err}"))?;
            }
        }
        Ok(run_id)
    }

    /// Supervises a run created by [`ProcessRunner::start_detached`] using the
    /// invocation frozen when the run was created.
    pub fn supervise_existing(&self, run_id: &str) -> Result<RunDocument, RelayError> {
        let document = self.store.load(run_id)?;
        if document.status.is_terminal() {
            return Ok(document);
        }
        if self.paths().run_log_path(run_id).exists() {
            return Err(RelayError::AlreadySupervised {
                run_id: run_id.to_string(),
            });
        }
        let invocation = match load_invocation(self.paths(), &document.run_id) {
            Ok(invocation) => invocation,
            Err(err) => {
                let reason = format!("saved invocation unavailable: {err}");
                return self.record_spawn_failure(&document.run_id, &reason);
            }
        };
        let cwd = match document.working_directory.clone() {
            Some(cwd) => cwd,
            None => std::env::current_dir().map_err(|source| io_error(Path::new("."), source))?,
        };
        self.supervise(&document.run_id, &invocation, &cwd)
    }

    pub fn supervise(
        &self,
        run_id: &RunId,
        invocation: &WorkerInvocation,
        working_directory: &Path,
    ) -> Result<RunDocument, RelayError> {
        let log_path = self.paths().run_log_path(run_id.as_str());
        let log = match RunLogWriter::create(&log_path) {
            Ok(log) => log,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(RelayError::AlreadySupervised {
                    run_id: run_id.to_string(),
                })
            }
            Err(err) => {
                let reason = format!("cannot create log {}: {err}", log_path.display());
                return self.record_spawn_failure(run_id, &reason);
            }
        };
        let stdin = match File::open(&invocation.stdin_path) {
            Ok(file) => file,
            Err(err) => {
                let reason = format!(
                    "cannot open input {}: {err}",
                    invocation.stdin_path.display()
                );
                return self.record_spawn_failure(run_id, &reason);
            }
        };

        let mut command = Command::new(&invocation.binary);
        command
            .current_dir(working_directory)
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let reason = format!("`{}`: {err}", invocation.binary);
                return self.record_spawn_failure(run_id, &reason);
            }
        };
        record_event(
            self.paths(),
            RuntimeEvent::RunSpawned,
            run_id.as_str(),
            &format!("pid={}", child.id()),
        );

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_capture(run_id, &log, StreamKind::Stdout, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_capture(run_id, &log, StreamKind::Stderr, stderr));
        }

        let exit_code = match child.wait() {
            Ok(status) => status.code(),
            Err(err) => {
                record_event(
                    self.paths(),
                    RuntimeEvent::RunWaitFailed,
                    run_id.as_str(),
                    &format!("error={err}"),
                );
                None
            }
        };
        for reader in readers {
            let _ = reader.join();
        }

        self.finish(run_id, exit_code)
    }

    fn spawn_capture<R>(
        &self,
        run_id: &RunId,
        log: &RunLogWriter,
        stream: StreamKind,
        source: R,
    ) -> JoinHandle<()>
    where
        R: std::io::Read + Send + 'static,
    {
        let log = log.clone();
        let paths = self.paths().clone();
        let run_id = run_id.clone();
        thread::spawn(move || {
            if let Err(err) = log.capture(stream, source) {
                record_event(
                    &paths,
                    RuntimeEvent::RunCaptureFailed,
                    run_id.as_str(),
                    &format!("stream={} error={err}", stream.as_str()),
                );
            }
        })
    }

    fn finish(&self, run_id: &RunId, exit_code: Option<i32>) -> Result<RunDocument, RelayError> {
        let log_path = self.paths().run_log_path(run_id.as_str());
        let tail_lines = self.summary_tail_lines;
        let mut disposition = None;
        let settled = self
            .store
            .settle(run_id.as_str(), SETTLE_ATTEMPTS, |document| {
                disposition = Some(apply_exit(
                    document,
                    exit_code,
                    || read_log_tail(&log_path, tail_lines),
                    now_utc(),
                ));
                Ok(())
            })?;

        let exit = exit_code.map_or_else(|| "none".to_string(), |code| code.to_string());
        if settled.forced {
            record_event(
                self.paths(),
                RuntimeEvent::RunExitForced,
                run_id.as_str(),
                &format!("attempts={SETTLE_ATTEMPTS} exit_code={exit}"),
            );
        }
        let document = settled.document;
        match disposition {
            Some(ExitDisposition::Preserved(status)) => record_event(
                self.paths(),
                RuntimeEvent::RunTerminalStatusPreserved,
                run_id.as_str(),
                &format!("status={status} exit_code={exit}"),
            ),
            _ => record_event(
                self.paths(),
                RuntimeEvent::RunCompleted,
                run_id.as_str(),
                &format!("status={} exit_code={exit}", document.status),
            ),
        }
        Ok(document)
    }

    fn record_spawn_failure(
        &self,
        run_id: &RunId,
        reason: &str,
    ) -> Result<RunDocument, RelayError> {
        let log_path = self.paths().run_log_path(run_id.as_str());
        let tail = read_log_tail(&log_path, self.summary_tail_lines);
        let settled = self
            .store
            .settle(run_id.as_str(), SETTLE_ATTEMPTS, |document| {
                apply_spawn_failure(document, reason, &tail, now_utc());
                Ok(())
            })?;
        record_event(
            self.paths(),
            RuntimeEvent::RunSpawnFailed,
            run_id.as_str(),
            &format!("reason={reason} forced={}", settled.forced),
        );
        Ok(settled.document)
    }

    fn prepare(
        &self,
        worker: &WorkerConfig,
        input: &str,
        working_directory: &Path,
    ) -> Result<(RunDocument, WorkerInvocation), RelayError> {
        if !working_directory.is_dir() {
            return Err(RelayError::InvalidArgument(format!(
                "working directory `{}` does not exist",
                working_directory.display()
            )));
        }
        if worker.agent.binary.trim().is_empty() {
            return Err(RelayError::InvalidArgument(format!(
                "agent `{}` has an empty binary",
                worker.agent_name
            )));
        }

        let run_id = RunId::generate();
        let invocation = build_invocation(worker, &run_id, self.paths());
        write_input(&invocation.stdin_path, input)?;
        save_invocation(self.paths(), &run_id, &invocation)?;

        let document = RunDocument::new_running(
            run_id,
            worker.agent_name.clone(),
            invocation.command_form.clone(),
            absolute(working_directory),
            now_utc(),
        );
        self.store.create(&document)?;
        record_event(
            self.paths(),
            RuntimeEvent::RunCreated,
            document.run_id.as_str(),
            &format!("agent={} input_bytes={}", document.agent_name, input.len()),
        );
        Ok((document, invocation))
    }

    fn log_supervision_error(&self, run_id: &RunId, err: &RelayError) {
        record_event(
            self.paths(),
            RuntimeEvent::RunSupervisionFailed,
            run_id.as_str(),
            &format!("error={err}"),
        );
    }
}

fn write_input(path: &Path, input: &str) -> Result<(), RelayError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    fs::write(path, input).map_err(|source| io_error(path, source))
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
