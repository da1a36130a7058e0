use crate::channel::MessageChannel;
use crate::config::{bootstrap_state_root, Settings, StatePaths};
use crate::runner::{ProcessRunner, WorkerConfig};
use crate::shared::errors::RelayError;
use crate::shared::ids::RunId;
use crate::status::StatusReporter;
use crate::store::RunStore;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisionMode {
    InProcess,
    Detached { supervisor_exe: PathBuf },
}

#[derive(Debug, Clone)]
pub struct RelayContext {
    pub paths: StatePaths,
    pub settings: Settings,
    pub store: RunStore,
    pub runner: ProcessRunner,
    pub channel: MessageChannel,
    pub reporter: StatusReporter,
    pub supervision: SupervisionMode,
}

impl RelayContext {
    pub fn open(paths: StatePaths) -> Result<Self, RelayError> {
        bootstrap_state_root(&paths)?;
        let settings = Settings::load(&paths)?;
        Ok(Self::with_settings(paths, settings))
    }

    pub fn with_settings(paths: StatePaths, settings: Settings) -> Self {
        let store = RunStore::new(paths.clone(), &settings);
        Self {
            runner: ProcessRunner::new(store.clone(), &settings),
            channel: MessageChannel::new(store.clone()),
            reporter: StatusReporter::new(store.clone()),
            store,
            paths,
            settings,
            supervision: SupervisionMode::InProcess,
        }
    }

    pub fn detached(mut self, supervisor_exe: impl Into<PathBuf>) -> Self {
        self.supervision = SupervisionMode::Detached {
            supervisor_exe: supervisor_exe.into(),
        };
        self
    }

    pub fn start_run(
        &self,
        agent_name: &str,
        input: &str,
        working_directory: &Path,
    ) -> Result<RunId, RelayError> {
        let worker = WorkerConfig::from_settings(&self.settings, agent_name)?;
        match &self.supervision {
            SupervisionMode::InProcess => self
                .runner
                .start(&worker, input, working_directory)
                .map(|handle| handle.into_run_id()),
            SupervisionMode::Detached { supervisor_exe } => {
                self.runner
                    .start_detached(&worker, input, working_directory, supervisor_exe)
            }
        }
    }
}
