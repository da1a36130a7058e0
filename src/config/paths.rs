use super::ConfigError;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_STATE_ROOT_DIR: &str = ".subagent-relay";
pub const STATE_ROOT_ENV: &str = "SUBAGENT_RELAY_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![self.runs_dir(), self.logs_dir()]
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn run_document_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.json"))
    }

    pub fn run_log_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.log"))
    }

    pub fn run_input_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.input"))
    }

    pub fn run_invocation_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.worker.json"))
    }

    pub fn run_lock_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(format!("{run_id}.lock"))
    }

    pub fn runtime_log_path(&self) -> PathBuf {
        self.logs_dir().join("runtime.log")
    }
}

pub fn resolve_state_root(explicit: Option<&Path>) -> Result<StatePaths, ConfigError> {
    if let Some(path) = explicit {
        return Ok(StatePaths::new(path));
    }
    if let Some(root) = std::env::var_os(STATE_ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(StatePaths::new(PathBuf::from(root)));
    }
    let home = std::env::var_os("HOME").ok_or(ConfigError::NoHomeDirectory)?;
    Ok(StatePaths::new(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR)))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), ConfigError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| ConfigError::StateRootUnavailable {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
