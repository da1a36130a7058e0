use crate::config::{AgentConfig, Settings, StatePaths, STATE_ROOT_ENV};
use crate::shared::errors::{io_error, RelayError};
use crate::shared::ids::{AgentName, RunId};
use crate::store::run_store::replace_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub const RUN_ID_ENV: &str = "SUBAGENT_RELAY_RUN_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub agent_name: AgentName,
    pub agent: AgentConfig,
}

impl WorkerConfig {
    pub fn new(agent_name: AgentName, agent: AgentConfig) -> Self {
        Self { agent_name, agent }
    }

    pub fn from_settings(settings: &Settings, agent_name: &str) -> Result<Self, RelayError> {
        let name = AgentName::parse(agent_name).map_err(RelayError::InvalidArgument)?;
        let agent = settings
            .agent(agent_name)
            .ok_or_else(|| RelayError::UnknownAgent(agent_name.to_string()))?;
        Ok(Self::new(name, agent))
    }
}

/// The resolved worker command, frozen at run creation in `runs/<runId>.worker.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInvocation {
    pub binary: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub stdin_path: PathBuf,
    pub command_form: String,
}

pub fn build_invocation(
    worker: &WorkerConfig,
    run_id: &RunId,
    paths: &StatePaths,
) -> WorkerInvocation {
    let stdin_path = paths.run_input_path(run_id.as_str());
    let mut env = worker.agent.env.clone();
    env.insert(RUN_ID_ENV.to_string(), run_id.to_string());
    env.insert(STATE_ROOT_ENV.to_string(), paths.root.display().to_string());

    let mut argv = vec![shell_quote(&worker.agent.binary)];
    argv.extend(worker.agent.args.iter().map(|arg| shell_quote(arg)));
    let command_form = format!(
        "{} < {}",
        argv.join(" "),
        shell_quote(&stdin_path.display().to_string())
    );

    WorkerInvocation {
        binary: worker.agent.binary.clone(),
        args: worker.agent.args.clone(),
        env,
        stdin_path,
        command_form,
    }
}

pub fn save_invocation(
    paths: &StatePaths,
    run_id: &RunId,
    invocation: &WorkerInvocation,
) -> Result<(), RelayError> {
    let path = paths.run_invocation_path(run_id.as_str());
    let body = serde_json::to_vec_pretty(invocation).map_err(|source| RelayError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    replace_file(&path, &body)
}

pub fn load_invocation(paths: &StatePaths, run_id: &RunId) -> Result<WorkerInvocation, RelayError> {
    let path = paths.run_invocation_path(run_id.as_str());
    let raw = fs::read_to_string(&path).map_err(|source| io_error(&path, source))?;
    serde_json::from_str(&raw).map_err(|source| RelayError::CorruptState {
        path: path.display().to_string(),
        source,
    })
}

pub fn shell_quote(raw: &str) -> String {
    if !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "-_./=:,+@%".contains(ch))
    {
        return raw.to_string();
    }
    format!("'{}'", raw.replace('\'', "'\\''"))
}
