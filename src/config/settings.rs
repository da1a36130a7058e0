use super::{builtin_agents, AgentConfig, ConfigError, StatePaths};
use crate::shared::ids::validate_agent_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SUMMARY_TAIL_LINES: usize = 50;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LOCK_POLL_MS: u64 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_summary_tail_lines")]
    pub summary_tail_lines: usize,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_poll_ms")]
    pub lock_poll_ms: u64,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            summary_tail_lines: DEFAULT_SUMMARY_TAIL_LINES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            lock_poll_ms: DEFAULT_LOCK_POLL_MS,
            agents: BTreeMap::new(),
        }
    }
}

fn default_summary_tail_lines() -> usize {
    DEFAULT_SUMMARY_TAIL_LINES
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_lock_poll_ms() -> u64 {
    DEFAULT_LOCK_POLL_MS
}

impl Settings {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::SettingsUnreadable {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::SettingsSyntax {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(paths: &StatePaths) -> Result<Self, ConfigError> {
        let path = paths.settings_file();
        let settings = match Self::from_path(&path) {
            Ok(settings) => settings,
            Err(ConfigError::SettingsUnreadable { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => return Err(err),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.summary_tail_lines == 0 {
            return Err(ConfigError::InvalidSettings(
                "`summary_tail_lines` must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidSettings(
                "`lock_timeout_ms` must be greater than zero".to_string(),
            ));
        }
        if self.lock_poll_ms == 0 || self.lock_poll_ms > self.lock_timeout_ms {
            return Err(ConfigError::InvalidSettings(
                "`lock_poll_ms` must be between 1 and `lock_timeout_ms`".to_string(),
            ));
        }
        for (name, agent) in &self.agents {
            validate_agent_name(name).map_err(ConfigError::InvalidSettings)?;
            if agent.binary.trim().is_empty() {
                return Err(ConfigError::InvalidSettings(format!(
                    "agent `{name}` must set a non-empty `binary`"
                )));
            }
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    pub fn resolved_agents(&self) -> BTreeMap<String, AgentConfig> {
        let mut agents = builtin_agents();
        for (name, agent) in &self.agents {
            agents.insert(name.clone(), agent.clone());
        }
        agents
    }

    pub fn agent(&self, name: &str) -> Option<AgentConfig> {
        self.agents
            .get(name)
            .cloned()
            .or_else(|| builtin_agents().remove(name))
    }
}
