use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AgentConfig {
    pub binary: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AgentConfig {
    pub fn new(binary: impl Into<String>, args: &[&str]) -> Self {
        Self {
            binary: binary.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }
}

pub fn builtin_agents() -> BTreeMap<String, AgentConfig> {
    let mut agents = BTreeMap::new();
    agents.insert(
        "claude".to_string(),
        AgentConfig::new(
            "claude",
            &["-p", "--output-format", "text", "--dangerously-skip-permissions"],
        ),
    );
    agents.insert(
        "codex".to_string(),
        AgentConfig::new(
            "codex",
            &[
                "exec",
                "--skip-git-repo-check",
                "--dangerously-bypass-approvals-and-sandbox",
                "-",
            ],
        ),
    );
    agents.insert(
        "gemini".to_string(),
        AgentConfig::new("gemini", &["--yolo"]),
    );
    agents
}
