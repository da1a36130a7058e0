pub mod agents;
pub mod error;
pub mod paths;
pub mod settings;

pub use agents::{builtin_agents, AgentConfig};
pub use error::ConfigError;
pub use paths::{
    bootstrap_state_root, resolve_state_root, StatePaths, DEFAULT_STATE_ROOT_DIR, STATE_ROOT_ENV,
};
pub use settings::{
    Settings, DEFAULT_LOCK_POLL_MS, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_SUMMARY_TAIL_LINES,
};
