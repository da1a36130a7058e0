#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read relay settings at {path}: {source}")]
    SettingsUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("relay settings at {path} are not valid yaml: {source}")]
    SettingsSyntax {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("relay settings rejected: {0}")]
    InvalidSettings(String),
    #[error("cannot prepare state root directory {path}: {source}")]
    StateRootUnavailable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no state root: pass --state-root, set SUBAGENT_RELAY_HOME, or set HOME")]
    NoHomeDirectory,
}
