use crate::config::ConfigError;
use crate::store::{MessageStatus, RunStatus};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("run `{run_id}` not found")]
    RunNotFound { run_id: String },
    #[error("message `{message_id}` not found in run `{run_id}`")]
    MessageNotFound { run_id: String, message_id: String },
    #[error("run document {path} is corrupt: {source}")]
    CorruptState {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("run document {path} holds run id `{found}`")]
    RunIdMismatch { path: String, found: String },
    #[error("message `{message_id}` is `{actual}`; expected `{expected}`")]
    InvalidStateTransition {
        message_id: String,
        expected: MessageStatus,
        actual: MessageStatus,
    },
    #[error("run status `{from}` -> `{to}` is invalid")]
    InvalidStatusTransition { from: RunStatus, to: RunStatus },
    #[error("run `{run_id}` already finished with status `{status}`")]
    RunTerminated { run_id: String, status: RunStatus },
    #[error("run `{run_id}` already has a supervisor")]
    AlreadySupervised { run_id: String },
    #[error("unknown agent `{0}`")]
    UnknownAgent(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("timed out after {waited_ms}ms waiting for lock on run `{run_id}`")]
    LockTimeout { run_id: String, waited_ms: u64 },
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RelayError::RunNotFound { .. } | RelayError::MessageNotFound { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::RunNotFound { .. } | RelayError::MessageNotFound { .. } => "not_found",
            RelayError::CorruptState { .. } | RelayError::RunIdMismatch { .. } => "corrupt_state",
            RelayError::InvalidStateTransition { .. }
            | RelayError::InvalidStatusTransition { .. }
            | RelayError::RunTerminated { .. }
            | RelayError::AlreadySupervised { .. } => "invalid_state_transition",
            RelayError::UnknownAgent(_) | RelayError::InvalidArgument(_) => "invalid_argument",
            RelayError::LockTimeout { .. } => "lock_timeout",
            RelayError::Io { .. } | RelayError::Encode { .. } => "io",
            RelayError::Config(_) => "config",
        }
    }
}

pub(crate) fn io_error(path: &std::path::Path, source: std::io::Error) -> RelayError {
    RelayError::Io {
        path: path.display().to_string(),
        source,
    }
}
