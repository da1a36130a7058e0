use crate::store::{RunDocument, RunStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Classified(RunStatus),
    Preserved(RunStatus),
}

impl ExitDisposition {
    pub fn status(self) -> RunStatus {
        match self {
            ExitDisposition::Classified(status) | ExitDisposition::Preserved(status) => status,
        }
    }
}

pub fn classify_exit(exit_code: Option<i32>) -> RunStatus {
    match exit_code {
        Some(0) => RunStatus::Success,
        _ => RunStatus::Error,
    }
}

pub fn apply_exit<F>(
    document: &mut RunDocument,
    exit_code: Option<i32>,
    log_tail: F,
    now: DateTime<Utc>,
) -> ExitDisposition
where
    F: FnOnce() -> String,
{
    document.exit_code = exit_code;
    let disposition = if document.status.is_terminal() {
        ExitDisposition::Preserved(document.status)
    } else {
        document.status = classify_exit(exit_code);
        ExitDisposition::Classified(document.status)
    };
    if document.status == RunStatus::Error && document.summary.is_none() {
        document.summary = Some(exit_failure_summary(exit_code, &log_tail()));
    }
    document.mark_ended(now);
    disposition
}

pub fn apply_spawn_failure(
    document: &mut RunDocument,
    reason: &str,
    log_tail: &str,
    now: DateTime<Utc>,
) {
    document.status = RunStatus::Error;
    document.summary = Some(with_log_tail(
        format!("failed to start worker: {reason}"),
        log_tail,
    ));
    document.mark_ended(now);
}

pub fn exit_failure_summary(exit_code: Option<i32>, log_tail: &str) -> String {
    let head = match exit_code {
        Some(code) => format!("worker exited with code {code}"),
        None => "worker was terminated by a signal".to_string(),
    };
    with_log_tail(head, log_tail)
}

fn with_log_tail(head: String, log_tail: &str) -> String {
    if log_tail.trim().is_empty() {
        return head;
    }
    format!("{head}\nlast log lines:\n{log_tail}")
}
