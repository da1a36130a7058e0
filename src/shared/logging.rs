use crate::config::StatePaths;
use crate::shared::time::{iso8601, now_utc};
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Runtime journal events, one JSON line each in `logs/runtime.log`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    RunCreated,
    RunSpawned,
    RunSupervisorSpawned,
    RunSpawnFailed,
    RunCompleted,
    RunTerminalStatusPreserved,
    RunExitForced,
    RunCaptureFailed,
    RunWaitFailed,
    RunSupervisionFailed,
    RunStatusUpdated,
    MessageAsked,
    MessageReplied,
    MessageAcknowledged,
    StoreLockBroken,
}

impl RuntimeEvent {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeEvent::RunCreated => "run.created",
            RuntimeEvent::RunSpawned => "run.spawned",
            RuntimeEvent::RunSupervisorSpawned => "run.supervisor_spawned",
            RuntimeEvent::RunSpawnFailed => "run.spawn_failed",
            RuntimeEvent::RunCompleted => "run.completed",
            RuntimeEvent::RunTerminalStatusPreserved => "run.terminal_status_preserved",
            RuntimeEvent::RunExitForced => "run.exit_forced",
            RuntimeEvent::RunCaptureFailed => "run.capture_failed",
            RuntimeEvent::RunWaitFailed => "run.wait_failed",
            RuntimeEvent::RunSupervisionFailed => "run.supervision_failed",
            RuntimeEvent::RunStatusUpdated => "run.status_updated",
            RuntimeEvent::MessageAsked => "message.asked",
            RuntimeEvent::MessageReplied => "message.replied",
            RuntimeEvent::MessageAcknowledged => "message.acknowledged",
            RuntimeEvent::StoreLockBroken => "store.lock_broken",
        }
    }

    pub fn level(self) -> EventLevel {
        match self {
            RuntimeEvent::RunSpawnFailed
            | RuntimeEvent::RunWaitFailed
            | RuntimeEvent::RunSupervisionFailed => EventLevel::Error,
            RuntimeEvent::RunExitForced
            | RuntimeEvent::RunCaptureFailed
            | RuntimeEvent::StoreLockBroken => EventLevel::Warn,
            _ => EventLevel::Info,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JournalLine<'a> {
    timestamp: String,
    level: EventLevel,
    event: &'static str,
    run_id: &'a str,
    detail: &'a str,
}

/// Best-effort: a journal that cannot be written never fails the caller.
pub fn record_event(paths: &StatePaths, event: RuntimeEvent, run_id: &str, detail: &str) {
    let line = JournalLine {
        timestamp: iso8601(now_utc()),
        level: event.level(),
        event: event.name(),
        run_id,
        detail,
    };
    let Ok(encoded) = serde_json::to_string(&line) else {
        return;
    };

    let path = paths.runtime_log_path();
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    if let Ok(mut journal) = fs::OpenOptions::new().create(true).append(true).open(path) {
        let _ = writeln!(journal, "{encoded}");
    }
}
