use crate::runner::read_log;
use crate::shared::errors::{io_error, RelayError};
use crate::shared::ids::RunId;
use crate::store::{Message, MessageStatus, RunDocument, RunStatus, RunStore};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotFoundStatus {
    #[serde(rename = "not_found")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundView {
    pub run_id: String,
    pub status: NotFoundStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    #[serde(flatten)]
    pub document: RunDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub awaiting_reply: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusView {
    NotFound(NotFoundView),
    Found(RunView),
}

impl StatusView {
    pub fn not_found(run_id: impl Into<String>) -> Self {
        StatusView::NotFound(NotFoundView {
            run_id: run_id.into(),
            status: NotFoundStatus::NotFound,
        })
    }

    pub fn run_id(&self) -> &str {
        match self {
            StatusView::NotFound(view) => &view.run_id,
            StatusView::Found(view) => view.document.run_id.as_str(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            StatusView::NotFound(_) => "not_found",
            StatusView::Found(view) => view.document.status.as_str(),
        }
    }

    pub fn run(&self) -> Option<&RunView> {
        match self {
            StatusView::NotFound(_) => None,
            StatusView::Found(view) => Some(view),
        }
    }
}

impl RunView {
    pub fn from_document(document: RunDocument) -> Self {
        let awaiting_reply = match document.status {
            RunStatus::WaitingParentReply => latest_pending_question(&document).cloned(),
            _ => None,
        };
        let last_interaction = match document.status {
            RunStatus::Running | RunStatus::ParentReplied => {
                latest_answered_message(&document).cloned()
            }
            _ => None,
        };
        Self {
            document,
            awaiting_reply,
            last_interaction,
        }
    }
}

pub fn latest_pending_question(document: &RunDocument) -> Option<&Message> {
    document
        .messages
        .iter()
        .rev()
        .find(|message| message.message_status == MessageStatus::PendingParentReply)
}

pub fn latest_answered_message(document: &RunDocument) -> Option<&Message> {
    document.messages.iter().rev().find(|message| {
        message.has_answer()
            && matches!(
                message.message_status,
                MessageStatus::AcknowledgedBySubagent | MessageStatus::ParentReplied
            )
    })
}

pub fn missing_log_placeholder(run_id: &str) -> String {
    format!("No logs found for run {run_id}.")
}

#[derive(Debug, Clone)]
pub struct StatusReporter {
    store: RunStore,
}

impl StatusReporter {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    pub fn get_status(&self, run_id: &str) -> Result<StatusView, RelayError> {
        if RunId::parse(run_id).is_err() {
            return Ok(StatusView::not_found(run_id));
        }
        Ok(match self.store.read(run_id)? {
            Some(document) => StatusView::Found(RunView::from_document(document)),
            None => StatusView::not_found(run_id),
        })
    }

    pub fn get_logs(&self, run_id: &RunId) -> Result<String, RelayError> {
        let path = self.store.paths().run_log_path(run_id.as_str());
        let log = read_log(&path).map_err(|source| io_error(&path, source))?;
        Ok(log.unwrap_or_else(|| missing_log_placeholder(run_id.as_str())))
    }
}
