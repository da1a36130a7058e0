use crate::shared::ids::{AgentName, MessageId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Error,
    Completed,
    WaitingParentReply,
    ParentReplied,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Error | RunStatus::Completed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
            RunStatus::Completed => "completed",
            RunStatus::WaitingParentReply => "waiting_parent_reply",
            RunStatus::ParentReplied => "parent_replied",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "completed" => Ok(Self::Completed),
            "waiting_parent_reply" => Ok(Self::WaitingParentReply),
            "parent_replied" => Ok(Self::ParentReplied),
            other => Err(format!(
                "unknown run status `{other}`; expected one of: running, success, error, completed, waiting_parent_reply, parent_replied"
            )),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    PendingParentReply,
    ParentReplied,
    AcknowledgedBySubagent,
}

impl MessageStatus {
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (MessageStatus::PendingParentReply, MessageStatus::ParentReplied)
                | (
                    MessageStatus::ParentReplied,
                    MessageStatus::AcknowledgedBySubagent
                )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageStatus::PendingParentReply => "pending_parent_reply",
            MessageStatus::ParentReplied => "parent_replied",
            MessageStatus::AcknowledgedBySubagent => "acknowledged_by_subagent",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: MessageId,
    pub question_content: String,
    pub question_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub answer_content: Option<String>,
    #[serde(default)]
    pub answer_timestamp: Option<DateTime<Utc>>,
    pub message_status: MessageStatus,
}

impl Message {
    pub fn question(question_content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            message_id: MessageId::generate(),
            question_content: question_content.into(),
            question_timestamp: now,
            answer_content: None,
            answer_timestamp: None,
            message_status: MessageStatus::PendingParentReply,
        }
    }

    pub fn has_answer(&self) -> bool {
        self.answer_content
            .as_deref()
            .is_some_and(|answer| !answer.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDocument {
    pub run_id: RunId,
    pub agent_name: AgentName,
    pub command: String,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    pub status: RunStatus,
    #[serde(default)]
    pub exit_code: Option<i32>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl RunDocument {
    pub fn new_running(
        run_id: RunId,
        agent_name: AgentName,
        command: impl Into<String>,
        working_directory: PathBuf,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            agent_name,
            command: command.into(),
            working_directory: Some(working_directory),
            status: RunStatus::Running,
            exit_code: None,
            start_time: now,
            end_time: None,
            summary: None,
            messages: Vec::new(),
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| message.message_id.as_str() == message_id)
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.message_id.as_str() == message_id)
    }

    pub fn mark_ended(&mut self, now: DateTime<Utc>) {
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
    }
}
