use crate::shared::errors::RelayError;
use crate::shared::ids::{MessageId, RunId};
use crate::shared::logging::{record_event, RuntimeEvent};
use crate::shared::time::now_utc;
use crate::store::{Message, MessageStatus, RunDocument, RunStatus, RunStore};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskReceipt {
    pub message_id: MessageId,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyReceipt {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct MessageChannel {
    store: RunStore,
}

impl MessageChannel {
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    pub fn ask_parent(
        &self,
        run_id: &RunId,
        question_content: &str,
    ) -> Result<AskReceipt, RelayError> {
        if question_content.trim().is_empty() {
            return Err(RelayError::InvalidArgument(
                "question must be non-empty".to_string(),
            ));
        }
        let message = Message::question(question_content, now_utc());
        let message_id = message.message_id.clone();
        self.store.update(run_id.as_str(), |document| {
            ensure_not_terminal(document)?;
            document.messages.push(message);
            document.status = RunStatus::WaitingParentReply;
            Ok(())
        })?;
        record_event(
            self.store.paths(),
            RuntimeEvent::MessageAsked,
            run_id.as_str(),
            &format!("message_id={message_id}"),
        );
        Ok(AskReceipt {
            instructions: polling_instructions(run_id, &message_id),
            message_id,
        })
    }

    pub fn reply_subagent(
        &self,
        run_id: &RunId,
        message_id: &MessageId,
        answer_content: &str,
    ) -> Result<ReplyReceipt, RelayError> {
        if answer_content.trim().is_empty() {
            return Err(RelayError::InvalidArgument(
                "answer must be non-empty".to_string(),
            ));
        }
        self.store.update(run_id.as_str(), |document| {
            ensure_not_terminal(document)?;
            let message = find_message_mut(document, run_id, message_id)?;
            expect_status(message, MessageStatus::PendingParentReply)?;
            message.answer_content = Some(answer_content.to_string());
            message.answer_timestamp = Some(now_utc());
            message.message_status = MessageStatus::ParentReplied;
            document.status = RunStatus::ParentReplied;
            Ok(())
        })?;
        record_event(
            self.store.paths(),
            RuntimeEvent::MessageReplied,
            run_id.as_str(),
            &format!("message_id={message_id}"),
        );
        Ok(ReplyReceipt {
            success: true,
            message: format!("Reply recorded for message {message_id} in run {run_id}."),
        })
    }

    pub fn check_message_status(
        &self,
        run_id: &RunId,
        message_id: &MessageId,
    ) -> Result<Message, RelayError> {
        let document = self.store.load(run_id.as_str())?;
        let message = find_message(&document, run_id, message_id)?;
        if message.message_status != MessageStatus::ParentReplied {
            return Ok(message.clone());
        }

        let mut acknowledged = false;
        let document = self.store.update(run_id.as_str(), |document| {
            let message = find_message_mut(document, run_id, message_id)?;
            if message.message_status == MessageStatus::ParentReplied {
                message.message_status = MessageStatus::AcknowledgedBySubagent;
                acknowledged = true;
                if !document.status.is_terminal() {
                    document.status = RunStatus::Running;
                }
            }
            Ok(())
        })?;
        if acknowledged {
            record_event(
                self.store.paths(),
                RuntimeEvent::MessageAcknowledged,
                run_id.as_str(),
                &format!("message_id={message_id}"),
            );
        }
        find_message(&document, run_id, message_id).cloned()
    }

    pub fn update_status(
        &self,
        run_id: &RunId,
        status: RunStatus,
        summary: Option<&str>,
    ) -> Result<RunDocument, RelayError> {
        let document = self.store.update(run_id.as_str(), |document| {
            if document.status.is_terminal() && document.status != status {
                return Err(RelayError::InvalidStatusTransition {
                    from: document.status,
                    to: status,
                });
            }
            document.status = status;
            if let Some(summary) = summary {
                document.summary = Some(summary.to_string());
            }
            if status.is_terminal() {
                document.mark_ended(now_utc());
            }
            Ok(())
        })?;
        record_event(
            self.store.paths(),
            RuntimeEvent::RunStatusUpdated,
            run_id.as_str(),
            &format!("status={status}"),
        );
        Ok(document)
    }
}

pub fn polling_instructions(run_id: &RunId, message_id: &MessageId) -> String {
    format!(
        "Question sent as message {message_id}. The launching agent has been asked to reply. \
Poll with `subagent-relay check-message {run_id} {message_id}` (function `message.check_status`) \
until `messageStatus` is `acknowledged_by_subagent`, then read `answerContent` and continue."
    )
}

fn ensure_not_terminal(document: &RunDocument) -> Result<(), RelayError> {
    if document.status.is_terminal() {
        return Err(RelayError::RunTerminated {
            run_id: document.run_id.to_string(),
            status: document.status,
        });
    }
    Ok(())
}

fn expect_status(message: &Message, expected: MessageStatus) -> Result<(), RelayError> {
    if message.message_status != expected {
        return Err(RelayError::InvalidStateTransition {
            message_id: message.message_id.to_string(),
            expected,
            actual: message.message_status,
        });
    }
    Ok(())
}

fn find_message<'a>(
    document: &'a RunDocument,
    run_id: &RunId,
    message_id: &MessageId,
) -> Result<&'a Message, RelayError> {
    document
        .message(message_id.as_str())
        .ok_or_else(|| message_not_found(run_id, message_id))
}

fn find_message_mut<'a>(
    document: &'a mut RunDocument,
    run_id: &RunId,
    message_id: &MessageId,
) -> Result<&'a mut Message, RelayError> {
    document
        .message_mut(message_id.as_str())
        .ok_or_else(|| message_not_found(run_id, message_id))
}

fn message_not_found(run_id: &RunId, message_id: &MessageId) -> RelayError {
    RelayError::MessageNotFound {
        run_id: run_id.to_string(),
        message_id: message_id.to_string(),
    }
}
