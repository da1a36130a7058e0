use chrono::Utc;
use std::path::PathBuf;
use subagent_relay::channel::MessageChannel;
use subagent_relay::config::{Settings, StatePaths};
use subagent_relay::shared::ids::{AgentName, MessageId, RunId};
use subagent_relay::status::StatusReporter;
use subagent_relay::store::{MessageStatus, RunDocument, RunStatus, RunStore};
use subagent_relay::RelayError;
use tempfile::{tempdir, TempDir};

struct Fixture {
    _temp: TempDir,
    store: RunStore,
    channel: MessageChannel,
    reporter: StatusReporter,
    run_id: RunId,
}

fn fixture() -> Fixture {
    let temp = tempdir().expect("tempdir");
    let store = RunStore::new(StatePaths::new(temp.path()), &Settings::default());
    let run_id = RunId::generate();
    store
        .create(&RunDocument::new_running(
            run_id.clone(),
            AgentName::parse("shell").expect("agent"),
            "sh",
            PathBuf::from("/tmp"),
            Utc::now(),
        ))
        .expect("create run");
    Fixture {
        channel: MessageChannel::new(store.clone()),
        reporter: StatusReporter::new(store.clone()),
        store,
        run_id,
        _temp: temp,
    }
}

fn run_status(fx: &Fixture) -> RunStatus {
    fx.store.load(fx.run_id.as_str()).expect("load").status
}

#[test]
fn message_channel_module_full_question_answer_cycle() {
    let fx = fixture();

    let receipt = fx
        .channel
        .ask_parent(&fx.run_id, "continue?")
        .expect("ask");
    assert!(receipt.instructions.contains(receipt.message_id.as_str()));
    assert!(receipt.instructions.contains("check-message"));
    assert_eq!(run_status(&fx), RunStatus::WaitingParentReply);

    let pending = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("check pending");
    assert_eq!(pending.message_status, MessageStatus::PendingParentReply);
    assert!(pending.answer_content.is_none());
    assert_eq!(run_status(&fx), RunStatus::WaitingParentReply);

    let reply = fx
        .channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "yes")
        .expect("reply");
    assert!(reply.success);
    assert_eq!(run_status(&fx), RunStatus::ParentReplied);

    let answered = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("check answered");
    assert_eq!(answered.answer_content.as_deref(), Some("yes"));
    assert!(answered.answer_timestamp.is_some());
    assert_eq!(answered.question_content, "continue?");
    assert_eq!(
        answered.message_status,
        MessageStatus::AcknowledgedBySubagent
    );
    assert_eq!(run_status(&fx), RunStatus::Running);
}

#[test]
fn message_channel_module_acknowledgment_is_idempotent() {
    let fx = fixture();
    let receipt = fx.channel.ask_parent(&fx.run_id, "which branch?").expect("ask");
    fx.channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "main")
        .expect("reply");

    let first = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("first check");
    assert_eq!(first.message_status, MessageStatus::AcknowledgedBySubagent);
    assert_eq!(run_status(&fx), RunStatus::Running);

    fx.channel
        .update_status(&fx.run_id, RunStatus::WaitingParentReply, None)
        .expect("simulate unrelated status change");
    let second = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("second check");
    assert_eq!(second.message_status, MessageStatus::AcknowledgedBySubagent);
    assert_eq!(second, first);
    assert_eq!(run_status(&fx), RunStatus::WaitingParentReply);
}

#[test]
fn message_channel_module_rejects_double_reply() {
    let fx = fixture();
    let receipt = fx.channel.ask_parent(&fx.run_id, "continue?").expect("ask");

    fx.channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "yes")
        .expect("first reply");
    let err = fx
        .channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "no")
        .expect_err("second reply");
    match err {
        RelayError::InvalidStateTransition {
            expected, actual, ..
        } => {
            assert_eq!(expected, MessageStatus::PendingParentReply);
            assert_eq!(actual, MessageStatus::ParentReplied);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    fx.channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("acknowledge");
    let err = fx
        .channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "again")
        .expect_err("reply after acknowledgment");
    assert_eq!(err.kind(), "invalid_state_transition");

    let message = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("check");
    assert_eq!(message.answer_content.as_deref(), Some("yes"));
}

#[test]
fn message_channel_module_not_found_conditions() {
    let fx = fixture();
    let ghost_run = RunId::generate();
    let ghost_message = MessageId::generate();

    let err = fx
        .channel
        .ask_parent(&ghost_run, "hello?")
        .expect_err("missing run");
    assert!(matches!(err, RelayError::RunNotFound { .. }));

    let err = fx
        .channel
        .reply_subagent(&fx.run_id, &ghost_message, "yes")
        .expect_err("missing message");
    assert!(matches!(err, RelayError::MessageNotFound { .. }));

    let err = fx
        .channel
        .check_message_status(&fx.run_id, &ghost_message)
        .expect_err("missing message");
    assert!(err.is_not_found());

    let err = fx
        .channel
        .check_message_status(&ghost_run, &ghost_message)
        .expect_err("missing run");
    assert!(matches!(err, RelayError::RunNotFound { .. }));
}

#[test]
fn message_channel_module_rejects_empty_question_before_mutation() {
    let fx = fixture();
    let err = fx.channel.ask_parent(&fx.run_id, "   ").expect_err("empty");
    assert!(matches!(err, RelayError::InvalidArgument(_)));
    let document = fx.store.load(fx.run_id.as_str()).expect("load");
    assert!(document.messages.is_empty());
    assert_eq!(document.status, RunStatus::Running);
}

#[test]
fn message_channel_module_status_view_tracks_latest_question() {
    let fx = fixture();
    let first = fx.channel.ask_parent(&fx.run_id, "first?").expect("ask 1");
    let second = fx.channel.ask_parent(&fx.run_id, "second?").expect("ask 2");

    let view = fx
        .reporter
        .get_status(fx.run_id.as_str())
        .expect("status");
    assert_eq!(view.status_label(), "waiting_parent_reply");
    let awaiting = view
        .run()
        .and_then(|run| run.awaiting_reply.clone())
        .expect("awaiting");
    assert_eq!(awaiting.message_id, second.message_id);

    fx.channel
        .reply_subagent(&fx.run_id, &first.message_id, "one")
        .expect("reply first");
    let view = fx
        .reporter
        .get_status(fx.run_id.as_str())
        .expect("status after reply");
    assert_eq!(view.status_label(), "parent_replied");
    let last = view
        .run()
        .and_then(|run| run.last_interaction.clone())
        .expect("last interaction");
    assert_eq!(last.answer_content.as_deref(), Some("one"));
    assert_eq!(last.message_status, MessageStatus::ParentReplied);

    let stored = fx.store.load(fx.run_id.as_str()).expect("load");
    assert_eq!(
        stored.message(first.message_id.as_str()).expect("first").message_status,
        MessageStatus::ParentReplied
    );
}

#[test]
fn message_channel_module_terminal_runs_reject_new_exchanges() {
    let fx = fixture();
    let receipt = fx.channel.ask_parent(&fx.run_id, "continue?").expect("ask");
    fx.channel
        .reply_subagent(&fx.run_id, &receipt.message_id, "yes")
        .expect("reply");
    fx.channel
        .update_status(&fx.run_id, RunStatus::Completed, Some("wrapped up"))
        .expect("complete");

    let err = fx
        .channel
        .ask_parent(&fx.run_id, "one more?")
        .expect_err("terminal ask");
    assert!(matches!(
        err,
        RelayError::RunTerminated {
            status: RunStatus::Completed,
            ..
        }
    ));

    let message = fx
        .channel
        .check_message_status(&fx.run_id, &receipt.message_id)
        .expect("check");
    assert_eq!(message.message_status, MessageStatus::AcknowledgedBySubagent);
    assert_eq!(run_status(&fx), RunStatus::Completed);
}

#[test]
fn message_channel_module_update_status_rules() {
    let fx = fixture();

    let document = fx
        .channel
        .update_status(&fx.run_id, RunStatus::Success, Some("all tests pass"))
        .expect("success");
    assert_eq!(document.status, RunStatus::Success);
    assert_eq!(document.summary.as_deref(), Some("all tests pass"));
    let ended = document.end_time.expect("end time");

    let document = fx
        .channel
        .update_status(&fx.run_id, RunStatus::Success, None)
        .expect("same terminal status");
    assert_eq!(document.summary.as_deref(), Some("all tests pass"));
    assert_eq!(document.end_time, Some(ended));

    let err = fx
        .channel
        .update_status(&fx.run_id, RunStatus::Running, None)
        .expect_err("leaving terminal");
    assert!(matches!(
        err,
        RelayError::InvalidStatusTransition {
            from: RunStatus::Success,
            to: RunStatus::Running
        }
    ));

    let err = fx
        .channel
        .update_status(
            &RunId::generate(),
            RunStatus::Success,
            None,
        )
        .expect_err("missing");
    assert!(err.is_not_found());
}
