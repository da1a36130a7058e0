use crate::app::command_catalog::{function_def, FunctionArgs, FunctionDef};
use crate::app::context::RelayContext;
use crate::shared::errors::{io_error, RelayError};
use crate::shared::ids::{MessageId, RunId};
use crate::store::RunStatus;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

pub fn execute_function(
    context: &RelayContext,
    function_id: &str,
    args: &Map<String, Value>,
) -> Result<Value, RelayError> {
    let function = function_def(function_id).ok_or_else(|| {
        RelayError::InvalidArgument(format!("unknown function id `{function_id}`"))
    })?;
    validate_function_args(function, args)?;
    (function.handler)(context, &FunctionArgs::new(args))
}

pub fn validate_function_args(
    function: &FunctionDef,
    args: &Map<String, Value>,
) -> Result<(), RelayError> {
    for key in args.keys() {
        if !function.args.iter().any(|arg| arg.name == key) {
            return Err(RelayError::InvalidArgument(format!(
                "unknown function argument `{key}` for `{}`",
                function.function_id
            )));
        }
    }
    for arg in function.args {
        match args.get(arg.name) {
            Some(Value::String(value)) if arg.required && value.trim().is_empty() => {
                return Err(RelayError::InvalidArgument(format!(
                    "missing required function argument `{}`",
                    arg.name
                )));
            }
            Some(Value::String(_)) => {}
            Some(Value::Null) | None if arg.required => {
                return Err(RelayError::InvalidArgument(format!(
                    "missing required function argument `{}`",
                    arg.name
                )));
            }
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(RelayError::InvalidArgument(format!(
                    "argument `{}` must be a string",
                    arg.name
                )));
            }
        }
    }
    Ok(())
}

pub(crate) fn handle_run_start(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let agent_name = args.required_str("agentName")?;
    let input = args.required_str("input")?;
    let working_directory = match args.optional_str("workingDirectory")? {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().map_err(|source| io_error(Path::new("."), source))?,
    };
    let run_id = context.start_run(agent_name, input, &working_directory)?;
    Ok(json!({ "runId": run_id }))
}

pub(crate) fn handle_run_status(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let view = context.reporter.get_status(args.required_str("runId")?)?;
    to_value(&view)
}

pub(crate) fn handle_run_update_status(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let run_id = run_id_arg(args)?;
    let status =
        RunStatus::parse(args.required_str("status")?).map_err(RelayError::InvalidArgument)?;
    let summary = args.optional_str("summary")?;
    let document = context.channel.update_status(&run_id, status, summary)?;
    to_value(&document)
}

pub(crate) fn handle_run_logs(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let logs = context.reporter.get_logs(&run_id_arg(args)?)?;
    Ok(Value::String(logs))
}

pub(crate) fn handle_message_ask_parent(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let receipt = context
        .channel
        .ask_parent(&run_id_arg(args)?, args.required_str("question")?)?;
    to_value(&receipt)
}

pub(crate) fn handle_message_reply_subagent(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let receipt = context.channel.reply_subagent(
        &run_id_arg(args)?,
        &message_id_arg(args)?,
        args.required_str("answer")?,
    )?;
    to_value(&receipt)
}

pub(crate) fn handle_message_check_status(
    context: &RelayContext,
    args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let message = context
        .channel
        .check_message_status(&run_id_arg(args)?, &message_id_arg(args)?)?;
    to_value(&message)
}

pub(crate) fn handle_agent_list(
    context: &RelayContext,
    _args: &FunctionArgs<'_>,
) -> Result<Value, RelayError> {
    let agents = context
        .settings
        .resolved_agents()
        .into_iter()
        .map(|(name, agent)| {
            json!({
                "agentName": name,
                "binary": agent.binary,
                "args": agent.args,
            })
        })
        .collect::<Vec<_>>();
    Ok(Value::Array(agents))
}

fn run_id_arg(args: &FunctionArgs<'_>) -> Result<RunId, RelayError> {
    RunId::parse(args.required_str("runId")?).map_err(RelayError::InvalidArgument)
}

fn message_id_arg(args: &FunctionArgs<'_>) -> Result<MessageId, RelayError> {
    MessageId::parse(args.required_str("messageId")?).map_err(RelayError::InvalidArgument)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RelayError> {
    serde_json::to_value(value).map_err(|source| RelayError::Encode {
        path: "function result".to_string(),
        source,
    })
}
