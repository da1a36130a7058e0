use crate::app::cli::{help_text, parse_cli_verb, CliVerb};
use crate::app::command_catalog::function_ids;
use crate::app::command_dispatch::execute_function;
use crate::app::context::RelayContext;
use crate::config::resolve_state_root;
use crate::shared::errors::RelayError;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::PathBuf;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let (state_root, rest) = split_global_flags(&args)?;
    if rest.is_empty() {
        return Ok(help_text());
    }
    let verb = parse_cli_verb(rest[0].as_str());
    match verb {
        CliVerb::Help => return Ok(help_text()),
        CliVerb::Unknown => return Err(format!("unknown command `{}`", rest[0])),
        _ => {}
    }

    let paths = resolve_state_root(state_root.as_deref()).map_err(|e| e.to_string())?;
    let exe = std::env::current_exe().map_err(|e| format!("cannot locate executable: {e}"))?;
    let context = RelayContext::open(paths).map_err(render_error)?.detached(exe);
    run_verb(&context, verb, &rest[1..])
}

pub fn run_verb(context: &RelayContext, verb: CliVerb, args: &[String]) -> Result<String, String> {
    if verb == CliVerb::Supervise {
        if args.len() != 1 {
            return Err(format!("usage: {} <run_id>", crate::runner::SUPERVISE_VERB));
        }
        let document = context
            .runner
            .supervise_existing(&args[0])
            .map_err(render_error)?;
        return serde_json::to_string_pretty(&document).map_err(|e| e.to_string());
    }

    let (function_id, function_args) = plan_cli_invocation(verb, args)?;
    let result = execute_function(context, function_id, &function_args).map_err(render_error)?;
    render_result(function_id, &result)
}

pub fn plan_cli_invocation(
    verb: CliVerb,
    args: &[String],
) -> Result<(&'static str, Map<String, Value>), String> {
    let mut out = Map::new();
    let function_id = match verb {
        CliVerb::Start => {
            let Some((agent, flags)) = args.split_first() else {
                return Err(
                    "usage: start <agent> [--cwd DIR] --input TEXT|--input-file PATH|--input -"
                        .to_string(),
                );
            };
            out.insert("agentName".to_string(), Value::String(agent.clone()));
            let flags = parse_flags(flags, &["--cwd", "--input", "--input-file"])?;
            if let Some(cwd) = flags.get("--cwd") {
                out.insert("workingDirectory".to_string(), Value::String(cwd.clone()));
            }
            let input = match (flags.get("--input"), flags.get("--input-file")) {
                (Some(_), Some(_)) => {
                    return Err("use either --input or --input-file, not both".to_string())
                }
                (Some(text), None) if text == "-" => read_stdin()?,
                (Some(text), None) => text.clone(),
                (None, Some(path)) => std::fs::read_to_string(path)
                    .map_err(|e| format!("failed to read input file {path}: {e}"))?,
                (None, None) => return Err("start requires --input or --input-file".to_string()),
            };
            out.insert("input".to_string(), Value::String(input));
            function_ids::RUN_START
        }
        CliVerb::Status => {
            let [run_id] = args else {
                return Err("usage: status <run_id>".to_string());
            };
            out.insert("runId".to_string(), Value::String(run_id.clone()));
            function_ids::RUN_STATUS
        }
        CliVerb::UpdateStatus => {
            if args.len() < 2 {
                return Err(
                    "usage: update-status <run_id> <status> [--summary TEXT]".to_string(),
                );
            }
            out.insert("runId".to_string(), Value::String(args[0].clone()));
            out.insert("status".to_string(), Value::String(args[1].clone()));
            let flags = parse_flags(&args[2..], &["--summary"])?;
            if let Some(summary) = flags.get("--summary") {
                out.insert("summary".to_string(), Value::String(summary.clone()));
            }
            function_ids::RUN_UPDATE_STATUS
        }
        CliVerb::Logs => {
            let [run_id] = args else {
                return Err("usage: logs <run_id>".to_string());
            };
            out.insert("runId".to_string(), Value::String(run_id.clone()));
            function_ids::RUN_LOGS
        }
        CliVerb::Ask => {
            if args.len() < 2 {
                return Err("usage: ask <run_id> <question>".to_string());
            }
            out.insert("runId".to_string(), Value::String(args[0].clone()));
            out.insert("question".to_string(), Value::String(args[1..].join(" ")));
            function_ids::MESSAGE_ASK_PARENT
        }
        CliVerb::Reply => {
            if args.len() < 3 {
                return Err("usage: reply <run_id> <message_id> <answer>".to_string());
            }
            out.insert("runId".to_string(), Value::String(args[0].clone()));
            out.insert("messageId".to_string(), Value::String(args[1].clone()));
            out.insert("answer".to_string(), Value::String(args[2..].join(" ")));
            function_ids::MESSAGE_REPLY_SUBAGENT
        }
        CliVerb::CheckMessage => {
            let [run_id, message_id] = args else {
                return Err("usage: check-message <run_id> <message_id>".to_string());
            };
            out.insert("runId".to_string(), Value::String(run_id.clone()));
            out.insert("messageId".to_string(), Value::String(message_id.clone()));
            function_ids::MESSAGE_CHECK_STATUS
        }
        CliVerb::Agents => {
            if !args.is_empty() {
                return Err("usage: agents".to_string());
            }
            function_ids::AGENT_LIST
        }
        CliVerb::Call => {
            let Some((function_id, rest)) = args.split_first() else {
                return Err("usage: call <function_id> [json_args]".to_string());
            };
            let function = crate::app::command_catalog::function_def(function_id)
                .ok_or_else(|| format!("unknown function id `{function_id}`"))?;
            match rest {
                [] => {}
                [raw] => {
                    out = serde_json::from_str::<Map<String, Value>>(raw)
                        .map_err(|e| format!("function arguments must be a json object: {e}"))?;
                }
                _ => return Err("usage: call <function_id> [json_args]".to_string()),
            }
            function.function_id
        }
        CliVerb::Supervise | CliVerb::Help | CliVerb::Unknown => {
            return Err("command is not a function invocation".to_string())
        }
    };
    Ok((function_id, out))
}

fn render_result(function_id: &str, result: &Value) -> Result<String, String> {
    match (function_id, result) {
        (function_ids::RUN_LOGS, Value::String(logs)) => Ok(logs.clone()),
        (function_ids::AGENT_LIST, Value::Array(agents)) => Ok(agents
            .iter()
            .map(|agent| {
                let args = agent["args"]
                    .as_array()
                    .map(|args| {
                        args.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                format!(
                    "agent={} binary={} args={}",
                    agent["agentName"].as_str().unwrap_or_default(),
                    agent["binary"].as_str().unwrap_or_default(),
                    args
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        _ => serde_json::to_string_pretty(result).map_err(|e| e.to_string()),
    }
}

fn render_error(err: RelayError) -> String {
    format!("error[{}]: {err}", err.kind())
}

fn split_global_flags(args: &[String]) -> Result<(Option<PathBuf>, Vec<String>), String> {
    let mut state_root = None;
    let mut rest = args;
    while let Some(first) = rest.first() {
        if first != "--state-root" {
            break;
        }
        let value = rest
            .get(1)
            .ok_or_else(|| "--state-root requires a directory".to_string())?;
        state_root = Some(PathBuf::from(value));
        rest = &rest[2..];
    }
    Ok((state_root, rest.to_vec()))
}

fn parse_flags(
    args: &[String],
    allowed: &[&str],
) -> Result<std::collections::BTreeMap<String, String>, String> {
    let mut flags = std::collections::BTreeMap::new();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        if !allowed.contains(&flag.as_str()) {
            return Err(format!("unexpected argument `{flag}`"));
        }
        let value = iter
            .next()
            .ok_or_else(|| format!("{flag} requires a value"))?;
        flags.insert(flag.clone(), value.clone());
    }
    Ok(flags)
}

fn read_stdin() -> Result<String, String> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(input)
}
