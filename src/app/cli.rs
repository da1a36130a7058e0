#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Start,
    Status,
    UpdateStatus,
    Logs,
    Ask,
    Reply,
    CheckMessage,
    Agents,
    Call,
    Supervise,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "start" => CliVerb::Start,
        "status" => CliVerb::Status,
        "update-status" => CliVerb::UpdateStatus,
        "logs" => CliVerb::Logs,
        "ask" => CliVerb::Ask,
        "reply" => CliVerb::Reply,
        "check-message" => CliVerb::CheckMessage,
        "agents" => CliVerb::Agents,
        "call" => CliVerb::Call,
        crate::runner::SUPERVISE_VERB => CliVerb::Supervise,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Usage: subagent-relay [--state-root DIR] <command> ...".to_string(),
        String::new(),
        "Commands:".to_string(),
        "  start <agent> [--cwd DIR] --input TEXT|--input-file PATH|--input -".to_string(),
        "                                       Launch a worker run and print its run id"
            .to_string(),
        "  status <run_id>                      Show run status and pending/last message"
            .to_string(),
        "  update-status <run_id> <status> [--summary TEXT]".to_string(),
        "                                       Report run status from inside the worker"
            .to_string(),
        "  logs <run_id>                        Print the worker output log".to_string(),
        "  ask <run_id> <question>              Ask the launching agent a question".to_string(),
        "  reply <run_id> <message_id> <answer> Answer a pending worker question".to_string(),
        "  check-message <run_id> <message_id>  Read a question; acknowledges a fresh reply"
            .to_string(),
        "  agents                               List configured worker agents".to_string(),
        "  call <function_id> [json_args]       Invoke a function by id".to_string(),
    ]
}

pub fn help_text() -> String {
    cli_help_lines().join("\n")
}
