use crate::app::context::RelayContext;
use crate::shared::errors::RelayError;
use serde_json::{Map, Value};

pub type FunctionHandler = fn(&RelayContext, &FunctionArgs<'_>) -> Result<Value, RelayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionArgDef {
    pub name: &'static str,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub function_id: &'static str,
    pub description: &'static str,
    pub args: &'static [FunctionArgDef],
    pub read_only: bool,
    pub handler: FunctionHandler,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionArgs<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> FunctionArgs<'a> {
    pub(crate) fn new(values: &'a Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn required_str(&self, name: &str) -> Result<&'a str, RelayError> {
        self.optional_str(name)?.ok_or_else(|| {
            RelayError::InvalidArgument(format!("missing required function argument `{name}`"))
        })
    }

    pub fn optional_str(&self, name: &str) -> Result<Option<&'a str>, RelayError> {
        match self.values.get(name) {
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(Value::Null) | None => Ok(None),
            Some(_) => Err(RelayError::InvalidArgument(format!(
                "argument `{name}` must be a string"
            ))),
        }
    }
}

pub mod function_ids {
    pub const RUN_START: &str = "run.start";
    pub const RUN_STATUS: &str = "run.status";
    pub const RUN_UPDATE_STATUS: &str = "run.update_status";
    pub const RUN_LOGS: &str = "run.logs";
    pub const MESSAGE_ASK_PARENT: &str = "message.ask_parent";
    pub const MESSAGE_REPLY_SUBAGENT: &str = "message.reply_subagent";
    pub const MESSAGE_CHECK_STATUS: &str = "message.check_status";
    pub const AGENT_LIST: &str = "agent.list";
}

const RUN_ID_ARG: FunctionArgDef = FunctionArgDef {
    name: "runId",
    required: true,
    description: "Run identifier returned by run.start",
};

const MESSAGE_ID_ARG: FunctionArgDef = FunctionArgDef {
    name: "messageId",
    required: true,
    description: "Message identifier returned by message.ask_parent",
};

const RUN_START_ARGS: &[FunctionArgDef] = &[
    FunctionArgDef {
        name: "agentName",
        required: true,
        description: "Configured worker agent name",
    },
    FunctionArgDef {
        name: "input",
        required: true,
        description: "Task text delivered to the worker on stdin",
    },
    FunctionArgDef {
        name: "workingDirectory",
        required: false,
        description: "Directory the worker runs in; defaults to the current directory",
    },
];

const RUN_UPDATE_STATUS_ARGS: &[FunctionArgDef] = &[
    RUN_ID_ARG,
    FunctionArgDef {
        name: "status",
        required: true,
        description: "New run status",
    },
    FunctionArgDef {
        name: "summary",
        required: false,
        description: "Result or failure summary",
    },
];

const MESSAGE_ASK_PARENT_ARGS: &[FunctionArgDef] = &[
    RUN_ID_ARG,
    FunctionArgDef {
        name: "question",
        required: true,
        description: "Question for the launching agent",
    },
];

const MESSAGE_REPLY_SUBAGENT_ARGS: &[FunctionArgDef] = &[
    RUN_ID_ARG,
    MESSAGE_ID_ARG,
    FunctionArgDef {
        name: "answer",
        required: true,
        description: "Answer delivered to the worker",
    },
];

pub const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef {
        function_id: function_ids::RUN_START,
        description: "Start a supervised worker run and return its run id",
        args: RUN_START_ARGS,
        read_only: false,
        handler: crate::app::command_dispatch::handle_run_start,
    },
    FunctionDef {
        function_id: function_ids::RUN_STATUS,
        description: "Show run status with the pending question or last answer",
        args: &[RUN_ID_ARG],
        read_only: true,
        handler: crate::app::command_dispatch::handle_run_status,
    },
    FunctionDef {
        function_id: function_ids::RUN_UPDATE_STATUS,
        description: "Set run status and optional summary",
        args: RUN_UPDATE_STATUS_ARGS,
        read_only: false,
        handler: crate::app::command_dispatch::handle_run_update_status,
    },
    FunctionDef {
        function_id: function_ids::RUN_LOGS,
        description: "Return the raw worker output log",
        args: &[RUN_ID_ARG],
        read_only: true,
        handler: crate::app::command_dispatch::handle_run_logs,
    },
    FunctionDef {
        function_id: function_ids::MESSAGE_ASK_PARENT,
        description: "Ask the launching agent a question and wait for a reply",
        args: MESSAGE_ASK_PARENT_ARGS,
        read_only: false,
        handler: crate::app::command_dispatch::handle_message_ask_parent,
    },
    FunctionDef {
        function_id: function_ids::MESSAGE_REPLY_SUBAGENT,
        description: "Answer a pending worker question",
        args: MESSAGE_REPLY_SUBAGENT_ARGS,
        read_only: false,
        handler: crate::app::command_dispatch::handle_message_reply_subagent,
    },
    FunctionDef {
        function_id: function_ids::MESSAGE_CHECK_STATUS,
        description: "Check a question; the first read after a reply acknowledges it",
        args: &[RUN_ID_ARG, MESSAGE_ID_ARG],
        read_only: false,
        handler: crate::app::command_dispatch::handle_message_check_status,
    },
    FunctionDef {
        function_id: function_ids::AGENT_LIST,
        description: "List configured worker agents",
        args: &[],
        read_only: true,
        handler: crate::app::command_dispatch::handle_agent_list,
    },
];

pub fn function_def(function_id: &str) -> Option<&'static FunctionDef> {
    FUNCTIONS
        .iter()
        .find(|function| function.function_id == function_id)
}
