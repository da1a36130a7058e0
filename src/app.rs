pub mod cli;
pub mod command_catalog;
pub mod command_dispatch;
pub mod command_handlers;
pub mod context;

pub use command_dispatch::execute_function;
pub use command_handlers::run_cli;
pub use context::{RelayContext, SupervisionMode};
