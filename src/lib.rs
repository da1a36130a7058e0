pub mod app;
pub mod channel;
pub mod config;
pub mod runner;
pub mod shared;
pub mod status;
pub mod store;

pub use shared::errors::RelayError;
