pub mod document;
pub mod lock;
pub mod run_store;

pub use document::{Message, MessageStatus, RunDocument, RunStatus};
pub use lock::{is_process_alive, RunLockGuard, RunLocks};
pub use run_store::{RunStore, Settled};
