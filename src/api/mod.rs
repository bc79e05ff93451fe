//! Simulated todo backend.
//!
//! Stands in for a remote service: every call waits a fixed latency before
//! answering, and nothing is persisted between calls.

pub mod client;
pub mod types;

pub use client::MockTodoApi;
pub use types::{NewTodo, Todo};
