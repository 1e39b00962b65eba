//! Core abstractions for the flow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the record model exchanged between nodes, the
//! plugin capability contract, flow wiring data, events and errors.
//! It has no execution logic of its own.

mod error;
pub mod events;
mod flow;
mod plugin;
mod value;

pub use error::{FlowError, GraphError, NodeError};
pub use events::*;
pub use flow::{FlowDefinition, FlowId, FlowSettings, Link, NodeId, NodeSpec};
pub use plugin::{task_fn, FnTask, NodeKind, Plugin, ScriptExecutor, TaskContext, WorkTask};
pub use value::{record_from_json, record_to_json, Record, Value};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
