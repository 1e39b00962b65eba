//! Flow execution runtime
//!
//! This crate provides the execution core: nodes wired through output
//! ports, the per-node activation loop, the execution manager that owns
//! the graph and starts its source nodes, and the plugin registry.

mod context;
mod graph;
mod manager;
mod node;
mod port;
mod registry;
mod runtime;

pub use context::ExecutionContext;
pub use graph::FlowGraph;
pub use manager::ExecutionManager;
pub use node::Node;
pub use port::{InputPort, OutputPort, PortId};
pub use registry::{PluginFactory, PluginMetadata, PluginRegistry, PortDefinition};
pub use runtime::{FlowRuntime, RuntimeConfig};
