use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Shutdown error: {0}")]
    Shutdown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised by a work task or a prepare hook.
///
/// These never escape a node activation: the node logs them, publishes an
/// event and carries on with the next task.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Node initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Work task panicked: {0}")]
    Panicked(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Errors raised while building or bootstrapping a node graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Duplicate link: {from} port {port} -> {to}")]
    DuplicateLink {
        from: String,
        port: usize,
        to: String,
    },

    #[error("Node {node} has no output port {port} ({available} declared)")]
    InvalidPort {
        node: String,
        port: usize,
        available: usize,
    },

    #[error("Unknown plugin type: {0}")]
    UnknownPluginType(String),

    #[error("Failed to create plugin '{plugin_type}': {reason}")]
    PluginCreation { plugin_type: String, reason: String },

    #[error("Execution manager already initialized")]
    AlreadyInitialized,
}
