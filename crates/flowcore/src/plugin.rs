use crate::{events::EventEmitter, NodeError, NodeId, Record};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a node gets activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Self-activating source that loops until cancellation
    Starter,
    /// Runs one pass each time an upstream node triggers it
    Standard,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Starter => write!(f, "starter"),
            NodeKind::Standard => write!(f, "standard"),
        }
    }
}

/// An asynchronous record transform. A plugin supplies one per output port.
#[async_trait]
pub trait WorkTask: Send + Sync {
    async fn run(&self, ctx: TaskContext, input: Record) -> Result<Record, NodeError>;
}

/// Capability object that gives a node its behavior.
///
/// The engine only sequences and routes: it never looks inside the tasks.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry key (e.g., "time.interval", "debug.log")
    fn plugin_type(&self) -> &str;

    /// Display name used when the flow does not name the node
    fn name(&self) -> &str {
        self.plugin_type()
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Standard
    }

    /// Ordered tasks; task `i` feeds output port `i`.
    ///
    /// Called once when the node is built, so the port count is fixed
    /// for the node's lifetime.
    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>>;

    /// One-time preparation, run before the first pass of the node.
    async fn prepare(&self, _ctx: &TaskContext) -> Result<(), NodeError> {
        Ok(())
    }

    /// Opaque editor descriptor, passed through untouched
    fn ui_type(&self) -> Option<&str> {
        None
    }
}

/// Injected callback that runs externally supplied script code.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn execute(&self, code: &str, parameters: Record) -> Result<Record, NodeError>;
}

/// Execution context passed to the prepare hook and to each work task
#[derive(Clone)]
pub struct TaskContext {
    pub node_id: NodeId,

    pub node_name: String,

    /// Index of the running task; `None` while preparing
    pub task_index: Option<usize>,

    /// Snapshot of the node's opaque configuration string
    pub config: String,

    /// Node that dispatched the current activation, if any
    pub parent: Option<NodeId>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Shared cancellation signal of the running graph
    pub cancellation: CancellationToken,

    pub script: Option<Arc<dyn ScriptExecutor>>,
}

impl TaskContext {
    /// Parse the configuration string as JSON. An empty string parses as `null`.
    pub fn config_json<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        let raw = if self.config.trim().is_empty() {
            "null"
        } else {
            self.config.as_str()
        };
        serde_json::from_str(raw)
            .map_err(|e| NodeError::Configuration(format!("Invalid config: {}", e)))
    }

    /// Run script code through the injected executor
    pub async fn run_script(&self, code: &str, parameters: Record) -> Result<Record, NodeError> {
        let executor = self.script.as_ref().ok_or_else(|| {
            NodeError::Configuration("No script executor configured".to_string())
        })?;
        executor.execute(code, parameters).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Work task backed by an async closure
pub struct FnTask<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> WorkTask for FnTask<F>
where
    F: Fn(TaskContext, Record) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Record, NodeError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        (self.f)(ctx, input).await
    }
}

/// Wrap an async closure as a shareable work task
pub fn task_fn<F, Fut>(f: F) -> Arc<dyn WorkTask>
where
    F: Fn(TaskContext, Record) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Record, NodeError>> + Send + 'static,
{
    Arc::new(FnTask { f })
}
