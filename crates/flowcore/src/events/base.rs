use crate::{NodeId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while nodes execute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    NodePrepared {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    PrepareFailed {
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    ActivationStarted {
        node_id: NodeId,
        parent: Option<NodeId>,
        timestamp: DateTime<Utc>,
    },
    /// The node is disabled; nothing ran and nothing was propagated
    ActivationSkipped {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        node_id: NodeId,
        task_index: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        node_id: NodeId,
        task_index: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },
    Dispatched {
        node_id: NodeId,
        port_index: usize,
        targets: Vec<NodeId>,
        timestamp: DateTime<Utc>,
    },
    NodeEvent {
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn node_id(&self) -> NodeId {
        match self {
            ExecutionEvent::NodePrepared { node_id, .. }
            | ExecutionEvent::PrepareFailed { node_id, .. }
            | ExecutionEvent::ActivationStarted { node_id, .. }
            | ExecutionEvent::ActivationSkipped { node_id, .. }
            | ExecutionEvent::TaskCompleted { node_id, .. }
            | ExecutionEvent::TaskFailed { node_id, .. }
            | ExecutionEvent::Dispatched { node_id, .. }
            | ExecutionEvent::NodeEvent { node_id, .. } => *node_id,
        }
    }
}

/// Events raised by plugins from inside their tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Data { key: String, value: Value },
}

/// Event emitter bound to one node
#[derive(Clone)]
pub struct EventEmitter {
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(node_id: NodeId, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        Self { node_id, sender }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        self.publish(ExecutionEvent::NodeEvent {
            node_id: self.node_id,
            event,
            timestamp: Utc::now(),
        });
    }

    /// Publish an engine event. Having no subscribers is not an error.
    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    pub fn data(&self, key: impl Into<String>, value: Value) {
        self.emit(NodeEvent::Data {
            key: key.into(),
            value,
        });
    }
}

/// Global event bus
///
/// Slow subscribers lag and lose the oldest events; publishers never wait.
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(node_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
