use crate::context::ExecutionContext;
use crate::port::{InputPort, OutputPort, PortId};
use chrono::Utc;
use flowcore::{
    EventEmitter, ExecutionEvent, NodeError, NodeId, NodeKind, Plugin, Record, TaskContext,
    WorkTask,
};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Whether a pass did anything worth looping on immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    Worked,
    Idle,
}

/// Execution unit of the graph.
///
/// A node owns one input port and one output port per work task of its
/// plugin. At most one activation runs its task sequence at a time; other
/// callers wait on the node's guard.
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    plugin: Arc<dyn Plugin>,
    tasks: Vec<Arc<dyn WorkTask>>,
    input: InputPort,
    outputs: Vec<OutputPort>,
    enabled: AtomicBool,
    /// Only written while `guard` is held
    initialized: AtomicBool,
    config: RwLock<String>,
    parent: RwLock<Weak<Node>>,
    guard: Mutex<()>,
    events: EventEmitter,
    context: ExecutionContext,
}

impl Node {
    pub fn new(
        id: NodeId,
        name: Option<String>,
        plugin: Arc<dyn Plugin>,
        config: impl Into<String>,
        context: ExecutionContext,
    ) -> Arc<Self> {
        let tasks = plugin.work_tasks();
        let outputs = (0..tasks.len()).map(|i| OutputPort::new(id, i)).collect();

        Arc::new(Self {
            id,
            name: name.unwrap_or_else(|| plugin.name().to_string()),
            kind: plugin.kind(),
            input: InputPort::new(id),
            outputs,
            tasks,
            plugin,
            enabled: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            config: RwLock::new(config.into()),
            parent: RwLock::new(Weak::new()),
            guard: Mutex::new(()),
            events: context.events().create_emitter(id),
            context,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn plugin_type(&self) -> &str {
        self.plugin.plugin_type()
    }

    pub fn ui_type(&self) -> Option<&str> {
        self.plugin.ui_type()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Takes effect at the next pass; a pass already running is not interrupted.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn config(&self) -> String {
        self.config.read().clone()
    }

    /// Replace the opaque configuration. Plugins see it from the next task onwards.
    pub fn set_config(&self, config: impl Into<String>) {
        *self.config.write() = config.into();
    }

    /// Node that most recently dispatched into this one
    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent.read().upgrade()
    }

    pub fn input_port(&self) -> &InputPort {
        &self.input
    }

    pub fn output_ports(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn output_port(&self, id: PortId) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.id() == id)
    }

    pub fn output_port_at(&self, index: usize) -> Option<&OutputPort> {
        self.outputs.get(index)
    }

    /// Run one activation and wait for it to finish.
    ///
    /// Returns once the task sequence has run and downstream activations
    /// have been dispatched, not when they complete. For a Starter node this
    /// only returns after cancellation.
    pub async fn execute(self: &Arc<Self>, payload: Record) {
        Arc::clone(self).activation(None, payload).await
    }

    /// Spawn an activation on the shared tracker without waiting for it
    pub fn trigger(self: &Arc<Self>, payload: Record) -> JoinHandle<()> {
        self.context
            .tracker()
            .spawn(Arc::clone(self).activation(None, payload))
    }

    fn activation(self: Arc<Self>, parent: Option<Weak<Node>>, payload: Record) -> BoxFuture<'static, ()> {
        async move {
            let cancellation = self.context.cancellation().clone();
            if cancellation.is_cancelled() {
                tracing::debug!("Node {} not activated: graph is shutting down", self.id);
                return;
            }

            let _guard = self.guard.lock().await;

            if let Some(parent) = parent {
                *self.parent.write() = parent;
            }
            let parent_id = self.parent().map(|p| p.id());

            self.events.publish(ExecutionEvent::ActivationStarted {
                node_id: self.id,
                parent: parent_id,
                timestamp: Utc::now(),
            });

            loop {
                if cancellation.is_cancelled() {
                    tracing::debug!("Node {} stopping: cancellation requested", self.id);
                    break;
                }

                let outcome = self.run_pass(&payload, parent_id).await;

                if self.kind != NodeKind::Starter {
                    break;
                }

                match outcome {
                    PassOutcome::Worked => tokio::task::yield_now().await,
                    PassOutcome::Idle => {
                        tokio::select! {
                            _ = cancellation.cancelled() => break,
                            _ = tokio::time::sleep(self.context.idle_backoff()) => {}
                        }
                    }
                }
            }
        }
        .boxed()
    }

    async fn run_pass(self: &Arc<Self>, payload: &Record, parent: Option<NodeId>) -> PassOutcome {
        if !self.is_initialized() && self.prepare(parent).await.is_err() {
            return PassOutcome::Idle;
        }

        if !self.is_enabled() {
            tracing::debug!("Node {} is disabled, skipping work tasks", self.id);
            self.events.publish(ExecutionEvent::ActivationSkipped {
                node_id: self.id,
                timestamp: Utc::now(),
            });
            return PassOutcome::Idle;
        }

        let mut worked = false;
        for (index, task) in self.tasks.iter().enumerate() {
            let ctx = self.task_context(Some(index), parent);
            let start = Instant::now();

            let result = AssertUnwindSafe(task.run(ctx, payload.clone()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(NodeError::Panicked(panic_message(panic.as_ref()))));

            match result {
                Ok(output) => {
                    worked = true;
                    self.events.publish(ExecutionEvent::TaskCompleted {
                        node_id: self.id,
                        task_index: index,
                        duration_ms: start.elapsed().as_millis() as u64,
                        timestamp: Utc::now(),
                    });
                    self.dispatch(index, output);
                }
                Err(e) => {
                    if e == NodeError::Cancelled {
                        tracing::debug!("Work task {} of node {} cancelled", index, self.id);
                    } else {
                        tracing::error!("Error executing work task {} of node {}: {}", index, self.id, e);
                    }
                    self.events.publish(ExecutionEvent::TaskFailed {
                        node_id: self.id,
                        task_index: index,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        if worked {
            PassOutcome::Worked
        } else {
            PassOutcome::Idle
        }
    }

    /// Run the plugin's one-time hook. On failure the flag stays unset and
    /// the hook is retried on the next pass.
    async fn prepare(&self, parent: Option<NodeId>) -> Result<(), NodeError> {
        let ctx = self.task_context(None, parent);
        let result = AssertUnwindSafe(self.plugin.prepare(&ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(NodeError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(()) => {
                self.initialized.store(true, Ordering::Release);
                tracing::info!("Node {} ({}) prepared", self.name, self.id);
                self.events.publish(ExecutionEvent::NodePrepared {
                    node_id: self.id,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to prepare node {} ({}): {}", self.name, self.id, e);
                self.events.publish(ExecutionEvent::PrepareFailed {
                    node_id: self.id,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(e)
            }
        }
    }

    /// Fire-and-forget the result into every node behind output port `index`
    fn dispatch(self: &Arc<Self>, index: usize, result: Record) {
        let Some(port) = self.outputs.get(index) else {
            return;
        };
        if self.context.cancellation().is_cancelled() {
            return;
        }

        let targets = port.next_nodes();
        if targets.is_empty() {
            return;
        }

        self.events.publish(ExecutionEvent::Dispatched {
            node_id: self.id,
            port_index: index,
            targets: targets.iter().map(|t| t.id()).collect(),
            timestamp: Utc::now(),
        });

        for target in targets {
            tracing::debug!("Node {} port {} -> node {}", self.id, index, target.id());
            let activation = target.activation(Some(Arc::downgrade(self)), result.clone());
            self.context.tracker().spawn(activation);
        }
    }

    fn task_context(&self, task_index: Option<usize>, parent: Option<NodeId>) -> TaskContext {
        TaskContext {
            node_id: self.id,
            node_name: self.name.clone(),
            task_index,
            config: self.config(),
            parent,
            events: self.events.clone(),
            cancellation: self.context.cancellation().clone(),
            script: self.context.script_executor(),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("plugin_type", &self.plugin_type())
            .field("enabled", &self.is_enabled())
            .field("outputs", &self.outputs)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
