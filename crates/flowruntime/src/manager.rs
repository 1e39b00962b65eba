use crate::context::ExecutionContext;
use crate::graph::FlowGraph;
use crate::node::Node;
use crate::registry::PluginRegistry;
use flowcore::{
    ExecutionEvent, FlowDefinition, FlowError, GraphError, NodeId, NodeKind, Plugin, Record,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Registry of live nodes and one-time bootstrap driver of the graph.
///
/// After [`ExecutionManager::initialize`] the manager makes no scheduling
/// decisions: activations flow node to node.
pub struct ExecutionManager {
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
    context: ExecutionContext,
    initialized: AtomicBool,
}

impl ExecutionManager {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            context,
            initialized: AtomicBool::new(false),
        }
    }

    /// Build every node of a flow and wire its links. Nothing runs until
    /// `initialize` is called.
    pub fn from_definition(
        flow: &FlowDefinition,
        registry: &PluginRegistry,
        context: ExecutionContext,
    ) -> Result<Self, GraphError> {
        let graph = FlowGraph::from_definition(flow)?;
        if graph.has_cycles() {
            tracing::warn!(
                "Flow '{}' contains cycles; activations entering them circulate until shutdown",
                flow.name
            );
        }

        let manager = Self::new(context);

        for spec in &flow.nodes {
            let plugin = registry.create_plugin(&spec.plugin_type, &spec.config)?;
            let node = manager.create_node_with_id(
                spec.id,
                spec.name.clone(),
                Arc::from(plugin),
                spec.config.clone(),
            )?;
            node.set_enabled(spec.enabled);
        }

        for link in &flow.links {
            manager.connect(link.from_node, link.from_port, link.to_node)?;
        }

        tracing::info!(
            "Built flow '{}': {} nodes, {} links",
            flow.name,
            graph.node_count(),
            graph.link_count()
        );

        Ok(manager)
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.context.cancellation()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.context.events().subscribe()
    }

    /// Construct a node bound to this manager's context and register it
    pub fn create_node(
        &self,
        plugin: Arc<dyn Plugin>,
        name: Option<String>,
        config: impl Into<String>,
    ) -> Result<Arc<Node>, GraphError> {
        self.create_node_with_id(Uuid::new_v4(), name, plugin, config)
    }

    pub fn create_node_with_id(
        &self,
        id: NodeId,
        name: Option<String>,
        plugin: Arc<dyn Plugin>,
        config: impl Into<String>,
    ) -> Result<Arc<Node>, GraphError> {
        let node = Node::new(id, name, plugin, config, self.context.clone());
        self.register(Arc::clone(&node))?;
        Ok(node)
    }

    /// Register a constructed node under its identifier
    pub fn register(&self, node: Arc<Node>) -> Result<(), GraphError> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id()) {
            return Err(GraphError::DuplicateNode(node.id().to_string()));
        }
        tracing::debug!("Registered node {} ({}) as {}", node.name(), node.plugin_type(), node.id());
        nodes.insert(node.id(), node);
        Ok(())
    }

    pub fn lookup(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Wire output port `port` of `from` to `to`
    pub fn connect(&self, from: NodeId, port: usize, to: NodeId) -> Result<(), GraphError> {
        let source = self
            .lookup(from)
            .ok_or_else(|| GraphError::NodeNotFound(from.to_string()))?;
        let target = self
            .lookup(to)
            .ok_or_else(|| GraphError::NodeNotFound(to.to_string()))?;

        let output = source
            .output_port_at(port)
            .ok_or_else(|| GraphError::InvalidPort {
                node: from.to_string(),
                port,
                available: source.output_ports().len(),
            })?;

        if !output.connect(&target) {
            return Err(GraphError::DuplicateLink {
                from: from.to_string(),
                port,
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Remove a link. Returns `false` if the link did not exist.
    pub fn disconnect(&self, from: NodeId, port: usize, to: NodeId) -> Result<bool, GraphError> {
        let source = self
            .lookup(from)
            .ok_or_else(|| GraphError::NodeNotFound(from.to_string()))?;
        let output = source
            .output_port_at(port)
            .ok_or_else(|| GraphError::InvalidPort {
                node: from.to_string(),
                port,
                available: source.output_ports().len(),
            })?;
        Ok(output.disconnect(to))
    }

    /// Start the unattended loop of every Starter node.
    ///
    /// Must be called once, after all nodes and wiring exist. Does not
    /// block; returns the number of loops started.
    pub fn initialize(&self) -> Result<usize, GraphError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(GraphError::AlreadyInitialized);
        }

        let starters: Vec<Arc<Node>> = self
            .nodes()
            .into_iter()
            .filter(|n| n.kind() == NodeKind::Starter)
            .collect();

        for node in &starters {
            tracing::info!("Starting node {} ({})", node.name(), node.id());
            node.trigger(Record::new());
        }

        tracing::info!("Execution manager initialized: {} starter node(s)", starters.len());
        Ok(starters.len())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.is_initialized() && !self.cancellation().is_cancelled()
    }

    /// Raise the shared cancellation signal and wait for in-flight
    /// activations, bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), FlowError> {
        self.context.cancellation().cancel();

        let tracker = self.context.tracker();
        tracker.close();

        let timeout = self.context.shutdown_timeout();
        match tokio::time::timeout(timeout, tracker.wait()).await {
            Ok(()) => {
                tracing::info!("Execution manager shut down");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    "{} activation(s) still running after {:?}",
                    tracker.len(),
                    timeout
                );
                Err(FlowError::Shutdown(format!(
                    "{} activation(s) still running after {:?}",
                    tracker.len(),
                    timeout
                )))
            }
        }
    }
}
