use crate::node::Node;
use flowcore::NodeId;
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use uuid::Uuid;

pub type PortId = Uuid;

/// Addressable endpoint of a node.
///
/// Activations arrive by calling [`Node::execute`] directly; the port
/// does not buffer anything.
#[derive(Debug, Clone)]
pub struct InputPort {
    id: PortId,
    node: NodeId,
}

impl InputPort {
    pub(crate) fn new(node: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            node,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }
}

/// Output port holding the nodes reachable through it.
///
/// References are weak: the execution manager owns the nodes.
pub struct OutputPort {
    id: PortId,
    node: NodeId,
    index: usize,
    next_nodes: RwLock<Vec<(NodeId, Weak<Node>)>>,
}

impl OutputPort {
    pub(crate) fn new(node: NodeId, index: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            node,
            index,
            next_nodes: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    /// Node this port belongs to
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Position of the port, equal to the index of the task feeding it
    pub fn index(&self) -> usize {
        self.index
    }

    /// Add a downstream node. Returns `false` if it was already wired.
    pub fn connect(&self, target: &Arc<Node>) -> bool {
        let mut next = self.next_nodes.write();
        if next.iter().any(|(id, _)| *id == target.id()) {
            return false;
        }
        next.push((target.id(), Arc::downgrade(target)));
        true
    }

    /// Remove a downstream node. Returns `false` if it was not wired.
    pub fn disconnect(&self, target: NodeId) -> bool {
        let mut next = self.next_nodes.write();
        let before = next.len();
        next.retain(|(id, _)| *id != target);
        next.len() != before
    }

    pub fn next_node_ids(&self) -> Vec<NodeId> {
        self.next_nodes.read().iter().map(|(id, _)| *id).collect()
    }

    /// Downstream nodes that are still alive
    pub fn next_nodes(&self) -> Vec<Arc<Node>> {
        self.next_nodes
            .read()
            .iter()
            .filter_map(|(_, node)| node.upgrade())
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        !self.next_nodes.read().is_empty()
    }
}

impl std::fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputPort")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("index", &self.index)
            .field("next_nodes", &self.next_node_ids())
            .finish()
    }
}
