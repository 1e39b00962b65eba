use flowcore::{FlowDefinition, GraphError, Link, NodeId};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{HashMap, HashSet};

/// Structural view of a flow's wiring, used to validate it before any
/// node is built. Edge weights are output-port indices.
pub struct FlowGraph {
    graph: DiGraph<NodeId, usize>,
    node_to_index: HashMap<NodeId, NodeIndex>,
}

impl FlowGraph {
    pub fn from_definition(flow: &FlowDefinition) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_to_index = HashMap::new();

        for spec in &flow.nodes {
            if node_to_index.contains_key(&spec.id) {
                return Err(GraphError::DuplicateNode(spec.id.to_string()));
            }
            let idx = graph.add_node(spec.id);
            node_to_index.insert(spec.id, idx);
        }

        let mut seen: HashSet<Link> = HashSet::new();
        for link in &flow.links {
            let from = node_to_index
                .get(&link.from_node)
                .ok_or_else(|| GraphError::NodeNotFound(link.from_node.to_string()))?;
            let to = node_to_index
                .get(&link.to_node)
                .ok_or_else(|| GraphError::NodeNotFound(link.to_node.to_string()))?;

            if !seen.insert(*link) {
                return Err(GraphError::DuplicateLink {
                    from: link.from_node.to_string(),
                    port: link.from_port,
                    to: link.to_node.to_string(),
                });
            }

            graph.add_edge(*from, *to, link.from_port);
        }

        Ok(Self {
            graph,
            node_to_index,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Cycles are legal, but every activation entering one circulates
    /// until cancellation.
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Nodes reachable downstream of `start`, excluding `start` itself
    /// unless it sits on a cycle.
    pub fn reachable_from(&self, start: NodeId) -> Vec<NodeId> {
        let Some(&start_idx) = self.node_to_index.get(&start) else {
            return Vec::new();
        };

        // Seed with the successors so `start` is only visited via a cycle
        let mut dfs = Dfs::empty(&self.graph);
        dfs.stack.extend(self.graph.neighbors(start_idx));

        let mut reachable = Vec::new();
        while let Some(idx) = dfs.next(&self.graph) {
            reachable.push(self.graph[idx]);
        }
        reachable
    }

    /// Nodes that neither are one of `sources` nor can be reached from one.
    /// Such nodes only run when triggered from outside the graph.
    pub fn unreachable_from(&self, sources: &[NodeId]) -> Vec<NodeId> {
        let mut covered: HashSet<NodeId> = sources.iter().copied().collect();
        for source in sources {
            covered.extend(self.reachable_from(*source));
        }

        self.graph
            .node_indices()
            .map(|idx| self.graph[idx])
            .filter(|id| !covered.contains(id))
            .collect()
    }
}
