use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type FlowId = Uuid;
pub type NodeId = Uuid;

/// Wiring data for a node graph: which plugins to instantiate and how
/// their output ports feed each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub settings: FlowSettings,
}

impl FlowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            links: Vec::new(),
            settings: FlowSettings::default(),
        }
    }

    pub fn add_node(&mut self, node: NodeSpec) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Wire output port `from_port` of `from_node` to `to_node`
    pub fn link(&mut self, from_node: NodeId, from_port: usize, to_node: NodeId) {
        self.links.push(Link {
            from_node,
            from_port,
            to_node,
        });
    }

    pub fn find_node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Node specification in a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub plugin_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Opaque to the engine; owned by the plugin
    #[serde(default)]
    pub config: String,
}

fn default_enabled() -> bool {
    true
}

impl NodeSpec {
    pub fn new(plugin_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_type: plugin_type.into(),
            name: None,
            enabled: true,
            config: String::new(),
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = config.into();
        self
    }

    /// Store a JSON document as the node's config string
    pub fn with_json_config(self, config: serde_json::Value) -> Self {
        self.with_config(config.to_string())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Directed link from one node's output port to another node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from_node: NodeId,
    /// Index of the output port, aligned with the plugin's task order
    pub from_port: usize,
    pub to_node: NodeId,
}

/// Engine settings carried with a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Pause between Starter passes that produced no work
    pub idle_backoff_ms: u64,
    /// How long shutdown waits for in-flight activations
    pub shutdown_timeout_ms: u64,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 100,
            shutdown_timeout_ms: 5000,
        }
    }
}
