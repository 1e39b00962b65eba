use flowcore::{GraphError, NodeError, NodeKind, Plugin};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating plugin instances
pub trait PluginFactory: Send + Sync {
    /// Create a new plugin instance for a node with the given opaque config
    fn create(&self, config: &str) -> Result<Box<dyn Plugin>, NodeError>;

    /// Get plugin type identifier
    fn plugin_type(&self) -> &str;

    /// Optional: Get plugin metadata (description, output ports, etc.)
    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::default()
    }
}

/// Metadata about a plugin type
#[derive(Debug, Clone, Serialize)]
pub struct PluginMetadata {
    pub description: String,
    pub category: String,
    pub kind: NodeKind,
    pub outputs: Vec<PortDefinition>,
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            kind: NodeKind::Standard,
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Registry of available plugin types
pub struct PluginRegistry {
    factories: HashMap<String, Arc<dyn PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a plugin factory
    pub fn register(&mut self, factory: Arc<dyn PluginFactory>) {
        let plugin_type = factory.plugin_type().to_string();
        tracing::info!("Registering plugin type: {}", plugin_type);
        self.factories.insert(plugin_type, factory);
    }

    /// Create a plugin instance from a plugin type and config
    pub fn create_plugin(
        &self,
        plugin_type: &str,
        config: &str,
    ) -> Result<Box<dyn Plugin>, GraphError> {
        let factory = self
            .factories
            .get(plugin_type)
            .ok_or_else(|| GraphError::UnknownPluginType(plugin_type.to_string()))?;

        factory.create(config).map_err(|e| GraphError::PluginCreation {
            plugin_type: plugin_type.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn contains(&self, plugin_type: &str) -> bool {
        self.factories.contains_key(plugin_type)
    }

    /// Get all registered plugin types, sorted
    pub fn list_plugin_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a plugin type
    pub fn get_metadata(&self, plugin_type: &str) -> Option<PluginMetadata> {
        self.factories.get(plugin_type).map(|f| f.metadata())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
