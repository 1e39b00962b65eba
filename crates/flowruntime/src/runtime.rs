use crate::{registry::PluginRegistry, ExecutionContext, ExecutionManager};
use flowcore::{EventBus, FlowDefinition, GraphError, ScriptExecutor};
use std::sync::Arc;

/// Entry point tying together the plugin registry, the event bus and the
/// optional script executor
pub struct FlowRuntime {
    registry: Arc<PluginRegistry>,
    event_bus: Arc<EventBus>,
    script: Option<Arc<dyn ScriptExecutor>>,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(PluginRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<PluginRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            script: None,
        }
    }

    /// Inject the callback used by plugins that run script code
    pub fn with_script_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.script = Some(executor);
        self
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Build the node graph of a flow. Call `initialize` on the result to start it.
    pub fn build(&self, flow: &FlowDefinition) -> Result<ExecutionManager, GraphError> {
        let mut context = ExecutionContext::new(Arc::clone(&self.event_bus), &flow.settings);
        if let Some(script) = &self.script {
            context = context.with_script_executor(Arc::clone(script));
        }
        ExecutionManager::from_definition(flow, &self.registry, context)
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<flowcore::ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}
