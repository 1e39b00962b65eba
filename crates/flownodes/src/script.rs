use async_trait::async_trait;
use flowcore::{task_fn, NodeError, Plugin, TaskContext, WorkTask};
use flowruntime::{PluginFactory, PluginMetadata, PortDefinition};
use std::sync::Arc;

/// Runs the code stored as the node's config through the injected script
/// executor, with the incoming record as parameters
pub struct ScriptPlugin;

#[async_trait]
impl Plugin for ScriptPlugin {
    fn plugin_type(&self) -> &str {
        "script.function"
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![task_fn(|ctx: TaskContext, input| async move {
            if ctx.config.trim().is_empty() {
                return Err(NodeError::Configuration("No script code configured".to_string()));
            }
            ctx.run_script(&ctx.config, input).await
        })]
    }

    fn ui_type(&self) -> Option<&str> {
        Some("code-editor")
    }
}

pub struct ScriptPluginFactory;

impl PluginFactory for ScriptPluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(ScriptPlugin))
    }

    fn plugin_type(&self) -> &str {
        "script.function"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Run user script code on each record".to_string(),
            category: "script".to_string(),
            outputs: vec![PortDefinition::new("result", "Record returned by the script")],
            ..PluginMetadata::default()
        }
    }
}
