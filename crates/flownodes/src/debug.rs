use async_trait::async_trait;
use flowcore::{record_to_json, NodeError, Plugin, Record, TaskContext, WorkTask};
use flowruntime::{PluginFactory, PluginMetadata, PortDefinition};
use std::sync::Arc;

/// Logs every record it receives and passes it on unchanged
pub struct DebugPlugin;

struct LogTask;

#[async_trait]
impl WorkTask for LogTask {
    async fn run(&self, ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        let rendered = record_to_json(&input).to_string();
        tracing::info!("[{}] {}", ctx.node_name, rendered);
        ctx.events.info(format!("DEBUG: {}", rendered));
        Ok(input)
    }
}

#[async_trait]
impl Plugin for DebugPlugin {
    fn plugin_type(&self) -> &str {
        "debug.log"
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![Arc::new(LogTask)]
    }
}

pub struct DebugPluginFactory;

impl PluginFactory for DebugPluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(DebugPlugin))
    }

    fn plugin_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Logs records for debugging".to_string(),
            category: "debug".to_string(),
            outputs: vec![PortDefinition::new("out", "The logged record")],
            ..PluginMetadata::default()
        }
    }
}
