use async_trait::async_trait;
use flowcore::{record_from_json, record_to_json, NodeError, Plugin, Record, TaskContext, Value, WorkTask};
use flowruntime::{PluginFactory, PluginMetadata, PortDefinition};
use std::sync::Arc;

/// Parse the JSON object in field `json` into a record
pub struct JsonParsePlugin;

struct JsonParseTask;

#[async_trait]
impl WorkTask for JsonParseTask {
    async fn run(&self, _ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        let text = input
            .get("json")
            .ok_or_else(|| NodeError::MissingInput("json".to_string()))?
            .as_str()
            .ok_or_else(|| NodeError::InvalidInputType {
                field: "json".to_string(),
                expected: "string".to_string(),
                actual: "other".to_string(),
            })?;

        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        record_from_json(parsed)
    }
}

#[async_trait]
impl Plugin for JsonParsePlugin {
    fn plugin_type(&self) -> &str {
        "transform.json_parse"
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![Arc::new(JsonParseTask)]
    }
}

pub struct JsonParsePluginFactory;

impl PluginFactory for JsonParsePluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(JsonParsePlugin))
    }

    fn plugin_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Parse a JSON string field into a record".to_string(),
            category: "transform".to_string(),
            outputs: vec![PortDefinition::new("record", "Parsed record")],
            ..PluginMetadata::default()
        }
    }
}

/// Serialize the whole record into field `json`
pub struct JsonStringifyPlugin;

struct JsonStringifyTask;

#[async_trait]
impl WorkTask for JsonStringifyTask {
    async fn run(&self, _ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        let json = serde_json::to_string(&record_to_json(&input))
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        let mut output = Record::new();
        output.insert("json".to_string(), Value::String(json));
        Ok(output)
    }
}

#[async_trait]
impl Plugin for JsonStringifyPlugin {
    fn plugin_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![Arc::new(JsonStringifyTask)]
    }
}

pub struct JsonStringifyPluginFactory;

impl PluginFactory for JsonStringifyPluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(JsonStringifyPlugin))
    }

    fn plugin_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Convert a record to a JSON string".to_string(),
            category: "transform".to_string(),
            outputs: vec![PortDefinition::new("json", "Record as JSON text")],
            ..PluginMetadata::default()
        }
    }
}
