use async_trait::async_trait;
use flowcore::{
    record_from_json, task_fn, NodeError, NodeKind, Plugin, Record, TaskContext, Value, WorkTask,
};
use flowruntime::{PluginFactory, PluginMetadata, PortDefinition};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Config of `time.interval`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    pub interval_ms: u64,
    /// JSON object emitted on every tick
    pub payload: serde_json::Value,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            payload: serde_json::json!({}),
        }
    }
}

fn interval_config(ctx: &TaskContext) -> Result<IntervalConfig, NodeError> {
    let config: Option<IntervalConfig> = ctx.config_json()?;
    let config = config.unwrap_or_default();
    if !config.payload.is_object() {
        return Err(NodeError::Configuration(
            "'payload' must be a JSON object".to_string(),
        ));
    }
    Ok(config)
}

/// Starter that emits its configured payload every `interval_ms`,
/// stamped with a running `tick` counter
pub struct IntervalPlugin {
    ticks: Arc<AtomicU64>,
}

impl IntervalPlugin {
    pub fn new() -> Self {
        Self {
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl Default for IntervalPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for IntervalPlugin {
    fn plugin_type(&self) -> &str {
        "time.interval"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Starter
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        let ticks = self.ticks.clone();
        vec![task_fn(move |ctx, _input| {
            let ticks = ticks.clone();
            async move {
                let config = interval_config(&ctx)?;

                tokio::select! {
                    _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                    _ = sleep(Duration::from_millis(config.interval_ms)) => {}
                }

                let mut record = record_from_json(config.payload)?;
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                record.insert("tick".to_string(), Value::from(tick));
                Ok(record)
            }
        })]
    }

    /// Reject a malformed config before the first tick
    async fn prepare(&self, ctx: &TaskContext) -> Result<(), NodeError> {
        interval_config(ctx).map(|_| ())
    }
}

pub struct IntervalPluginFactory;

impl PluginFactory for IntervalPluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(IntervalPlugin::new()))
    }

    fn plugin_type(&self) -> &str {
        "time.interval"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Emit a payload at a fixed interval".to_string(),
            category: "time".to_string(),
            kind: NodeKind::Starter,
            outputs: vec![PortDefinition::new("tick", "Payload plus tick counter")],
        }
    }
}

/// Config of `time.delay`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    pub delay_ms: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self { delay_ms: 1000 }
    }
}

/// Delay a record for a specified duration
pub struct DelayPlugin;

struct DelayTask;

#[async_trait]
impl WorkTask for DelayTask {
    async fn run(&self, ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        let config: Option<DelayConfig> = ctx.config_json()?;
        let delay_ms = config.unwrap_or_default().delay_ms;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => Ok(input),
        }
    }
}

#[async_trait]
impl Plugin for DelayPlugin {
    fn plugin_type(&self) -> &str {
        "time.delay"
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![Arc::new(DelayTask)]
    }
}

pub struct DelayPluginFactory;

impl PluginFactory for DelayPluginFactory {
    fn create(&self, _config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        Ok(Box::new(DelayPlugin))
    }

    fn plugin_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Delay records for specified milliseconds".to_string(),
            category: "time".to_string(),
            outputs: vec![PortDefinition::new("out", "The delayed record")],
            ..PluginMetadata::default()
        }
    }
}
