// Shared helpers for flowruntime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use flowcore::{
    task_fn, EventBus, FlowSettings, NodeError, NodeKind, Plugin, Record, TaskContext, Value,
    WorkTask,
};
use flowruntime::ExecutionContext;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Plugin assembled from closures for tests
pub struct TestPlugin {
    pub kind: NodeKind,
    pub tasks: Vec<Arc<dyn WorkTask>>,
    pub prepare_calls: Arc<AtomicUsize>,
    /// Number of leading prepare calls that fail
    pub failing_prepares: usize,
}

impl TestPlugin {
    pub fn standard(tasks: Vec<Arc<dyn WorkTask>>) -> Self {
        Self {
            kind: NodeKind::Standard,
            tasks,
            prepare_calls: Arc::new(AtomicUsize::new(0)),
            failing_prepares: 0,
        }
    }

    pub fn starter(tasks: Vec<Arc<dyn WorkTask>>) -> Self {
        Self {
            kind: NodeKind::Starter,
            ..Self::standard(tasks)
        }
    }

    pub fn failing_prepares(mut self, count: usize) -> Self {
        self.failing_prepares = count;
        self
    }

    pub fn into_arc(self) -> Arc<dyn Plugin> {
        Arc::new(self)
    }
}

#[async_trait]
impl Plugin for TestPlugin {
    fn plugin_type(&self) -> &str {
        "test.plugin"
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        self.tasks.clone()
    }

    async fn prepare(&self, _ctx: &TaskContext) -> Result<(), NodeError> {
        let call = self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failing_prepares {
            return Err(NodeError::InitializationFailed("not ready yet".to_string()));
        }
        Ok(())
    }
}

/// Route engine logs to the test harness; `RUST_LOG` narrows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Context with short backoff so Starter tests stay fast
pub fn test_context() -> ExecutionContext {
    init_tracing();
    ExecutionContext::new(
        Arc::new(EventBus::new(1000)),
        &FlowSettings {
            idle_backoff_ms: 10,
            shutdown_timeout_ms: 2000,
        },
    )
}

/// Task that forwards every input into a channel and passes it on
pub fn recorder(tx: mpsc::UnboundedSender<Record>) -> Arc<dyn WorkTask> {
    task_fn(move |_ctx, input: Record| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(input.clone());
            Ok(input)
        }
    })
}

/// Task that always returns the same record
pub fn emit(record: Record) -> Arc<dyn WorkTask> {
    task_fn(move |_ctx, _input| {
        let record = record.clone();
        async move { Ok(record) }
    })
}

/// Task that counts its runs and returns an empty record
pub fn counter(count: Arc<AtomicUsize>) -> Arc<dyn WorkTask> {
    task_fn(move |_ctx, _input| {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(Record::new())
        }
    })
}

pub fn failing(message: &'static str) -> Arc<dyn WorkTask> {
    task_fn(move |_ctx, _input| async move { Err(NodeError::ExecutionFailed(message.to_string())) })
}

pub fn record(key: &str, value: impl Into<Value>) -> Record {
    let mut record = Record::new();
    record.insert(key.to_string(), value.into());
    record
}

pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Record>) -> Option<Record> {
    timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

/// True if nothing arrives within a short window
pub async fn stays_silent(rx: &mut mpsc::UnboundedReceiver<Record>) -> bool {
    matches!(
        timeout(Duration::from_millis(100), rx.recv()).await,
        Err(_) | Ok(None)
    )
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
