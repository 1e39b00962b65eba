use flowcore::{EventBus, FlowSettings, ScriptExecutor};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Shared state threaded through every node of one graph
#[derive(Clone)]
pub struct ExecutionContext {
    cancellation: CancellationToken,
    tracker: TaskTracker,
    events: Arc<EventBus>,
    idle_backoff: Duration,
    shutdown_timeout: Duration,
    script: Option<Arc<dyn ScriptExecutor>>,
}

impl ExecutionContext {
    pub fn new(events: Arc<EventBus>, settings: &FlowSettings) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            tracker: TaskTracker::new(),
            events,
            idle_backoff: Duration::from_millis(settings.idle_backoff_ms),
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
            script: None,
        }
    }

    /// Use an externally owned cancellation token instead of a fresh one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_script_executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.script = Some(executor);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Tracks every spawned Starter loop and downstream activation
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn idle_backoff(&self) -> Duration {
        self.idle_backoff
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn script_executor(&self) -> Option<Arc<dyn ScriptExecutor>> {
        self.script.clone()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::default()), &FlowSettings::default())
    }
}
