use async_trait::async_trait;
use flowcore::{NodeError, NodeKind, Plugin, Record, TaskContext, Value, WorkTask};
use flowruntime::{PluginFactory, PluginMetadata, PortDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Config of `http.request`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Fallback when the input record has no `url`
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    /// When set the node becomes a Starter that polls the URL
    pub poll_interval_ms: Option<u64>,
}

impl HttpConfig {
    fn parse(raw: &str) -> Result<Self, NodeError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| NodeError::Configuration(format!("Invalid http config: {}", e)))
    }
}

/// HTTP request plugin
pub struct HttpRequestPlugin {
    client: reqwest::Client,
    kind: NodeKind,
}

impl HttpRequestPlugin {
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            kind: if config.poll_interval_ms.is_some() {
                NodeKind::Starter
            } else {
                NodeKind::Standard
            },
        }
    }

    /// Use a preconfigured client (proxies, timeouts, TLS)
    pub fn with_client(client: reqwest::Client, kind: NodeKind) -> Self {
        Self { client, kind }
    }
}

struct RequestTask {
    client: reqwest::Client,
    first_poll: AtomicBool,
}

impl RequestTask {
    /// Pollers wait one interval between requests; the first goes out at once
    async fn wait_for_poll(&self, ctx: &TaskContext, config: &HttpConfig) {
        let Some(interval) = config.poll_interval_ms else {
            return;
        };
        if self.first_poll.swap(false, Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = ctx.cancellation.cancelled() => {}
            _ = sleep(Duration::from_millis(interval)) => {}
        }
    }
}

#[async_trait]
impl WorkTask for RequestTask {
    async fn run(&self, ctx: TaskContext, input: Record) -> Result<Record, NodeError> {
        let config = HttpConfig::parse(&ctx.config)?;
        self.wait_for_poll(&ctx, &config).await;
        if ctx.is_cancelled() {
            return Err(NodeError::Cancelled);
        }

        let url = match input.get("url") {
            Some(value) => value
                .as_str()
                .ok_or_else(|| NodeError::InvalidInputType {
                    field: "url".to_string(),
                    expected: "string".to_string(),
                    actual: "other".to_string(),
                })?
                .to_string(),
            None => config
                .url
                .clone()
                .ok_or_else(|| NodeError::MissingInput("url".to_string()))?,
        };
        let method = config.method.as_deref().unwrap_or("GET").to_uppercase();

        ctx.events.info(format!("{} {}", method, url));

        let request = match method.as_str() {
            "GET" => self.client.get(&url),
            "DELETE" => self.client.delete(&url),
            "POST" | "PUT" => {
                let mut req = if method == "POST" {
                    self.client.post(&url)
                } else {
                    self.client.put(&url)
                };
                if let Some(body) = input.get("body") {
                    if let Some(text) = body.as_str() {
                        req = req.body(text.to_string());
                    } else {
                        req = req.json(&body.to_plain_json());
                    }
                }
                req
            }
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        let request = config
            .headers
            .iter()
            .fold(request, |req, (key, value)| req.header(key, value));

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status));

        let mut output = Record::new();
        output.insert("status".to_string(), Value::Number(status as f64));
        output.insert("body".to_string(), Value::String(body));
        output.insert("headers".to_string(), Value::Object(headers));
        Ok(output)
    }
}

#[async_trait]
impl Plugin for HttpRequestPlugin {
    fn plugin_type(&self) -> &str {
        "http.request"
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn work_tasks(&self) -> Vec<Arc<dyn WorkTask>> {
        vec![Arc::new(RequestTask {
            client: self.client.clone(),
            first_poll: AtomicBool::new(true),
        })]
    }

    async fn prepare(&self, ctx: &TaskContext) -> Result<(), NodeError> {
        HttpConfig::parse(&ctx.config).map(|_| ())
    }
}

pub struct HttpRequestPluginFactory;

impl PluginFactory for HttpRequestPluginFactory {
    fn create(&self, config: &str) -> Result<Box<dyn Plugin>, NodeError> {
        let config = HttpConfig::parse(config)?;
        Ok(Box::new(HttpRequestPlugin::new(&config)))
    }

    fn plugin_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            description: "Make HTTP requests, or poll a URL when poll_interval_ms is set"
                .to_string(),
            category: "http".to_string(),
            kind: NodeKind::Standard,
            outputs: vec![PortDefinition::new("response", "status, body and headers")],
        }
    }
}
