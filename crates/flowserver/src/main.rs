use actix_cors::Cors;
use actix_web::{get, post, put, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use flowcore::{record_from_json, FlowDefinition, Record};
use flowruntime::{ExecutionContext, ExecutionManager, FlowRuntime, Node, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<FlowRuntime>,
    manager: Arc<ExecutionManager>,
}

/// Request body for manual node execution
#[derive(Debug, Default, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EnabledRequest {
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigRequest {
    config: String,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn node_summary(node: &Arc<Node>) -> serde_json::Value {
    let outputs: Vec<_> = node
        .output_ports()
        .iter()
        .map(|port| {
            serde_json::json!({
                "index": port.index(),
                "targets": port.next_node_ids(),
            })
        })
        .collect();

    serde_json::json!({
        "id": node.id(),
        "name": node.name(),
        "type": node.plugin_type(),
        "kind": node.kind().to_string(),
        "ui_type": node.ui_type(),
        "enabled": node.is_enabled(),
        "initialized": node.is_initialized(),
        "parent": node.parent().map(|p| p.id()),
        "outputs": outputs,
    })
}

fn node_not_found(id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("Node {} not found", id),
    })
}

/// Health check endpoint
#[get("/health")]
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "flowengine",
        "running": data.manager.is_running(),
        "nodes": data.manager.len(),
    }))
}

/// List available plugin types
#[get("/api/plugins")]
async fn list_plugins(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.runtime.registry();

    let plugins: Vec<_> = registry
        .list_plugin_types()
        .iter()
        .map(|plugin_type| {
            serde_json::json!({
                "type": plugin_type,
                "metadata": registry.get_metadata(plugin_type),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(plugins))
}

/// List nodes of the running flow
#[get("/api/nodes")]
async fn list_nodes(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let nodes: Vec<_> = data.manager.nodes().iter().map(node_summary).collect();
    Ok(HttpResponse::Ok().json(nodes))
}

#[get("/api/nodes/{id}")]
async fn get_node(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    match data.manager.lookup(id) {
        Some(node) => {
            let mut summary = node_summary(&node);
            summary["config"] = serde_json::Value::String(node.config());
            Ok(HttpResponse::Ok().json(summary))
        }
        None => Ok(node_not_found(id)),
    }
}

/// Enable or disable a node; takes effect at its next pass
#[put("/api/nodes/{id}/enabled")]
async fn set_enabled(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<EnabledRequest>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    let Some(node) = data.manager.lookup(id) else {
        return Ok(node_not_found(id));
    };

    node.set_enabled(req.enabled);
    info!("Node {} ({}) enabled = {}", node.name(), id, req.enabled);

    Ok(HttpResponse::Ok().json(node_summary(&node)))
}

/// Replace a node's configuration string
#[put("/api/nodes/{id}/config")]
async fn set_config(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ConfigRequest>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    let Some(node) = data.manager.lookup(id) else {
        return Ok(node_not_found(id));
    };

    node.set_config(req.into_inner().config);
    info!("Updated config of node {} ({})", node.name(), id);

    Ok(HttpResponse::Ok().json(node_summary(&node)))
}

/// Fire one activation of a node with the given payload
#[post("/api/nodes/{id}/execute")]
async fn execute_node(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: Option<web::Json<ExecuteRequest>>,
) -> ActixResult<impl Responder> {
    let id = path.into_inner();
    let Some(node) = data.manager.lookup(id) else {
        return Ok(node_not_found(id));
    };

    if !data.manager.is_running() {
        return Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse {
            error: "Flow is shutting down".to_string(),
        }));
    }

    let payload = match req.map(|r| r.into_inner()).unwrap_or_default().payload {
        None | Some(serde_json::Value::Null) => Record::new(),
        Some(json) => match record_from_json(json) {
            Ok(record) => record,
            Err(e) => {
                return Ok(HttpResponse::BadRequest().json(ErrorResponse {
                    error: e.to_string(),
                }))
            }
        },
    };

    info!("Triggering node {} ({})", node.name(), id);
    node.trigger(payload);

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "node_id": id,
        "message": "Activation scheduled",
    })))
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagging, skipped {} events", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

fn load_flow(path: &str) -> anyhow::Result<FlowDefinition> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("🚀 Starting Flow Engine Server");

    let mut registry = flowruntime::PluginRegistry::new();
    flownodes::register_all(&mut registry);

    let runtime = Arc::new(FlowRuntime::with_registry(
        Arc::new(registry),
        RuntimeConfig::default(),
    ));

    info!("✅ Runtime initialized with standard plugins");

    let manager = match std::env::var("FLOW_FILE") {
        Ok(path) => {
            let flow = load_flow(&path)?;
            info!("📋 Loaded flow {} from {}", flow.name, path);
            runtime.build(&flow)?
        }
        Err(_) => {
            warn!("FLOW_FILE not set, serving an empty flow");
            ExecutionManager::new(ExecutionContext::new(
                runtime.event_bus().clone(),
                &Default::default(),
            ))
        }
    };
    let manager = Arc::new(manager);

    let starters = manager.initialize()?;
    info!("▶️  Flow started with {} starter node(s)", starters);

    let app_state = web::Data::new(AppState {
        runtime: runtime.clone(),
        manager: manager.clone(),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_plugins)
            .service(list_nodes)
            .service(get_node)
            .service(set_enabled)
            .service(set_config)
            .service(execute_node)
            .service(websocket_events)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    info!("⏹️  Server stopped, shutting down flow");
    if let Err(e) = manager.shutdown().await {
        error!("Flow shutdown incomplete: {}", e);
    }

    Ok(())
}
