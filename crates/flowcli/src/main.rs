// crates/flowcli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{ExecutionEvent, FlowDefinition, NodeEvent, NodeKind};
use flowruntime::{FlowGraph, FlowRuntime, PluginRegistry, RuntimeConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow until Ctrl-C (or for a fixed duration)
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Capacity of the execution event buffer
        #[arg(long, default_value_t = 1000)]
        event_buffer: usize,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate a flow file
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available plugin types
    Nodes,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    flownodes::register_all(&mut registry);
    registry
}

fn load_flow(file: &Path) -> Result<FlowDefinition> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let flow = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    Ok(flow)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            duration,
            event_buffer,
            verbose,
        } => {
            init_logging(verbose);
            run_flow(file, duration, event_buffer).await?;
        }

        Commands::Validate { file } => {
            validate_flow(file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_flow(output)?;
        }
    }

    Ok(())
}

async fn run_flow(file: PathBuf, duration: Option<u64>, event_buffer: usize) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());

    let flow = load_flow(&file)?;

    println!("📋 Flow: {}", flow.name);
    println!("   Nodes: {}", flow.nodes.len());
    println!("   Links: {}", flow.links.len());
    println!();

    let runtime = FlowRuntime::with_registry(
        Arc::new(registry()),
        RuntimeConfig {
            event_buffer_size: event_buffer,
        },
    );

    // Subscribe to events for real-time output
    let mut events = runtime.subscribe_events();

    let event_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    println!("  ⏭️  {} events skipped", skipped);
                    continue;
                }
                Err(_) => break,
            };
            match event {
                ExecutionEvent::NodePrepared { node_id, .. } => {
                    println!("  🔧 Node {} prepared", node_id);
                }
                ExecutionEvent::PrepareFailed { node_id, error, .. } => {
                    println!("  ❌ Node {} failed to prepare: {}", node_id, error);
                }
                ExecutionEvent::TaskCompleted {
                    node_id,
                    task_index,
                    duration_ms,
                    ..
                } => {
                    println!("  ✅ Node {} task {} completed in {}ms", node_id, task_index, duration_ms);
                }
                ExecutionEvent::TaskFailed {
                    node_id,
                    task_index,
                    error,
                    ..
                } => {
                    println!("  ❌ Node {} task {} failed: {}", node_id, task_index, error);
                }
                ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
                    NodeEvent::Info { message } => {
                        println!("     ℹ️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Warning { message } => {
                        println!("     ⚠️  [{}] {}", node_id, message);
                    }
                    NodeEvent::Data { key, value } => {
                        println!("     📦 [{}] {} = {:?}", node_id, key, value);
                    }
                },
                _ => {}
            }
        }
    });

    let manager = runtime.build(&flow)?;
    tracing::info!("Flow '{}' built with {} nodes", flow.name, manager.len());

    let starters = manager.initialize()?;
    println!("▶️  Flow started with {} starter node(s)", starters);
    if starters == 0 {
        println!("   (no starter nodes: nothing will run on its own)");
    }

    match duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    println!();
    println!("⏹️  Stopping flow...");
    tracing::info!("Shutting down flow '{}'", flow.name);
    let stopped = manager.shutdown().await;

    // Let the listener drain what was already published
    tokio::time::sleep(Duration::from_millis(100)).await;
    event_task.abort();

    match stopped {
        Ok(()) => println!("✨ Flow stopped cleanly"),
        Err(e) => {
            tracing::error!("Flow '{}' did not stop cleanly: {}", flow.name, e);
            println!("💥 {}", e);
        }
    }

    Ok(())
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let flow = load_flow(&file)?;
    let graph = FlowGraph::from_definition(&flow)?;

    let registry = registry();
    let mut starters = Vec::new();
    for spec in &flow.nodes {
        let plugin = registry.create_plugin(&spec.plugin_type, &spec.config)?;
        let ports = plugin.work_tasks().len();
        if plugin.kind() == NodeKind::Starter {
            starters.push(spec.id);
        }
        for link in flow.links.iter().filter(|l| l.from_node == spec.id) {
            if link.from_port >= ports {
                anyhow::bail!(
                    "Node {} has no output port {} ({} declared)",
                    spec.id,
                    link.from_port,
                    ports
                );
            }
        }
    }

    println!("✅ Flow is valid:");
    println!("   Name: {}", flow.name);
    println!("   Nodes: {}", graph.node_count());
    println!("   Links: {}", graph.link_count());
    println!("   Starter nodes: {}", starters.len());

    if graph.has_cycles() {
        println!("⚠️  Flow contains cycles; activations entering them circulate until shutdown");
    }
    for id in graph.unreachable_from(&starters) {
        println!("⚠️  Node {} is not reachable from any starter node", id);
    }

    Ok(())
}

fn list_nodes() {
    println!("📦 Available Plugin Types:");
    println!();

    let registry = registry();

    for plugin_type in registry.list_plugin_types() {
        if let Some(metadata) = registry.get_metadata(&plugin_type) {
            println!("  • {} ({}, {})", plugin_type, metadata.category, metadata.kind);
            println!("    {}", metadata.description);
            for (i, port) in metadata.outputs.iter().enumerate() {
                println!("      out[{}] {}: {}", i, port.name, port.description);
            }
        } else {
            println!("  • {}", plugin_type);
        }
    }
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    use flowcore::NodeSpec;

    let mut flow = FlowDefinition::new("Example Ticker Flow");
    flow.description = Some("Emits a counter every second and logs it".to_string());

    let ticker = NodeSpec::new("time.interval")
        .with_name("Every second")
        .with_json_config(serde_json::json!({
            "interval_ms": 1000,
            "payload": { "source": "ticker" }
        }));

    let stringify = NodeSpec::new("transform.json_stringify").with_name("To JSON");

    let debug = NodeSpec::new("debug.log").with_name("Log Tick");

    let ticker_id = flow.add_node(ticker);
    let stringify_id = flow.add_node(stringify);
    let debug_id = flow.add_node(debug);

    flow.link(ticker_id, 0, stringify_id);
    flow.link(stringify_id, 0, debug_id);

    let json = serde_json::to_string_pretty(&flow)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {} --duration 5", output.display());

    Ok(())
}
