//! Standard plugin library
//!
//! Collection of built-in plugins: timed sources, HTTP, scripts,
//! JSON transforms and a debug sink.

mod debug;
mod http;
mod script;
mod time;
mod transform;

pub use debug::DebugPlugin;
pub use http::{HttpConfig, HttpRequestPlugin};
pub use script::ScriptPlugin;
pub use time::{DelayConfig, DelayPlugin, IntervalConfig, IntervalPlugin};
pub use transform::{JsonParsePlugin, JsonStringifyPlugin};
use flowruntime::PluginRegistry;

use std::sync::Arc;

/// Register all standard plugins with a registry
pub fn register_all(registry: &mut PluginRegistry) {
    registry.register(Arc::new(debug::DebugPluginFactory));
    registry.register(Arc::new(http::HttpRequestPluginFactory));
    registry.register(Arc::new(script::ScriptPluginFactory));
    registry.register(Arc::new(time::IntervalPluginFactory));
    registry.register(Arc::new(time::DelayPluginFactory));
    registry.register(Arc::new(transform::JsonParsePluginFactory));
    registry.register(Arc::new(transform::JsonStringifyPluginFactory));
}
