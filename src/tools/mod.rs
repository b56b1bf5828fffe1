pub mod stock;


use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::data::MarketData;
use crate::error::ToolError;

pub use stock::{StockLookup, StockTool};

/// A named capability the model may call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// What the model sees of a tool.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed set of tools, registered once at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All seven stock lookups backed by `data`.
    pub fn with_stock_tools(data: Arc<dyn MarketData>) -> Self {
        let mut registry = Self::new();
        for lookup in StockLookup::ALL {
            registry.register(Arc::new(StockTool::new(lookup, data.clone())));
        }
        registry
    }

    /// Registering a name twice replaces the earlier tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if let Some(&idx) = self.index.get(name) {
            self.tools[idx] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Decode the model's JSON argument string and run the named tool.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;

        // Some providers send an empty string for no-argument calls
        let arguments = if arguments.trim().is_empty() { "{}" } else { arguments };
        let args: Value =
            serde_json::from_str(arguments).map_err(|source| ToolError::InvalidArguments {
                name: name.to_string(),
                source,
            })?;

        tool.call(args).await
    }
}
